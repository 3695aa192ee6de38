//! Upload limits: file sizes, text lengths and the rating range.

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Maximum size in bytes of each uploaded file kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLimits {
    #[serde(default = "FileLimits::default_jacket")]
    pub jacket: u64,
    #[serde(default = "FileLimits::default_chart")]
    pub chart: u64,
    #[serde(default = "FileLimits::default_audio")]
    pub audio: u64,
    #[serde(default = "FileLimits::default_preview")]
    pub preview: u64,
    #[serde(default = "FileLimits::default_background")]
    pub background: u64,
}

impl FileLimits {
    fn default_jacket() -> u64 {
        15 * MIB / 2
    }

    fn default_chart() -> u64 {
        20 * MIB
    }

    fn default_audio() -> u64 {
        50 * MIB
    }

    fn default_preview() -> u64 {
        5 * MIB
    }

    fn default_background() -> u64 {
        15 * MIB
    }
}

impl Default for FileLimits {
    fn default() -> Self {
        Self {
            jacket: Self::default_jacket(),
            chart: Self::default_chart(),
            audio: Self::default_audio(),
            preview: Self::default_preview(),
            background: Self::default_background(),
        }
    }
}

/// Maximum lengths (in characters) of text metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLimits {
    #[serde(default = "TextLimits::default_description")]
    pub description: usize,
    #[serde(default = "TextLimits::default_short")]
    pub artists: usize,
    #[serde(default = "TextLimits::default_short")]
    pub author: usize,
    #[serde(default = "TextLimits::default_short")]
    pub title: usize,
    #[serde(default = "TextLimits::default_per_tag")]
    pub per_tag: usize,
    #[serde(default = "TextLimits::default_tags_count")]
    pub tags_count: usize,
}

impl TextLimits {
    fn default_description() -> usize {
        1000
    }

    fn default_short() -> usize {
        50
    }

    fn default_per_tag() -> usize {
        10
    }

    fn default_tags_count() -> usize {
        3
    }
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            description: Self::default_description(),
            artists: Self::default_short(),
            author: Self::default_short(),
            title: Self::default_short(),
            per_tag: Self::default_per_tag(),
            tags_count: Self::default_tags_count(),
        }
    }
}

/// Inclusive rating range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingLimits {
    #[serde(default = "RatingLimits::default_min")]
    pub min: i32,
    #[serde(default = "RatingLimits::default_max")]
    pub max: i32,
}

impl RatingLimits {
    fn default_min() -> i32 {
        -999
    }

    fn default_max() -> i32 {
        999
    }

    pub fn contains(&self, rating: i32) -> bool {
        (self.min..=self.max).contains(&rating)
    }
}

impl Default for RatingLimits {
    fn default() -> Self {
        Self {
            min: Self::default_min(),
            max: Self::default_max(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub files: FileLimits,
    #[serde(default)]
    pub text: TextLimits,
    #[serde(default)]
    pub rating: RatingLimits,
}
