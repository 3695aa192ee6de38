//! Script format detection.
//!
//! Detection only looks at markers: the gzip magic, top-level JSON keys, the
//! archetype vocabulary of a LevelData payload and SUS `#` directives. It
//! never builds the note model. Recognizers run in the fixed order of
//! [`RECOGNIZERS`]; the first that claims the bytes decides the format.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use flate2::read::GzDecoder;
use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::debug;

use crate::error::FormatError;
use crate::leveldata::TIMESCALE_GROUP;

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Largest inflated/compressed ratio accepted for a gzip script.
pub const MAX_INFLATE_RATIO: u64 = 16;

/// Script size bound used when the caller does not supply one.
pub const DEFAULT_SCRIPT_LIMIT: u64 = 20 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Producer {
    NextSekai,
    PySekai,
    Unknown,
}

impl Producer {
    /// Lowercase tag used in logs and stored diagnostics.
    pub fn tag(self) -> &'static str {
        match self {
            Producer::NextSekai => "nextsekai",
            Producer::PySekai => "pysekai",
            Producer::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Producer::NextSekai => "NextSekai",
            Producer::PySekai => "PySekai",
            Producer::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Producer signatures, checked in order: a payload belongs to the first
/// producer whose marker archetype it contains.
pub const PRODUCER_SIGNATURES: &[(Producer, &str)] = &[
    (Producer::NextSekai, TIMESCALE_GROUP),
    (Producer::PySekai, "Stage"),
];

pub fn classify_producer<'a>(archetypes: impl IntoIterator<Item = &'a str>) -> Producer {
    let seen: Vec<&str> = archetypes.into_iter().collect();
    PRODUCER_SIGNATURES
        .iter()
        .find(|(_, marker)| seen.contains(marker))
        .map(|(producer, _)| *producer)
        .unwrap_or(Producer::Unknown)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFormat {
    Sus,
    Usc,
    LevelData { producer: Producer, compressed: bool },
    Unrecognized,
}

impl ScriptFormat {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, ScriptFormat::Unrecognized)
    }
}

impl fmt::Display for ScriptFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptFormat::Sus => f.write_str("sus"),
            ScriptFormat::Usc => f.write_str("usc"),
            ScriptFormat::LevelData {
                producer,
                compressed: true,
            } => write!(f, "compress_{}", producer.tag()),
            ScriptFormat::LevelData {
                producer,
                compressed: false,
            } => f.write_str(producer.tag()),
            ScriptFormat::Unrecognized => f.write_str("unrecognized"),
        }
    }
}

/// Bounds applied while detecting.
#[derive(Debug, Clone, Copy)]
pub struct DetectLimits {
    pub max_inflated: u64,
}

impl DetectLimits {
    pub fn for_script_limit(script_limit: u64) -> Self {
        DetectLimits {
            max_inflated: script_limit.saturating_mul(MAX_INFLATE_RATIO),
        }
    }
}

impl Default for DetectLimits {
    fn default() -> Self {
        Self::for_script_limit(DEFAULT_SCRIPT_LIMIT)
    }
}

/// A recognizer claims the bytes by returning a format, or passes with `None`.
pub type Recognizer = fn(&[u8], &DetectLimits) -> Option<ScriptFormat>;

pub const RECOGNIZERS: &[(&str, Recognizer)] = &[
    ("gzip-leveldata", recognize_gzip),
    ("usc", recognize_usc),
    ("leveldata", recognize_leveldata),
    ("sus", recognize_sus),
];

pub fn detect(bytes: &[u8]) -> ScriptFormat {
    detect_with_limits(bytes, &DetectLimits::default())
}

pub fn detect_with_limits(bytes: &[u8], limits: &DetectLimits) -> ScriptFormat {
    for (name, recognizer) in RECOGNIZERS {
        if let Some(format) = recognizer(bytes, limits) {
            debug!(recognizer = name, format = %format, "script format detected");
            return format;
        }
    }
    ScriptFormat::Unrecognized
}

/// Detect, treating an unrecognized script as an error.
pub fn detect_supported(bytes: &[u8], limits: &DetectLimits) -> Result<ScriptFormat, FormatError> {
    match detect_with_limits(bytes, limits) {
        ScriptFormat::Unrecognized => Err(FormatError::Unsupported),
        format => Ok(format),
    }
}

/// Inflate a gzip member, refusing to produce more than `max` bytes.
pub(crate) fn inflate_bounded(bytes: &[u8], max: u64) -> std::io::Result<Option<Vec<u8>>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .take(max.saturating_add(1))
        .read_to_end(&mut out)?;
    if out.len() as u64 > max {
        return Ok(None);
    }
    Ok(Some(out))
}

#[derive(Deserialize)]
struct ArchetypeOnly {
    archetype: String,
}

#[derive(Deserialize)]
struct LevelDataPeek {
    entities: Vec<ArchetypeOnly>,
}

fn peek_producer(json: &[u8]) -> Option<Producer> {
    let peek: LevelDataPeek = serde_json::from_slice(json).ok()?;
    Some(classify_producer(
        peek.entities.iter().map(|e| e.archetype.as_str()),
    ))
}

fn recognize_gzip(bytes: &[u8], limits: &DetectLimits) -> Option<ScriptFormat> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return None;
    }
    // Gzip that is not a LevelData payload is never another dialect.
    let format = match inflate_bounded(bytes, limits.max_inflated) {
        Ok(Some(inflated)) => match peek_producer(&inflated) {
            Some(producer) => ScriptFormat::LevelData {
                producer,
                compressed: true,
            },
            None => ScriptFormat::Unrecognized,
        },
        Ok(None) => {
            debug!(limit = limits.max_inflated, "gzip script inflates past limit");
            ScriptFormat::Unrecognized
        }
        Err(e) => {
            debug!(error = %e, "gzip script failed to inflate");
            ScriptFormat::Unrecognized
        }
    };
    Some(format)
}

fn recognize_usc(bytes: &[u8], _: &DetectLimits) -> Option<ScriptFormat> {
    let keys: BTreeMap<String, IgnoredAny> = serde_json::from_slice(bytes).ok()?;
    keys.contains_key("usc").then_some(ScriptFormat::Usc)
}

fn recognize_leveldata(bytes: &[u8], _: &DetectLimits) -> Option<ScriptFormat> {
    peek_producer(bytes).map(|producer| ScriptFormat::LevelData {
        producer,
        compressed: false,
    })
}

fn is_sus_directive(line: &str) -> bool {
    let mut chars = line.trim_start().chars();
    chars.next() == Some('#') && chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
}

fn recognize_sus(bytes: &[u8], _: &DetectLimits) -> Option<ScriptFormat> {
    let text = std::str::from_utf8(bytes).ok()?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim_start().starts_with('{') {
        return None;
    }
    text.lines()
        .any(is_sus_directive)
        .then_some(ScriptFormat::Sus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const NEXT_SEKAI: &str =
        r##"{"bgmOffset":0,"entities":[{"archetype":"Initialization","data":[]},{"archetype":"#TIMESCALE_GROUP","data":[]}]}"##;
    const PY_SEKAI: &str =
        r#"{"bgmOffset":0,"entities":[{"archetype":"Initialization","data":[]},{"archetype":"Stage","data":[]}]}"#;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_detect_sus() {
        let sus = b"This line is a comment\n#TITLE \"x\"\n#00010: 14\n";
        assert_eq!(detect(sus), ScriptFormat::Sus);
    }

    #[test]
    fn test_detect_usc() {
        assert_eq!(detect(br#"{"usc":{"objects":[]},"version":2}"#), ScriptFormat::Usc);
    }

    #[test]
    fn test_detect_leveldata_producers() {
        assert_eq!(
            detect(NEXT_SEKAI.as_bytes()),
            ScriptFormat::LevelData {
                producer: Producer::NextSekai,
                compressed: false
            }
        );
        assert_eq!(
            detect(PY_SEKAI.as_bytes()),
            ScriptFormat::LevelData {
                producer: Producer::PySekai,
                compressed: false
            }
        );
        assert_eq!(
            detect(br#"{"entities":[{"archetype":"Other"}]}"#),
            ScriptFormat::LevelData {
                producer: Producer::Unknown,
                compressed: false
            }
        );
    }

    #[test]
    fn test_detect_compressed_leveldata() {
        assert_eq!(
            detect(&gzip(NEXT_SEKAI.as_bytes())),
            ScriptFormat::LevelData {
                producer: Producer::NextSekai,
                compressed: true
            }
        );
    }

    #[test]
    fn test_gzip_of_non_leveldata_is_unrecognized() {
        assert_eq!(detect(&gzip(b"#00010: 14\n")), ScriptFormat::Unrecognized);
    }

    #[test]
    fn test_inflate_limit() {
        let big = gzip(&vec![b' '; 4096]);
        let limits = DetectLimits { max_inflated: 1024 };
        assert_eq!(detect_with_limits(&big, &limits), ScriptFormat::Unrecognized);
    }

    #[test]
    fn test_usc_key_wins_over_entities() {
        // USC is checked before LevelData.
        let both = br#"{"usc":{"objects":[]},"entities":[]}"#;
        assert_eq!(detect(both), ScriptFormat::Usc);
    }

    #[test]
    fn test_garbage_is_unrecognized() {
        assert_eq!(detect(&[0xff, 0xfe, 0x00, 0x12]), ScriptFormat::Unrecognized);
        assert_eq!(detect(b"just some words"), ScriptFormat::Unrecognized);
        assert_eq!(detect(b"{\"foo\": 1}"), ScriptFormat::Unrecognized);
        assert_eq!(
            detect_supported(b"", &DetectLimits::default()),
            Err(FormatError::Unsupported)
        );
    }

    #[test]
    fn test_producer_priority() {
        // A payload carrying both markers is NextSekai.
        assert_eq!(
            classify_producer(["Stage", TIMESCALE_GROUP]),
            Producer::NextSekai
        );
    }

    #[test]
    fn test_format_tags() {
        let format = ScriptFormat::LevelData {
            producer: Producer::NextSekai,
            compressed: true,
        };
        assert_eq!(format.to_string(), "compress_nextsekai");
    }
}
