//! Asset slots and the per-chart asset set.
//!
//! A chart references its blobs through seven named slots. The two jacket
//! variants are derived from the jacket and never supplied directly; users
//! deal in [`FileKind`]s, the store deals in [`AssetSlot`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use cas::{content_type, ContentHash};
use chartconf::FileLimits;
use serde::{Deserialize, Serialize};

use crate::diff::SlotUpdate;

/// A named pointer from a chart to one blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetSlot {
    Script,
    Audio,
    Jacket,
    JacketVariant1,
    JacketVariant2,
    Preview,
    Background,
}

impl AssetSlot {
    pub const ALL: [AssetSlot; 7] = [
        AssetSlot::Script,
        AssetSlot::Audio,
        AssetSlot::Jacket,
        AssetSlot::JacketVariant1,
        AssetSlot::JacketVariant2,
        AssetSlot::Preview,
        AssetSlot::Background,
    ];

    /// Slots derived together from one jacket upload.
    pub const JACKET_GROUP: [AssetSlot; 3] = [
        AssetSlot::Jacket,
        AssetSlot::JacketVariant1,
        AssetSlot::JacketVariant2,
    ];

    /// Column holding this slot's hash in the `charts` table.
    pub fn column(self) -> &'static str {
        match self {
            AssetSlot::Script => "chart_file_hash",
            AssetSlot::Audio => "music_file_hash",
            AssetSlot::Jacket => "jacket_file_hash",
            AssetSlot::JacketVariant1 => "background_v1_file_hash",
            AssetSlot::JacketVariant2 => "background_v3_file_hash",
            AssetSlot::Preview => "preview_file_hash",
            AssetSlot::Background => "background_file_hash",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            AssetSlot::Script => content_type::APPLICATION_GZIP,
            AssetSlot::Audio | AssetSlot::Preview => content_type::AUDIO_MPEG,
            AssetSlot::Jacket
            | AssetSlot::JacketVariant1
            | AssetSlot::JacketVariant2
            | AssetSlot::Background => content_type::IMAGE_PNG,
        }
    }

    pub fn is_optional(self) -> bool {
        matches!(self, AssetSlot::Preview | AssetSlot::Background)
    }

    pub fn is_jacket_group(self) -> bool {
        Self::JACKET_GROUP.contains(&self)
    }

    pub fn name(self) -> &'static str {
        match self {
            AssetSlot::Script => "script",
            AssetSlot::Audio => "audio",
            AssetSlot::Jacket => "jacket",
            AssetSlot::JacketVariant1 => "jacket_variant1",
            AssetSlot::JacketVariant2 => "jacket_variant2",
            AssetSlot::Preview => "preview",
            AssetSlot::Background => "background",
        }
    }
}

impl fmt::Display for AssetSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A file a user can attach to an upload or edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Script,
    Audio,
    Jacket,
    Preview,
    Background,
}

impl FileKind {
    pub const ALL: [FileKind; 5] = [
        FileKind::Script,
        FileKind::Audio,
        FileKind::Jacket,
        FileKind::Preview,
        FileKind::Background,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FileKind::Script => "chart",
            FileKind::Audio => "audio",
            FileKind::Jacket => "jacket",
            FileKind::Preview => "preview",
            FileKind::Background => "background",
        }
    }

    /// Maximum accepted size in bytes.
    pub fn limit(self, limits: &FileLimits) -> u64 {
        match self {
            FileKind::Script => limits.chart,
            FileKind::Audio => limits.audio,
            FileKind::Jacket => limits.jacket,
            FileKind::Preview => limits.preview,
            FileKind::Background => limits.background,
        }
    }

    /// The slot a file of this kind lands in. Jackets also fill the variants.
    pub fn slot(self) -> AssetSlot {
        match self {
            FileKind::Script => AssetSlot::Script,
            FileKind::Audio => AssetSlot::Audio,
            FileKind::Jacket => AssetSlot::Jacket,
            FileKind::Preview => AssetSlot::Preview,
            FileKind::Background => AssetSlot::Background,
        }
    }

    pub fn is_optional(self) -> bool {
        self.slot().is_optional()
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Slot to hash mapping for one chart. Required slots are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSet {
    slots: BTreeMap<AssetSlot, ContentHash>,
}

impl AssetSet {
    pub fn new(
        script: ContentHash,
        audio: ContentHash,
        jacket: ContentHash,
        variant1: ContentHash,
        variant2: ContentHash,
    ) -> Self {
        let slots = BTreeMap::from([
            (AssetSlot::Script, script),
            (AssetSlot::Audio, audio),
            (AssetSlot::Jacket, jacket),
            (AssetSlot::JacketVariant1, variant1),
            (AssetSlot::JacketVariant2, variant2),
        ]);
        Self { slots }
    }

    pub fn with_preview(mut self, hash: Option<ContentHash>) -> Self {
        self.set_optional(AssetSlot::Preview, hash);
        self
    }

    pub fn with_background(mut self, hash: Option<ContentHash>) -> Self {
        self.set_optional(AssetSlot::Background, hash);
        self
    }

    fn set_optional(&mut self, slot: AssetSlot, hash: Option<ContentHash>) {
        match hash {
            Some(hash) => {
                self.slots.insert(slot, hash);
            }
            None => {
                self.slots.remove(&slot);
            }
        }
    }

    pub fn get(&self, slot: AssetSlot) -> Option<&ContentHash> {
        self.slots.get(&slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetSlot, &ContentHash)> {
        self.slots.iter().map(|(slot, hash)| (*slot, hash))
    }

    /// Distinct hashes referenced by any slot.
    pub fn hashes(&self) -> BTreeSet<ContentHash> {
        self.slots.values().cloned().collect()
    }

    pub fn references(&self, hash: &ContentHash) -> bool {
        self.slots.values().any(|h| h == hash)
    }

    /// The set after committing `updates`. Removing a required slot is
    /// ignored; the diff engine never produces one.
    pub fn apply(&self, updates: &[SlotUpdate]) -> AssetSet {
        let mut next = self.clone();
        for update in updates {
            match &update.hash {
                Some(hash) => {
                    next.slots.insert(update.slot, hash.clone());
                }
                None if update.slot.is_optional() => {
                    next.slots.remove(&update.slot);
                }
                None => {}
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(s: &str) -> ContentHash {
        ContentHash::from_data(s.as_bytes())
    }

    fn sample() -> AssetSet {
        AssetSet::new(h("s"), h("a"), h("j"), h("v1"), h("v3"))
    }

    #[test]
    fn test_columns_are_distinct() {
        let columns: BTreeSet<_> = AssetSlot::ALL.iter().map(|s| s.column()).collect();
        assert_eq!(columns.len(), AssetSlot::ALL.len());
    }

    #[test]
    fn test_only_preview_and_background_are_optional() {
        let optional: Vec<_> = AssetSlot::ALL.into_iter().filter(|s| s.is_optional()).collect();
        assert_eq!(optional, vec![AssetSlot::Preview, AssetSlot::Background]);
    }

    #[test]
    fn test_shared_hash_counts_once() {
        let set = AssetSet::new(h("s"), h("x"), h("j"), h("v1"), h("v3")).with_preview(Some(h("x")));
        assert_eq!(set.hashes().len(), 5);
        assert!(set.references(&h("x")));
    }

    #[test]
    fn test_apply_updates() {
        let set = sample().with_background(Some(h("bg")));
        let next = set.apply(&[
            SlotUpdate::new(AssetSlot::Background, None),
            SlotUpdate::new(AssetSlot::Preview, Some(h("p"))),
            SlotUpdate::new(AssetSlot::Audio, None),
        ]);
        assert_eq!(next.get(AssetSlot::Background), None);
        assert_eq!(next.get(AssetSlot::Preview), Some(&h("p")));
        assert_eq!(next.get(AssetSlot::Audio), Some(&h("a")));
    }

    #[test]
    fn test_file_kind_limits() {
        let limits = FileLimits::default();
        assert_eq!(FileKind::Script.limit(&limits), limits.chart);
        assert_eq!(FileKind::Jacket.limit(&limits), limits.jacket);
        assert_eq!(FileKind::Script.name(), "chart");
    }
}
