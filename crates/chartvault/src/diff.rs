//! Asset set diff: which blobs an edit uploads, keeps and deletes.
//!
//! A hash is deleted only when no slot references it after the edit. Slots
//! can share a hash (identical audio and preview), and a hash can move from
//! one slot to another within a single edit, so deletion is decided on the
//! set of hashes rather than slot by slot:
//!
//! - `kept`: every hash the post-edit asset set references
//! - `candidates`: old hashes of slots that are replaced (with different
//!   bytes) or removed
//! - `actual_deletes = candidates - kept`

use std::collections::BTreeSet;

use cas::{ContentHash, PendingBlob};
use serde::{Deserialize, Serialize};

use crate::changes::{ChangeSet, SlotChange};
use crate::slots::{AssetSet, AssetSlot};

/// New pointer value for one slot. `None` clears an optional slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub slot: AssetSlot,
    pub hash: Option<ContentHash>,
}

impl SlotUpdate {
    pub fn new(slot: AssetSlot, hash: Option<ContentHash>) -> Self {
        Self { slot, hash }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetDiff {
    /// Hashes no slot references after the edit.
    pub actual_deletes: BTreeSet<ContentHash>,
    /// One blob per distinct new hash, in slot order.
    pub pending_uploads: Vec<PendingBlob>,
    /// Hashes referenced after the edit.
    pub kept: BTreeSet<ContentHash>,
    /// Pointer changes to commit. No-op replacements are absent.
    pub updates: Vec<SlotUpdate>,
}

impl AssetDiff {
    /// Nothing to upload, delete or commit.
    pub fn is_noop(&self) -> bool {
        self.actual_deletes.is_empty() && self.pending_uploads.is_empty() && self.updates.is_empty()
    }

    /// True when the committed pointer of `slot` changes.
    pub fn updates_slot(&self, slot: AssetSlot) -> bool {
        self.updates.iter().any(|u| u.slot == slot)
    }
}

pub fn diff(current: &AssetSet, changes: &ChangeSet) -> AssetDiff {
    let mut result = AssetDiff::default();
    let mut candidates = BTreeSet::new();
    let mut staged = BTreeSet::new();

    for slot in AssetSlot::ALL {
        let old = current.get(slot);
        match changes.get(slot) {
            SlotChange::Unchanged => {
                if let Some(hash) = old {
                    result.kept.insert(hash.clone());
                }
            }
            SlotChange::Replace(blob) if old == Some(&blob.hash) => {
                result.kept.insert(blob.hash.clone());
            }
            SlotChange::Replace(blob) => {
                if let Some(hash) = old {
                    candidates.insert(hash.clone());
                }
                result.kept.insert(blob.hash.clone());
                if staged.insert(blob.hash.clone()) {
                    result.pending_uploads.push(blob.clone());
                }
                result
                    .updates
                    .push(SlotUpdate::new(slot, Some(blob.hash.clone())));
            }
            SlotChange::Remove => {
                if let Some(hash) = old {
                    candidates.insert(hash.clone());
                    result.updates.push(SlotUpdate::new(slot, None));
                }
            }
        }
    }

    result.actual_deletes = candidates.difference(&result.kept).cloned().collect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use cas::content_type;

    fn blob(data: &'static [u8], ct: &'static str) -> PendingBlob {
        PendingBlob::new(Bytes::from_static(data), ct)
    }

    fn h(data: &[u8]) -> ContentHash {
        ContentHash::from_data(data)
    }

    fn base() -> AssetSet {
        AssetSet::new(h(b"script"), h(b"audio"), h(b"jacket"), h(b"v1"), h(b"v3"))
    }

    #[test]
    fn test_empty_change_set_is_noop() {
        let d = diff(&base(), &ChangeSet::new());
        assert!(d.is_noop());
        assert_eq!(d.kept, base().hashes());
    }

    #[test]
    fn test_replace_with_identical_bytes_is_noop() {
        let mut changes = ChangeSet::new();
        changes
            .replace(AssetSlot::Audio, blob(b"audio", content_type::AUDIO_MPEG))
            .unwrap();
        let d = diff(&base(), &changes);
        assert!(d.is_noop());
        assert!(d.kept.contains(&h(b"audio")));
    }

    #[test]
    fn test_replace_deletes_old_hash() {
        let mut changes = ChangeSet::new();
        changes
            .replace(AssetSlot::Script, blob(b"script2", content_type::APPLICATION_GZIP))
            .unwrap();
        let d = diff(&base(), &changes);
        assert_eq!(d.actual_deletes, BTreeSet::from([h(b"script")]));
        assert_eq!(d.pending_uploads.len(), 1);
        assert_eq!(
            d.updates,
            vec![SlotUpdate::new(AssetSlot::Script, Some(h(b"script2")))]
        );
    }

    #[test]
    fn test_shared_hash_survives_while_referenced() {
        // Preview shares the audio bytes; replacing audio keeps the blob.
        let current = base().with_preview(Some(h(b"audio")));
        let mut changes = ChangeSet::new();
        changes
            .replace(AssetSlot::Audio, blob(b"audio2", content_type::AUDIO_MPEG))
            .unwrap();
        let d = diff(&current, &changes);
        assert!(d.actual_deletes.is_empty());
        assert!(d.kept.contains(&h(b"audio")));
    }

    #[test]
    fn test_swapped_hashes_are_not_deleted() {
        let current = base().with_preview(Some(h(b"preview")));
        let mut changes = ChangeSet::new();
        changes
            .replace(AssetSlot::Audio, blob(b"preview", content_type::AUDIO_MPEG))
            .unwrap()
            .replace(AssetSlot::Preview, blob(b"audio", content_type::AUDIO_MPEG))
            .unwrap();
        let d = diff(&current, &changes);
        assert!(d.actual_deletes.is_empty());
        assert_eq!(d.updates.len(), 2);
    }

    #[test]
    fn test_duplicate_new_hash_uploads_once() {
        let current = base();
        let mut changes = ChangeSet::new();
        changes
            .replace(AssetSlot::Audio, blob(b"song", content_type::AUDIO_MPEG))
            .unwrap()
            .replace(AssetSlot::Preview, blob(b"song", content_type::AUDIO_MPEG))
            .unwrap();
        let d = diff(&current, &changes);
        assert_eq!(d.pending_uploads.len(), 1);
        assert_eq!(d.updates.len(), 2);
    }

    #[test]
    fn test_remove_absent_slot_does_nothing() {
        let mut changes = ChangeSet::new();
        changes.remove(AssetSlot::Background).unwrap();
        assert!(diff(&base(), &changes).is_noop());
    }

    #[test]
    fn test_remove_background() {
        let current = base().with_background(Some(h(b"bg")));
        let mut changes = ChangeSet::new();
        changes.remove(AssetSlot::Background).unwrap();
        let d = diff(&current, &changes);
        assert_eq!(d.actual_deletes, BTreeSet::from([h(b"bg")]));
        assert_eq!(d.updates, vec![SlotUpdate::new(AssetSlot::Background, None)]);
        assert!(d.pending_uploads.is_empty());
    }
}
