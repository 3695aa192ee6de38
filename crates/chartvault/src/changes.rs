//! The edit change set: what each slot should become.

use std::collections::BTreeMap;

use cas::PendingBlob;
use thiserror::Error;

use crate::jacket::RenderedJacket;
use crate::slots::AssetSlot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotChange {
    Unchanged,
    Replace(PendingBlob),
    Remove,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChangeSetError {
    #[error("{0} is a required slot and cannot be removed")]
    Required(AssetSlot),

    #[error("{0} belongs to the jacket group and is replaced with it")]
    JacketGroup(AssetSlot),

    #[error("{slot} expects {expected}, got {found}")]
    ContentType {
        slot: AssetSlot,
        expected: &'static str,
        found: &'static str,
    },
}

/// Per-slot changes for one edit. Slots not mentioned stay unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: BTreeMap<AssetSlot, SlotChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a single slot. Jacket slots go through [`Self::replace_jacket`].
    pub fn replace(&mut self, slot: AssetSlot, blob: PendingBlob) -> Result<&mut Self, ChangeSetError> {
        if slot.is_jacket_group() {
            return Err(ChangeSetError::JacketGroup(slot));
        }
        if blob.content_type != slot.content_type() {
            return Err(ChangeSetError::ContentType {
                slot,
                expected: slot.content_type(),
                found: blob.content_type,
            });
        }
        self.changes.insert(slot, SlotChange::Replace(blob));
        Ok(self)
    }

    /// Replace the jacket and both derived variants together.
    pub fn replace_jacket(&mut self, rendered: &RenderedJacket) -> &mut Self {
        for (slot, blob) in rendered.blobs() {
            self.changes.insert(slot, SlotChange::Replace(blob));
        }
        self
    }

    pub fn remove(&mut self, slot: AssetSlot) -> Result<&mut Self, ChangeSetError> {
        if !slot.is_optional() {
            return Err(ChangeSetError::Required(slot));
        }
        self.changes.insert(slot, SlotChange::Remove);
        Ok(self)
    }

    pub fn get(&self, slot: AssetSlot) -> &SlotChange {
        self.changes.get(&slot).unwrap_or(&SlotChange::Unchanged)
    }

    /// True when `slot` is marked for replacement or removal.
    pub fn touches(&self, slot: AssetSlot) -> bool {
        !matches!(self.get(slot), SlotChange::Unchanged)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
