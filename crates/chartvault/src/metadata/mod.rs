//! Relational metadata: the chart row and its slot pointers.
//!
//! Every write is a single transaction. Edits carry the revision they were
//! computed against; a row that moved on in the meantime is a
//! [`MetadataError::Conflict`] and nothing is written.

mod memory;
mod sqlite;

pub use memory::MemoryMetadataStore;
pub use sqlite::{ChartDb, SqliteMetadataStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diff::SlotUpdate;
use crate::ids::{ChartId, OwnerId};
use crate::request::{ChartMetadata, DescriptionChange, MetadataPatch};
use crate::slots::AssetSet;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("chart {0} already exists")]
    Duplicate(ChartId),

    #[error("chart {0} not found")]
    NotFound(ChartId),

    #[error("chart {chart} was modified concurrently (expected revision {expected})")]
    Conflict { chart: ChartId, expected: i64 },

    #[error("corrupt row for chart {chart}: {message}")]
    Corrupt { chart: String, message: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// A stored chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRecord {
    pub id: ChartId,
    pub owner: OwnerId,
    pub metadata: ChartMetadata,
    pub assets: AssetSet,
    /// Bumped by every committed edit.
    pub revision: i64,
}

impl ChartRecord {
    pub fn new(id: ChartId, owner: OwnerId, metadata: ChartMetadata, assets: AssetSet) -> Self {
        Self {
            id,
            owner,
            metadata,
            assets,
            revision: 0,
        }
    }

    /// The record as it reads after `commit` succeeds.
    pub fn applied(&self, commit: &EditCommit) -> ChartRecord {
        let mut next = self.clone();
        let patch = &commit.patch;
        let meta = &mut next.metadata;
        if let Some(title) = &patch.title {
            meta.title = title.clone();
        }
        if let Some(author) = &patch.author {
            meta.author = author.clone();
        }
        if let Some(artists) = &patch.artists {
            meta.artists = artists.clone();
        }
        if let Some(rating) = patch.rating {
            meta.rating = rating;
        }
        if let Some(tags) = &patch.tags {
            meta.tags = tags.clone();
        }
        match patch.description_change() {
            DescriptionChange::Keep => {}
            DescriptionChange::Clear => meta.description = None,
            DescriptionChange::Set(text) => meta.description = Some(text.to_string()),
        }
        next.assets = self.assets.apply(&commit.updates);
        next.revision = self.revision + 1;
        next
    }
}

/// Everything one edit writes, in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditCommit {
    pub chart: ChartId,
    /// Revision the edit was computed against.
    pub expected_revision: i64,
    pub patch: MetadataPatch,
    /// Changed slot pointers only.
    pub updates: Vec<SlotUpdate>,
    /// Clear the chart's leaderboard rows.
    pub reset_leaderboards: bool,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new chart row with all of its pointers.
    async fn create_chart(&self, record: &ChartRecord) -> Result<(), MetadataError>;

    async fn get_chart(&self, id: &ChartId) -> Result<Option<ChartRecord>, MetadataError>;

    /// Apply an edit atomically. Returns the new revision.
    async fn commit_edit(&self, commit: &EditCommit) -> Result<i64, MetadataError>;
}
