//! Chart asset ingestion and reconciliation.
//!
//! A chart is a set of blobs (script, audio, jacket and its two variants,
//! optional preview and background) referenced by hash from one metadata
//! row. This crate turns uploads and edits into the minimal set of blob
//! writes, one metadata transaction, and the blob deletes that become safe
//! afterwards.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cas::FileBlobStore;
//! use chartconf::VaultConfig;
//! use chartvault::{Ingest, SqliteMetadataStore};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = VaultConfig::load()?;
//! let blobs = FileBlobStore::at_path(&config.paths.blob_dir).await?;
//! let metadata = SqliteMetadataStore::open(&config.paths.db_path)?;
//! let ingest = Ingest::new(Arc::new(blobs), Arc::new(metadata), &config);
//! # let _ = ingest;
//! # Ok(())
//! # }
//! ```

pub mod changes;
pub mod diff;
pub mod error;
pub mod ids;
pub mod ingest;
pub mod jacket;
pub mod locks;
pub mod metadata;
pub mod request;
pub mod slots;
pub mod sniff;
pub mod telemetry;
pub mod validate;
pub mod worker;

pub use changes::{ChangeSet, ChangeSetError, SlotChange};
pub use diff::{diff, AssetDiff, SlotUpdate};
pub use error::IngestError;
pub use ids::{ChartId, OwnerId};
pub use ingest::{EditOutcome, Ingest};
pub use jacket::{CommandRenderer, JacketRenderer, PassthroughRenderer, RenderedJacket};
pub use locks::ChartLocks;
pub use metadata::{
    ChartDb, ChartRecord, EditCommit, MemoryMetadataStore, MetadataError, MetadataStore,
    SqliteMetadataStore,
};
pub use request::{
    ChartMetadata, EditFlags, EditIntents, EditRequest, MetadataPatch, SlotIntent, Upload,
    UploadRequest,
};
pub use slots::{AssetSet, AssetSlot, FileKind};
pub use validate::ValidationError;
pub use worker::{WorkerError, WorkerPool};
