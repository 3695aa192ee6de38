//! Content-addressed blob storage for chartvault.
//!
//! Blobs are immutable byte payloads addressed by the hash of their final
//! stored bytes. Objects are keyed `{owner}/{chart}/{hash}`, so identical
//! bytes in two slots of the same chart share one object.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cas::{BlobBatch, FileBlobStore, PendingBlob, content_type};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let store = FileBlobStore::at_path("/var/lib/chartvault/blobs").await?;
//!
//! let jacket = PendingBlob::new(std::fs::read("jacket.png")?, content_type::IMAGE_PNG);
//! let batch = BlobBatch::new(&store, "owner-id", "chart-id");
//! batch.create_all(&[jacket.clone()]).await?;
//!
//! // Later, once nothing references it any more:
//! batch.delete_all([jacket.hash]).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Backends
//!
//! - [`FileBlobStore`]: local directory tree, atomic writes via rename
//! - [`MemoryBlobStore`]: in-process map that records every call

pub mod batch;
pub mod config;
pub mod hash;
pub mod key;
pub mod memory;
pub mod metadata;
pub mod store;

pub use batch::{BatchError, BlobBatch, CreateReport, DeleteReport, PendingBlob};
pub use config::CasConfig;
pub use hash::{ContentHash, HashError};
pub use key::ObjectKey;
pub use memory::{MemoryBlobStore, StoreCall};
pub use metadata::{content_type, BlobMetadata};
pub use store::{BlobStore, FileBlobStore, StoreError};
