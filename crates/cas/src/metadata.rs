//! Metadata types for stored blobs.
//!
//! The filesystem backend keeps a JSON sidecar per object so the content type
//! survives alongside the bytes, the way an object store keeps it as object
//! metadata.

use serde::{Deserialize, Serialize};

/// Content types used for chart assets.
pub mod content_type {
    pub const IMAGE_PNG: &str = "image/png";
    pub const IMAGE_JPEG: &str = "image/jpeg";
    pub const AUDIO_MPEG: &str = "audio/mpeg";
    pub const APPLICATION_GZIP: &str = "application/gzip";
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// Metadata stored alongside an object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobMetadata {
    /// MIME type the object was written with.
    pub content_type: String,

    /// Size of the content in bytes.
    pub size: u64,
}

impl BlobMetadata {
    pub fn new(content_type: impl Into<String>, size: u64) -> Self {
        Self {
            content_type: content_type.into(),
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_metadata_serde() {
        let meta = BlobMetadata::new(content_type::AUDIO_MPEG, 48000);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("audio/mpeg"));
        let restored: BlobMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, restored);
    }
}
