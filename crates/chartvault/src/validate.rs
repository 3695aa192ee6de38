//! Request validation. Everything here runs before any store is touched.

use chartconf::{FileLimits, LimitsConfig, TextLimits};
use thiserror::Error;

use crate::request::{ChartMetadata, MetadataPatch, Upload};
use crate::slots::FileKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid chart ID.")]
    InvalidChartId,

    #[error("Invalid owner ID.")]
    InvalidOwnerId,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Length limits exceeded: {field}")]
    TooLong { field: &'static str },

    #[error("Rating {rating} outside {min}..={max}")]
    RatingOutOfRange { rating: i32, min: i32, max: i32 },

    #[error("File not found.")]
    FileNotFound(FileKind),

    #[error("Includes unexpected file.")]
    UnexpectedFile(FileKind),

    #[error("Can't delete and include.")]
    DeleteAndInclude(FileKind),

    #[error("Uploaded files exceed file size limit.")]
    FileTooLarge { kind: FileKind, size: u64, limit: u64 },

    #[error("Invalid {kind} file: expected {expected}")]
    WrongContentType {
        kind: FileKind,
        expected: &'static str,
    },
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field });
    }
    Ok(())
}

fn check_tags(tags: &[String], limits: &TextLimits) -> Result<(), ValidationError> {
    if tags.len() > limits.tags_count {
        return Err(ValidationError::TooLong { field: "tags" });
    }
    for tag in tags {
        check_len("tag", tag, limits.per_tag)?;
    }
    Ok(())
}

fn check_rating(rating: i32, limits: &LimitsConfig) -> Result<(), ValidationError> {
    if !limits.rating.contains(rating) {
        return Err(ValidationError::RatingOutOfRange {
            rating,
            min: limits.rating.min,
            max: limits.rating.max,
        });
    }
    Ok(())
}

/// Validate the metadata of a new chart.
pub fn check_metadata(meta: &ChartMetadata, limits: &LimitsConfig) -> Result<(), ValidationError> {
    let text = &limits.text;
    for (field, value) in [("title", &meta.title), ("author", &meta.author)] {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField(field));
        }
    }
    check_len("title", &meta.title, text.title)?;
    check_len("author", &meta.author, text.author)?;
    check_len("artists", &meta.artists, text.artists)?;
    if let Some(description) = &meta.description {
        check_len("description", description, text.description)?;
    }
    check_tags(&meta.tags, text)?;
    check_rating(meta.rating, limits)
}

/// Validate the fields an edit sets. Absent fields are not checked.
pub fn check_patch(patch: &MetadataPatch, limits: &LimitsConfig) -> Result<(), ValidationError> {
    let text = &limits.text;
    if let Some(title) = &patch.title {
        if title.trim().is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        check_len("title", title, text.title)?;
    }
    if let Some(author) = &patch.author {
        if author.trim().is_empty() {
            return Err(ValidationError::MissingField("author"));
        }
        check_len("author", author, text.author)?;
    }
    if let Some(artists) = &patch.artists {
        check_len("artists", artists, text.artists)?;
    }
    if let Some(description) = &patch.description {
        check_len("description", description, text.description)?;
    }
    if let Some(tags) = &patch.tags {
        check_tags(tags, text)?;
    }
    if let Some(rating) = patch.rating {
        check_rating(rating, limits)?;
    }
    Ok(())
}

pub fn check_size(kind: FileKind, upload: &Upload, limits: &FileLimits) -> Result<(), ValidationError> {
    let limit = kind.limit(limits);
    let size = upload.size();
    if size > limit {
        return Err(ValidationError::FileTooLarge { kind, size, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn meta() -> ChartMetadata {
        ChartMetadata {
            title: "Song".into(),
            author: "me".into(),
            artists: "them".into(),
            rating: 20,
            tags: vec!["hard".into()],
            description: None,
        }
    }

    #[test]
    fn test_valid_metadata() {
        assert_eq!(check_metadata(&meta(), &LimitsConfig::default()), Ok(()));
    }

    #[test]
    fn test_title_limit_counts_chars() {
        let limits = LimitsConfig::default();
        let mut m = meta();
        m.title = "é".repeat(50);
        assert_eq!(check_metadata(&m, &limits), Ok(()));
        m.title.push('x');
        assert_eq!(
            check_metadata(&m, &limits),
            Err(ValidationError::TooLong { field: "title" })
        );
    }

    #[test]
    fn test_tag_limits() {
        let limits = LimitsConfig::default();
        let mut m = meta();
        m.tags = vec!["a".into(); 4];
        assert_eq!(
            check_metadata(&m, &limits),
            Err(ValidationError::TooLong { field: "tags" })
        );
        m.tags = vec!["elevenchars".into()];
        assert_eq!(
            check_metadata(&m, &limits),
            Err(ValidationError::TooLong { field: "tag" })
        );
    }

    #[test]
    fn test_rating_range() {
        let limits = LimitsConfig::default();
        let mut m = meta();
        m.rating = 1000;
        assert!(matches!(
            check_metadata(&m, &limits),
            Err(ValidationError::RatingOutOfRange { rating: 1000, .. })
        ));
    }

    #[test]
    fn test_patch_checks_only_present_fields() {
        let limits = LimitsConfig::default();
        assert_eq!(check_patch(&MetadataPatch::default(), &limits), Ok(()));

        let patch = MetadataPatch {
            rating: Some(-1000),
            ..Default::default()
        };
        assert!(check_patch(&patch, &limits).is_err());

        let patch = MetadataPatch {
            title: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(
            check_patch(&patch, &limits),
            Err(ValidationError::MissingField("title"))
        );
    }

    #[test]
    fn test_size_limit() {
        let limits = FileLimits {
            preview: 4,
            ..Default::default()
        };
        let small = Upload::new(Bytes::from_static(b"1234"));
        let big = Upload::new(Bytes::from_static(b"12345"));
        assert_eq!(check_size(FileKind::Preview, &small, &limits), Ok(()));
        assert_eq!(
            check_size(FileKind::Preview, &big, &limits),
            Err(ValidationError::FileTooLarge {
                kind: FileKind::Preview,
                size: 5,
                limit: 4
            })
        );
    }
}
