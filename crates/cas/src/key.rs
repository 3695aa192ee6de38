//! Object keys: `{owner}/{chart}/{hash}`.
//!
//! One object exists per distinct (owner, chart, hash) triple. Two slots of
//! the same chart that hold identical bytes share a key; identical bytes
//! under different charts get separate objects even though the hash is the
//! same.

use std::fmt;

use crate::hash::ContentHash;
use crate::store::StoreError;

/// Sub-prefix under a chart holding replay objects.
pub const REPLAYS_SEGMENT: &str = "replays";

/// A validated object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Key for a content blob owned by a chart.
    pub fn blob(owner: &str, chart: &str, hash: &ContentHash) -> Result<Self, StoreError> {
        check_segment(owner)?;
        check_segment(chart)?;
        Ok(Self(format!("{}/{}/{}", owner, chart, hash)))
    }

    /// Parse an arbitrary key (as returned by `list`).
    pub fn parse(key: &str) -> Result<Self, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        for segment in key.split('/') {
            check_segment(segment).map_err(|_| StoreError::InvalidKey(key.to_string()))?;
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments, for filesystem-backed stores.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// The trailing segment parsed as a content hash, if it is one.
    pub fn content_hash(&self) -> Option<ContentHash> {
        self.0.rsplit('/').next().and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prefix covering every object of one chart (`{owner}/{chart}/`).
pub fn chart_prefix(owner: &str, chart: &str) -> Result<String, StoreError> {
    check_segment(owner)?;
    check_segment(chart)?;
    Ok(format!("{}/{}/", owner, chart))
}

/// Prefix covering the replay objects of one chart.
pub fn replay_prefix(owner: &str, chart: &str) -> Result<String, StoreError> {
    Ok(format!("{}{}/", chart_prefix(owner, chart)?, REPLAYS_SEGMENT))
}

fn check_segment(segment: &str) -> Result<(), StoreError> {
    let valid = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(segment.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key_layout() {
        let hash = ContentHash::from_data(b"audio");
        let key = ObjectKey::blob("owner1", "chart1", &hash).unwrap();
        assert_eq!(key.as_str(), format!("owner1/chart1/{}", hash));
        assert_eq!(key.content_hash(), Some(hash));
    }

    #[test]
    fn test_rejects_traversal() {
        let hash = ContentHash::from_data(b"x");
        assert!(ObjectKey::blob("..", "chart", &hash).is_err());
        assert!(ObjectKey::blob("owner", "a/b", &hash).is_err());
        assert!(ObjectKey::parse("owner//hash").is_err());
        assert!(ObjectKey::parse("").is_err());
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(chart_prefix("o", "c").unwrap(), "o/c/");
        assert_eq!(replay_prefix("o", "c").unwrap(), "o/c/replays/");
    }

    #[test]
    fn test_replay_key_has_no_content_hash() {
        let key = ObjectKey::parse("o/c/replays/run-1").unwrap();
        assert_eq!(key.content_hash(), None);
        assert_eq!(key.segments().count(), 4);
    }
}
