//! Conversion into the canonical container.
//!
//! The canonical container is a single gzip member named `LevelData` with a
//! zero modification time, so equal payloads compress to equal bytes.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use tracing::debug;

use crate::detect::{Producer, ScriptFormat};
use crate::error::{ConvertError, ParseError};
use crate::leveldata::export_level_data;
use crate::parser;

/// Internal filename written into the gzip header.
pub const CONTAINER_FILENAME: &str = "LevelData";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    pub expected_producer: Producer,
    /// Accept LevelData from any producer (debug deployments only).
    pub allow_foreign_producer: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            expected_producer: Producer::NextSekai,
            allow_foreign_producer: false,
        }
    }
}

impl ConvertOptions {
    pub fn debug() -> Self {
        ConvertOptions {
            allow_foreign_producer: true,
            ..Self::default()
        }
    }
}

/// Wrap a LevelData JSON payload in the canonical gzip container.
pub fn compress_canonical(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder: GzEncoder<Vec<u8>> = GzBuilder::new()
        .filename(CONTAINER_FILENAME)
        .mtime(0)
        .write(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()
}

fn text(bytes: &[u8]) -> Result<&str, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::Encoding)?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Convert a detected script into canonical container bytes.
pub fn convert(
    format: ScriptFormat,
    bytes: &[u8],
    options: &ConvertOptions,
) -> Result<Vec<u8>, ConvertError> {
    let score = match format {
        ScriptFormat::Sus => parser::parse_sus(text(bytes)?)?,
        ScriptFormat::Usc => parser::parse_usc(text(bytes)?)?,
        ScriptFormat::LevelData {
            producer,
            compressed,
        } => {
            if producer != options.expected_producer && !options.allow_foreign_producer {
                return Err(ConvertError::UnexpectedProducer {
                    found: producer,
                    expected: options.expected_producer,
                });
            }
            if compressed {
                debug!(%producer, "canonical payload already compressed, passing through");
                return Ok(bytes.to_vec());
            }
            return Ok(compress_canonical(bytes)?);
        }
        ScriptFormat::Unrecognized => return Err(ConvertError::Unsupported),
    };

    let payload = export_level_data(&score)
        .to_json()
        .map_err(|e| ParseError::LevelData(e.to_string()))?;
    debug!(
        %format,
        notes = score.notes.len(),
        payload.len = payload.len(),
        "chart exported"
    );
    Ok(compress_canonical(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{detect, inflate_bounded};

    const NEXT_SEKAI: &[u8] =
        br##"{"bgmOffset":0,"entities":[{"archetype":"#TIMESCALE_GROUP","data":[]}]}"##;

    #[test]
    fn test_container_header_is_fixed() {
        let out = compress_canonical(b"{}").unwrap();
        assert_eq!(&out[..2], &[0x1f, 0x8b]);
        // FLG.FNAME set, MTIME zero.
        assert_eq!(out[3] & 0x08, 0x08);
        assert_eq!(&out[4..8], &[0, 0, 0, 0]);
        assert_eq!(&out[10..20], b"LevelData\0");
    }

    #[test]
    fn test_uncompressed_leveldata_round_trip() {
        let format = detect(NEXT_SEKAI);
        let out = convert(format, NEXT_SEKAI, &ConvertOptions::default()).unwrap();
        let inflated = inflate_bounded(&out, 1 << 20).unwrap().unwrap();
        assert_eq!(inflated, NEXT_SEKAI);
    }

    #[test]
    fn test_compressed_leveldata_passes_through() {
        let compressed = compress_canonical(NEXT_SEKAI).unwrap();
        let format = detect(&compressed);
        let out = convert(format, &compressed, &ConvertOptions::default()).unwrap();
        assert_eq!(out, compressed);
    }

    #[test]
    fn test_foreign_producer_rejected_unless_debug() {
        let pysekai = br#"{"bgmOffset":0,"entities":[{"archetype":"Stage"}]}"#;
        let format = detect(pysekai);

        let err = convert(format, pysekai, &ConvertOptions::default()).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(
            err.to_string(),
            "Incorrect LevelData: PySekai (expected: NextSekai)"
        );

        assert!(convert(format, pysekai, &ConvertOptions::debug()).is_ok());
    }

    #[test]
    fn test_sus_conversion_is_byte_stable() {
        let sus = b"#BPM01: 120\n#00008: 01\n#00016: 14\n";
        let a = convert(ScriptFormat::Sus, sus, &ConvertOptions::default()).unwrap();
        let b = convert(ScriptFormat::Sus, sus, &ConvertOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_broken_sus_reports_line() {
        let sus = b"#BPM01: 120\n#00008: 01\n#00036a: 14\n";
        let err = convert(ScriptFormat::Sus, sus, &ConvertOptions::default()).unwrap_err();
        assert!(!err.is_unsupported());
        assert!(err.to_string().contains("line 3"), "{}", err);
    }

    #[test]
    fn test_unrecognized_is_unsupported() {
        let err = convert(ScriptFormat::Unrecognized, b"??", &ConvertOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Unsupported));
    }
}
