//! Chart script detection and conversion.
//!
//! Accepts the two authoring dialects (SUS text and USC JSON) and the
//! canonical LevelData payload, and turns any of them into the canonical
//! container: gzip-wrapped NextSekai LevelData.
//!
//! # Example
//!
//! ```
//! use chartfmt::{convert, detect, ConvertOptions, ScriptFormat};
//!
//! let sus = b"#BPM01: 120\n#00008: 01\n#00016: 14\n";
//! let format = detect(sus);
//! assert_eq!(format, ScriptFormat::Sus);
//!
//! let container = convert(format, sus, &ConvertOptions::default()).unwrap();
//! assert_eq!(&container[..2], &[0x1f, 0x8b]);
//! ```

pub mod convert;
pub mod detect;
pub mod error;
pub mod feedback;
pub mod leveldata;
pub mod parser;
pub mod score;

pub use convert::{compress_canonical, convert, ConvertOptions, CONTAINER_FILENAME};
pub use detect::{
    classify_producer, detect, detect_supported, detect_with_limits, DetectLimits, Producer,
    ScriptFormat, MAX_INFLATE_RATIO, PRODUCER_SIGNATURES, RECOGNIZERS,
};
pub use error::{ConvertError, FormatError, ParseError};
pub use feedback::{Feedback, FeedbackLevel, ParseResult};
pub use leveldata::{export_level_data, LevelData};
pub use score::Score;

/// Inflate a canonical container, refusing payloads larger than `max` bytes.
pub fn inflate_container(bytes: &[u8], max: u64) -> std::io::Result<Option<Vec<u8>>> {
    detect::inflate_bounded(bytes, max)
}
