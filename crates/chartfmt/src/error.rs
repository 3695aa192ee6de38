use thiserror::Error;

use crate::detect::Producer;

/// Detection outcome that cannot be converted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid file format.")]
    Unsupported,
}

/// A recognized dialect that failed to parse into a score.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("line {line}: {message}")]
    Sus { line: usize, message: String },

    #[error("invalid USC: {0}")]
    Usc(String),

    #[error("invalid LevelData: {0}")]
    LevelData(String),

    #[error("chart is not valid UTF-8")]
    Encoding,

    #[error("invalid chart: {}", .0.join("; "))]
    Score(Vec<String>),
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Invalid file format.")]
    Unsupported,

    #[error("Incorrect LevelData: {found} (expected: {expected})")]
    UnexpectedProducer { found: Producer, expected: Producer },

    #[error("failed to convert chart: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to encode chart: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Format errors (as opposed to a recognized dialect that failed to parse).
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            ConvertError::Unsupported | ConvertError::UnexpectedProducer { .. }
        )
    }
}

impl From<FormatError> for ConvertError {
    fn from(e: FormatError) -> Self {
        match e {
            FormatError::Unsupported => ConvertError::Unsupported,
        }
    }
}
