//! Parser feedback (warnings and errors with line positions).
//!
//! Dialect parsers keep going past directives they do not understand and
//! collect feedback along the way; only errors abort a conversion.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub level: FeedbackLevel,
    pub message: String,
    /// 1-based source line, 0 when the feedback has no position.
    pub line: usize,
}

impl Feedback {
    pub fn error(message: impl Into<String>, line: usize) -> Self {
        Feedback {
            level: FeedbackLevel::Error,
            message: message.into(),
            line,
        }
    }

    pub fn warning(message: impl Into<String>, line: usize) -> Self {
        Feedback {
            level: FeedbackLevel::Warning,
            message: message.into(),
            line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackLevel {
    /// The chart cannot be converted.
    Error,
    /// Parsed with assumptions; the directive was skipped or defaulted.
    Warning,
}

/// Collector for feedback during parsing
#[derive(Debug)]
pub struct FeedbackCollector {
    feedback: Vec<Feedback>,
    current_line: usize,
}

impl Default for FeedbackCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackCollector {
    pub fn new() -> Self {
        FeedbackCollector {
            feedback: Vec::new(),
            current_line: 0,
        }
    }

    pub fn set_line(&mut self, line: usize) {
        self.current_line = line;
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.feedback
            .push(Feedback::error(message, self.current_line));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.feedback
            .push(Feedback::warning(message, self.current_line));
    }

    pub fn has_errors(&self) -> bool {
        self.feedback
            .iter()
            .any(|f| f.level == FeedbackLevel::Error)
    }

    pub fn into_feedback(self) -> Vec<Feedback> {
        self.feedback
    }
}

/// Result of parsing with feedback
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult<T> {
    pub value: T,
    pub feedback: Vec<Feedback>,
}

impl<T> ParseResult<T> {
    pub fn new(value: T, feedback: Vec<Feedback>) -> Self {
        ParseResult { value, feedback }
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Feedback> {
        self.feedback
            .iter()
            .filter(|f| f.level == FeedbackLevel::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Feedback> {
        self.feedback
            .iter()
            .filter(|f| f.level == FeedbackLevel::Error)
    }

    /// Collapse into the value, or the first error as a SUS parse error.
    pub fn into_sus_result(self) -> Result<T, ParseError> {
        let first = self
            .errors()
            .next()
            .map(|f| (f.line, f.message.clone()));
        match first {
            Some((line, message)) => Err(ParseError::Sus { line, message }),
            None => Ok(self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_collector_tracks_lines() {
        let mut collector = FeedbackCollector::new();

        collector.set_line(3);
        collector.warning("unknown directive #HISPEED2");
        collector.set_line(7);
        collector.error("bad bar length");

        assert!(collector.has_errors());
        let feedback = collector.into_feedback();
        assert_eq!(feedback.len(), 2);
        assert_eq!(feedback[0].line, 3);
        assert_eq!(feedback[1].line, 7);
    }

    #[test]
    fn test_parse_result_first_error_wins() {
        let result: ParseResult<i32> = ParseResult::new(
            42,
            vec![
                Feedback::warning("w", 1),
                Feedback::error("first", 2),
                Feedback::error("second", 5),
            ],
        );

        assert_eq!(result.warnings().count(), 1);
        match result.into_sus_result() {
            Err(ParseError::Sus { line, message }) => {
                assert_eq!(line, 2);
                assert_eq!(message, "first");
            }
            other => panic!("expected SUS error, got {:?}", other),
        }
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let result = ParseResult::new("ok", vec![Feedback::warning("w", 1)]);
        assert_eq!(result.into_sus_result().unwrap(), "ok");
    }
}
