//! Dialect parsers.
//!
//! Both dialects produce a normalized [`Score`], which is then checked
//! against the model invariants before export.

pub mod sus;
pub mod usc;

use tracing::debug;

use crate::error::ParseError;
use crate::score::Score;

/// Parse SUS text, failing on the first error and on an invalid score.
pub fn parse_sus(input: &str) -> Result<Score, ParseError> {
    let result = sus::parse(input);
    for warning in result.warnings() {
        debug!(line = warning.line, message = %warning.message, "sus parse warning");
    }
    checked(result.into_sus_result()?)
}

/// Parse USC JSON, failing on malformed input and on an invalid score.
pub fn parse_usc(input: &str) -> Result<Score, ParseError> {
    checked(usc::parse(input)?)
}

fn checked(score: Score) -> Result<Score, ParseError> {
    let problems = score.validate();
    if problems.is_empty() {
        Ok(score)
    } else {
        Err(ParseError::Score(problems))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sus_without_bpm_is_rejected() {
        let err = parse_sus("#00010: 14\n").unwrap_err();
        assert!(matches!(err, ParseError::Score(ref p) if p.iter().any(|m| m.contains("no BPM"))));
    }

    #[test]
    fn test_equivalent_sus_and_usc_agree() {
        let sus = "#BPM01: 120\n#00008: 01\n#00016: 0024\n";
        let usc = r#"{"usc":{"objects":[
            {"type":"bpm","beat":0,"bpm":120},
            {"type":"timeScaleGroup","changes":[]},
            {"type":"single","beat":2,"lane":0,"size":2,"critical":true,"trace":false}
        ]}}"#;

        assert_eq!(parse_sus(sus).unwrap(), parse_usc(usc).unwrap());
    }
}
