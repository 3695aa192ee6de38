//! Fixture-based tests for detection and conversion.
//!
//! Each file in tests/fixtures/ is detected, converted to the canonical
//! container, and the container inflated back to LevelData.

use chartfmt::{
    convert, detect, inflate_container, ConvertError, ConvertOptions, LevelData, ParseError, Producer,
    ScriptFormat,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    fs::read(&path).unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", name, e))
}

fn convert_fixture(name: &str, expected: ScriptFormat) -> LevelData {
    let bytes = fixture(name);
    let format = detect(&bytes);
    assert_eq!(format, expected, "fixture {} detected as {}", name, format);

    let container = convert(format, &bytes, &ConvertOptions::default())
        .unwrap_or_else(|e| panic!("fixture {} failed to convert: {}", name, e));
    let payload = inflate_container(&container, 64 << 20)
        .unwrap()
        .expect("payload within limit");
    serde_json::from_slice(&payload)
        .unwrap_or_else(|e| panic!("fixture {} produced invalid LevelData: {}", name, e))
}

#[test]
fn test_fixture_basic_sus() {
    let level = convert_fixture("basic.sus", ScriptFormat::Sus);
    let notes: Vec<_> = level
        .archetypes()
        .filter(|a| a.ends_with("Note"))
        .collect();
    assert_eq!(notes, vec!["NormalTapNote", "CriticalTapNote", "NormalTraceNote"]);
}

#[test]
fn test_fixture_slides_sus() {
    let level = convert_fixture("slides.sus", ScriptFormat::Sus);
    let archetypes: Vec<_> = level.archetypes().collect();

    assert_eq!(archetypes.iter().filter(|a| **a == "#BPM_CHANGE").count(), 2);
    assert!(archetypes.contains(&"CriticalSlideStartNote"));
    assert!(archetypes.contains(&"CriticalSlideEndFlickNote"));
    assert!(archetypes.contains(&"CriticalAttachedSlideTickNote"));
    assert!(archetypes.contains(&"NormalSlideEndNote"));
    assert!(archetypes.contains(&"Guide"));
    // The critical tap under the slide start is absorbed into the slide.
    assert!(!archetypes.contains(&"CriticalTapNote"));
    assert!(archetypes.contains(&"NormalTapNote"));
}

#[test]
fn test_fixture_usc_matches_equivalent_sus() {
    let sus = fixture("basic.sus");
    let usc = fixture("basic.usc");
    assert_eq!(detect(&usc), ScriptFormat::Usc);

    let options = ConvertOptions::default();
    let from_sus = convert(ScriptFormat::Sus, &sus, &options).unwrap();
    let from_usc = convert(ScriptFormat::Usc, &usc, &options).unwrap();
    assert_eq!(from_sus, from_usc);
}

#[test]
fn test_fixture_nextsekai_round_trip() {
    let bytes = fixture("nextsekai.json");
    let format = detect(&bytes);
    assert_eq!(
        format,
        ScriptFormat::LevelData {
            producer: Producer::NextSekai,
            compressed: false
        }
    );

    let container = convert(format, &bytes, &ConvertOptions::default()).unwrap();
    let inflated = inflate_container(&container, 1 << 20).unwrap().unwrap();
    assert_eq!(inflated, bytes);

    // Converting the container again is a passthrough with the same bytes.
    let again = convert(detect(&container), &container, &ConvertOptions::default()).unwrap();
    assert_eq!(again, container);
}

#[test]
fn test_fixture_pysekai_rejected() {
    let bytes = fixture("pysekai.json");
    let format = detect(&bytes);
    assert_eq!(
        format,
        ScriptFormat::LevelData {
            producer: Producer::PySekai,
            compressed: false
        }
    );
    let err = convert(format, &bytes, &ConvertOptions::default()).unwrap_err();
    assert!(err.is_unsupported());
}

fn assert_sus_rejected(sus: &str, needle: &str) {
    assert_eq!(detect(sus.as_bytes()), ScriptFormat::Sus);
    match convert(ScriptFormat::Sus, sus.as_bytes(), &ConvertOptions::default()) {
        Err(ConvertError::Parse(ParseError::Sus { message, .. })) => {
            assert!(message.contains(needle), "unexpected message: {}", message)
        }
        other => panic!("expected a SUS parse error, got {:?}", other),
    }
}

#[test]
fn test_huge_measure_base_is_a_parse_error() {
    assert_sus_rejected(
        "#BPM01: 120\n#MEASUREBS 4294967295\n#00108: 01\n#00110: 14\n",
        "MEASUREBS",
    );
}

#[test]
fn test_huge_ticks_per_beat_is_a_parse_error() {
    assert_sus_rejected(
        "#REQUEST \"ticks_per_beat 4000000000000000000\"\n#BPM01: 120\n#00002: 4\n#00108: 01\n#00110: 14\n",
        "ticks_per_beat",
    );
}

#[test]
fn test_huge_bar_length_is_a_parse_error() {
    assert_sus_rejected(
        "#BPM01: 120\n#00002: 1e300\n#00008: 01\n#00010: 14\n",
        "bar length",
    );
}
