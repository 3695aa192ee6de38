//! File kind sniffing by magic bytes.
//!
//! Scripts are not sniffed here; the format detector owns them.

use crate::slots::FileKind;
use crate::validate::ValidationError;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = &[0xff, 0xd8, 0xff];
const ID3_MAGIC: &[u8] = b"ID3";

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(PNG_MAGIC)
}

pub fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(JPEG_MAGIC)
}

/// An ID3v2 tag or an MPEG audio frame sync (11 set bits).
pub fn is_mpeg_audio(bytes: &[u8]) -> bool {
    if bytes.starts_with(ID3_MAGIC) {
        return true;
    }
    matches!(bytes, [0xff, second, ..] if second & 0xe0 == 0xe0)
}

/// Check that `bytes` look like what `kind` promises.
pub fn check_kind(kind: FileKind, bytes: &[u8]) -> Result<(), ValidationError> {
    let (ok, expected) = match kind {
        FileKind::Script => return Ok(()),
        FileKind::Audio | FileKind::Preview => (is_mpeg_audio(bytes), "audio/mpeg"),
        FileKind::Jacket => (is_png(bytes) || is_jpeg(bytes), "image"),
        FileKind::Background => (is_png(bytes), "image/png"),
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::WrongContentType { kind, expected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_accepts_id3_and_frame_sync() {
        assert!(is_mpeg_audio(b"ID3\x04\x00"));
        assert!(is_mpeg_audio(&[0xff, 0xfb, 0x90, 0x00]));
        assert!(!is_mpeg_audio(&[0xff, 0x10]));
        assert!(!is_mpeg_audio(b"RIFF....WAVE"));
        assert!(!is_mpeg_audio(&[]));
    }

    #[test]
    fn test_jacket_accepts_png_and_jpeg() {
        assert_eq!(check_kind(FileKind::Jacket, b"\x89PNG\r\n\x1a\nrest"), Ok(()));
        assert_eq!(check_kind(FileKind::Jacket, &[0xff, 0xd8, 0xff, 0xe0]), Ok(()));
        assert!(check_kind(FileKind::Jacket, b"GIF89a").is_err());
    }

    #[test]
    fn test_background_must_be_png() {
        assert_eq!(
            check_kind(FileKind::Background, &[0xff, 0xd8, 0xff, 0xe0]),
            Err(ValidationError::WrongContentType {
                kind: FileKind::Background,
                expected: "image/png"
            })
        );
    }

    #[test]
    fn test_scripts_are_not_sniffed() {
        assert_eq!(check_kind(FileKind::Script, b"anything"), Ok(()));
    }
}
