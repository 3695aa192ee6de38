//! Upload and edit requests as handed over by the HTTP layer.
//!
//! An edit arrives as optional files plus boolean intent flags. The flags are
//! resolved into one [`SlotIntent`] per file kind up front, so the pipeline
//! never looks at a flag again.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::slots::FileKind;
use crate::validate::ValidationError;

/// One attached file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bytes: Bytes,
    pub filename: Option<String>,
}

impl Upload {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Metadata of a chart. `author` is the credited chart author, not the owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartMetadata {
    pub title: String,
    pub author: String,
    pub artists: String,
    pub rating: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ChartMetadata {
    /// Blank descriptions are stored as none.
    pub fn normalized(mut self) -> Self {
        if self
            .description
            .as_deref()
            .is_some_and(|d| d.trim().is_empty())
        {
            self.description = None;
        }
        self
    }
}

/// Fields an edit sets. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub artists: Option<String>,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// A blank description clears the stored one.
    #[serde(default)]
    pub description: Option<String>,
}

/// How the stored description changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionChange<'a> {
    Keep,
    Clear,
    Set(&'a str),
}

impl MetadataPatch {
    /// Empty tag lists leave tags unchanged.
    pub fn normalized(mut self) -> Self {
        if self.tags.as_ref().is_some_and(|t| t.is_empty()) {
            self.tags = None;
        }
        self
    }

    pub fn description_change(&self) -> DescriptionChange<'_> {
        match self.description.as_deref() {
            None => DescriptionChange::Keep,
            Some(d) if d.trim().is_empty() => DescriptionChange::Clear,
            Some(d) => DescriptionChange::Set(d),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.artists.is_none()
            && self.rating.is_none()
            && self.tags.is_none()
            && self.description.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub metadata: ChartMetadata,
    pub script: Upload,
    pub audio: Upload,
    pub jacket: Upload,
    pub preview: Option<Upload>,
    pub background: Option<Upload>,
}

impl UploadRequest {
    /// Every attached file with its kind.
    pub fn files(&self) -> impl Iterator<Item = (FileKind, &Upload)> {
        [
            (FileKind::Script, Some(&self.script)),
            (FileKind::Audio, Some(&self.audio)),
            (FileKind::Jacket, Some(&self.jacket)),
            (FileKind::Preview, self.preview.as_ref()),
            (FileKind::Background, self.background.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, upload)| upload.map(|u| (kind, u)))
    }
}

/// Intent flags sent alongside an edit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditFlags {
    #[serde(rename = "includes_chart")]
    pub includes_script: bool,
    pub includes_audio: bool,
    pub includes_jacket: bool,
    pub includes_preview: bool,
    pub includes_background: bool,
    pub delete_preview: bool,
    pub delete_background: bool,
}

impl EditFlags {
    fn includes(&self, kind: FileKind) -> bool {
        match kind {
            FileKind::Script => self.includes_script,
            FileKind::Audio => self.includes_audio,
            FileKind::Jacket => self.includes_jacket,
            FileKind::Preview => self.includes_preview,
            FileKind::Background => self.includes_background,
        }
    }

    fn deletes(&self, kind: FileKind) -> bool {
        match kind {
            FileKind::Preview => self.delete_preview,
            FileKind::Background => self.delete_background,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditRequest {
    pub metadata: MetadataPatch,
    pub flags: EditFlags,
    pub script: Option<Upload>,
    pub audio: Option<Upload>,
    pub jacket: Option<Upload>,
    pub preview: Option<Upload>,
    pub background: Option<Upload>,
}

/// What an edit does to one file kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SlotIntent {
    #[default]
    Keep,
    Replace(Upload),
    Remove,
}

/// Resolved per-kind intents of one edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditIntents {
    pub script: SlotIntent,
    pub audio: SlotIntent,
    pub jacket: SlotIntent,
    pub preview: SlotIntent,
    pub background: SlotIntent,
}

impl EditIntents {
    pub fn get(&self, kind: FileKind) -> &SlotIntent {
        match kind {
            FileKind::Script => &self.script,
            FileKind::Audio => &self.audio,
            FileKind::Jacket => &self.jacket,
            FileKind::Preview => &self.preview,
            FileKind::Background => &self.background,
        }
    }

    fn get_mut(&mut self, kind: FileKind) -> &mut SlotIntent {
        match kind {
            FileKind::Script => &mut self.script,
            FileKind::Audio => &mut self.audio,
            FileKind::Jacket => &mut self.jacket,
            FileKind::Preview => &mut self.preview,
            FileKind::Background => &mut self.background,
        }
    }

    /// Files to be stored, with their kind.
    pub fn uploads(&self) -> impl Iterator<Item = (FileKind, &Upload)> {
        FileKind::ALL
            .into_iter()
            .filter_map(|kind| match self.get(kind) {
                SlotIntent::Replace(upload) => Some((kind, upload)),
                _ => None,
            })
    }

    pub fn is_keep_all(&self) -> bool {
        FileKind::ALL
            .into_iter()
            .all(|kind| matches!(self.get(kind), SlotIntent::Keep))
    }
}

fn resolve(kind: FileKind, file: Option<Upload>, flags: &EditFlags) -> Result<SlotIntent, ValidationError> {
    let includes = flags.includes(kind);
    let deletes = flags.deletes(kind);
    if includes && deletes {
        return Err(ValidationError::DeleteAndInclude(kind));
    }
    match (file, includes) {
        (Some(upload), true) => Ok(SlotIntent::Replace(upload)),
        (Some(_), false) if deletes => Err(ValidationError::DeleteAndInclude(kind)),
        (Some(_), false) => Err(ValidationError::UnexpectedFile(kind)),
        (None, true) => Err(ValidationError::FileNotFound(kind)),
        (None, false) if deletes => Ok(SlotIntent::Remove),
        (None, false) => Ok(SlotIntent::Keep),
    }
}

impl EditRequest {
    /// Resolve flags and files into per-kind intents, rejecting inconsistent
    /// combinations.
    pub fn into_changes(self) -> Result<(MetadataPatch, EditIntents), ValidationError> {
        let EditRequest {
            metadata,
            flags,
            script,
            audio,
            jacket,
            preview,
            background,
        } = self;

        let mut intents = EditIntents::default();
        let files = [
            (FileKind::Script, script),
            (FileKind::Audio, audio),
            (FileKind::Jacket, jacket),
            (FileKind::Preview, preview),
            (FileKind::Background, background),
        ];
        for (kind, file) in files {
            *intents.get_mut(kind) = resolve(kind, file, &flags)?;
        }

        Ok((metadata.normalized(), intents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(data: &'static [u8]) -> Option<Upload> {
        Some(Upload::new(Bytes::from_static(data)))
    }

    #[test]
    fn test_no_flags_keeps_everything() {
        let (_, intents) = EditRequest::default().into_changes().unwrap();
        assert!(intents.is_keep_all());
    }

    #[test]
    fn test_included_file_replaces() {
        let request = EditRequest {
            audio: file(b"mp3"),
            flags: EditFlags {
                includes_audio: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let (_, intents) = request.into_changes().unwrap();
        assert!(matches!(intents.audio, SlotIntent::Replace(_)));
        assert_eq!(intents.uploads().count(), 1);
    }

    #[test]
    fn test_flag_without_file() {
        let request = EditRequest {
            flags: EditFlags {
                includes_jacket: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            request.into_changes().unwrap_err(),
            ValidationError::FileNotFound(FileKind::Jacket)
        );
    }

    #[test]
    fn test_file_without_flag() {
        let request = EditRequest {
            script: file(b"#BPM01: 120"),
            ..Default::default()
        };
        assert_eq!(
            request.into_changes().unwrap_err(),
            ValidationError::UnexpectedFile(FileKind::Script)
        );
    }

    #[test]
    fn test_delete_and_include() {
        let request = EditRequest {
            preview: file(b"mp3"),
            flags: EditFlags {
                includes_preview: true,
                delete_preview: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            request.into_changes().unwrap_err(),
            ValidationError::DeleteAndInclude(FileKind::Preview)
        );

        let request = EditRequest {
            background: file(b"png"),
            flags: EditFlags {
                delete_background: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            request.into_changes().unwrap_err(),
            ValidationError::DeleteAndInclude(FileKind::Background)
        );
    }

    #[test]
    fn test_delete_without_file_removes() {
        let request = EditRequest {
            flags: EditFlags {
                delete_background: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let (_, intents) = request.into_changes().unwrap();
        assert_eq!(intents.background, SlotIntent::Remove);
        assert_eq!(intents.preview, SlotIntent::Keep);
    }

    #[test]
    fn test_patch_normalization() {
        let patch = MetadataPatch {
            tags: Some(vec![]),
            description: Some("   ".into()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(patch.tags, None);
        assert_eq!(patch.description_change(), DescriptionChange::Clear);
        assert_eq!(MetadataPatch::default().description_change(), DescriptionChange::Keep);
    }

    #[test]
    fn test_flags_deserialize_with_defaults() {
        let flags: EditFlags =
            serde_json::from_str(r#"{"includes_chart": true, "delete_preview": true}"#).unwrap();
        assert!(flags.includes_script);
        assert!(flags.delete_preview);
        assert!(!flags.includes_audio);
    }

    #[test]
    fn test_upload_files_lists_present_kinds() {
        let request = UploadRequest {
            metadata: ChartMetadata::default(),
            script: Upload::new(Bytes::from_static(b"s")),
            audio: Upload::new(Bytes::from_static(b"a")),
            jacket: Upload::new(Bytes::from_static(b"j")),
            preview: None,
            background: Some(Upload::new(Bytes::from_static(b"b"))),
        };
        let kinds: Vec<_> = request.files().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![FileKind::Script, FileKind::Audio, FileKind::Jacket, FileKind::Background]
        );
    }
}
