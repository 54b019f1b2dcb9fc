use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NovelInfo {
    pub title: String,
    pub author: String,
    pub url: String,
    pub volumes: Vec<Volume>,
}

impl NovelInfo {
    pub fn total_chapters(&self) -> usize {
        self.volumes.iter().map(|v| v.chapters.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    pub index: usize,
    pub title: String,
    pub chapters: Vec<ChapterLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChapterLink {
    pub index: usize,
    pub title: String,
    pub url: String,
}

/// Raw chapter fragment as extracted from a chapter page (not yet sanitized).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChapterContent {
    pub title: String,
    pub body_markup: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub index: usize,
    pub source_url: String,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub index: usize,
    pub result: Result<ChapterContent, String>,
}

impl FetchOutcome {
    pub fn content(&self) -> Option<&ChapterContent> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRecord {
    pub title: String,
    pub body_markup: String,
    pub volume_index: usize,
    pub volume_title: String,
    /// Position inside the archive this chapter lands in. Drives spine order, nav order and the
    /// `chapterN.xhtml` filename.
    pub sequence_in_output: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeGroup {
    pub volume_index: usize,
    pub volume_title: String,
    pub chapters: Vec<ChapterRecord>,
}

#[derive(Debug, Clone)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub identifier: uuid::Uuid,
    /// BCP-47 language tag used for package metadata and XHTML documents.
    pub language: String,
    pub chapters: Vec<ChapterRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive(Vec<u8>);

impl Archive {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub percent: u32,
    pub phase: String,
    pub detail: String,
}

impl Progress {
    pub fn new(percent: u32, phase: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            phase: phase.into(),
            detail: detail.into(),
        }
    }
}
