//! Core data types that flow through an ingestion pass.
//!
//! A pass turns a batch of [`SourceFile`]s into one [`Corpus`]. Nothing here
//! outlives the session that built it.

use std::path::{Path, PathBuf};

use crate::dispatch::DocumentFormat;

/// A file on local storage, queued for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Name shown in markers and reports (the base name of `path`).
    pub name: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Text extracted from one [`SourceFile`]. Never absent: a failed read
/// carries the inline error marker as its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub failed: bool,
}

impl ExtractedText {
    pub fn ok(text: String) -> Self {
        Self {
            text,
            failed: false,
        }
    }

    pub fn failed(marker: String) -> Self {
        Self {
            text: marker,
            failed: true,
        }
    }

    pub fn empty() -> Self {
        Self::ok(String::new())
    }
}

/// Per-file result of an ingestion pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub name: String,
    /// `None` when the extension is not supported and the file was skipped.
    pub format: Option<DocumentFormat>,
    pub chars: usize,
    pub failed: bool,
}

impl FileOutcome {
    pub fn status(&self) -> &'static str {
        match (self.format, self.failed) {
            (None, _) => "skipped",
            (Some(_), true) => "failed",
            (Some(_), false) => "ok",
        }
    }
}

/// The newline-joined text of one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    text: String,
    files: Vec<FileOutcome>,
}

impl Corpus {
    /// Join extracted texts with `\n`, in the given order.
    pub fn from_parts(parts: Vec<(FileOutcome, ExtractedText)>) -> Self {
        let mut files = Vec::with_capacity(parts.len());
        let mut texts = Vec::with_capacity(parts.len());
        for (outcome, extracted) in parts {
            files.push(outcome);
            texts.push(extracted.text);
        }
        Self {
            text: texts.join("\n"),
            files,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn files(&self) -> &[FileOutcome] {
        &self.files
    }

    /// True when there is nothing to ask about. Whitespace-only text
    /// (e.g. a batch of unsupported files) counts as empty.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn failed_count(&self) -> usize {
        self.files.iter().filter(|f| f.failed).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.files.iter().filter(|f| f.format.is_none()).count()
    }
}

/// A bounded segment of the corpus produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
}
