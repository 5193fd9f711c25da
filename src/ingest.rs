//! Corpus assembly.
//!
//! Every acquisition mode (direct upload, archive, remote folder) ends the
//! same way: a list of [`SourceFile`]s in enumeration order is run through
//! the dispatcher and the results are joined into one [`Corpus`].
//! Per-file failures are already markers by the time they reach here; only
//! acquisition itself can fail a pass.

use std::path::Path;

use walkdir::WalkDir;

use crate::dispatch;
use crate::models::{Corpus, FileOutcome, SourceFile};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Failure to gather the files of a pass. The pass yields no corpus.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("could not save uploaded files: {0}")]
    Upload(String),
    #[error("could not read archive: {0}")]
    Archive(String),
    #[error("could not sync remote folder: {0}")]
    RemoteFolder(String),
    #[error("scratch storage unavailable: {0}")]
    Scratch(String),
}

impl AcquisitionError {
    pub fn scratch(err: anyhow::Error) -> Self {
        AcquisitionError::Scratch(format!("{:#}", err))
    }
}

/// Extract every file, in order, and join the texts with newlines.
pub fn assemble(files: &[SourceFile], progress: &dyn ProgressReporter) -> Corpus {
    let total = files.len() as u64;
    let mut parts = Vec::with_capacity(files.len());
    for (i, file) in files.iter().enumerate() {
        progress.report(ProgressEvent::Extracting {
            name: file.name.clone(),
            n: i as u64 + 1,
            total,
        });
        let (format, extracted) = dispatch::read_file(file);
        let outcome = FileOutcome {
            name: file.name.clone(),
            format,
            chars: extracted.text.chars().count(),
            failed: extracted.failed,
        };
        parts.push((outcome, extracted));
    }

    let corpus = Corpus::from_parts(parts);
    tracing::info!(
        files = corpus.files().len(),
        failed = corpus.failed_count(),
        skipped = corpus.skipped_count(),
        chars = corpus.char_count(),
        "corpus assembled"
    );
    corpus
}

/// Every regular file under `root`, recursively, skipping `exclude`.
///
/// Entries are visited in file-name order within each directory, which
/// keeps passes reproducible; callers should still not rely on a
/// particular order.
pub fn walk_files(root: &Path, exclude: Option<&Path>) -> anyhow::Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if exclude.is_some_and(|ex| entry.path() == ex) {
            continue;
        }
        files.push(SourceFile::new(entry.path()));
    }
    Ok(files)
}
