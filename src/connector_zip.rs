//! Archive upload.
//!
//! The archive is written into a scratch directory, unpacked into a
//! sibling `extracted/` tree, and every regular file found there (walking
//! sub-directories) is fed to the dispatcher. The archive itself is never
//! part of the batch. A corrupt archive aborts the pass.

use std::path::Path;

use crate::ingest::{self, AcquisitionError};
use crate::models::Corpus;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::scratch::ScratchDir;

const ARCHIVE_FILE: &str = "upload.zip";
const EXTRACT_DIR: &str = "extracted";

pub fn ingest_archive_path(
    path: &Path,
    progress: &dyn ProgressReporter,
) -> Result<Corpus, AcquisitionError> {
    let bytes = std::fs::read(path)
        .map_err(|e| AcquisitionError::Archive(format!("{}: {}", path.display(), e)))?;
    ingest_archive(&bytes, progress)
}

pub fn ingest_archive(
    bytes: &[u8],
    progress: &dyn ProgressReporter,
) -> Result<Corpus, AcquisitionError> {
    progress.report(ProgressEvent::Acquiring {
        source: "zip archive".to_string(),
    });
    let scratch = ScratchDir::temp("askdocs-zip-").map_err(AcquisitionError::scratch)?;

    let archive_path = scratch.path().join(ARCHIVE_FILE);
    std::fs::write(&archive_path, bytes)
        .map_err(|e| AcquisitionError::Archive(e.to_string()))?;

    let target = scratch.path().join(EXTRACT_DIR);
    unpack(bytes, &target)?;

    let files = ingest::walk_files(&target, Some(&archive_path))
        .map_err(|e| AcquisitionError::Archive(format!("{:#}", e)))?;
    tracing::info!(files = files.len(), "archive unpacked");

    Ok(ingest::assemble(&files, progress))
}

/// Unpack every entry under `target`. Entries whose path would leave
/// `target` are rejected by the zip reader.
fn unpack(bytes: &[u8], target: &Path) -> Result<(), AcquisitionError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| AcquisitionError::Archive(e.to_string()))?;
    std::fs::create_dir_all(target).map_err(|e| AcquisitionError::Archive(e.to_string()))?;
    archive
        .extract(target)
        .map_err(|e| AcquisitionError::Archive(e.to_string()))
}
