//! Direct multi-file upload.
//!
//! Each uploaded file is persisted into a scratch directory under its own
//! base name, the batch is extracted in submission order, and the scratch
//! directory is released when the pass ends.

use std::path::Path;

use crate::ingest::{self, AcquisitionError};
use crate::models::{Corpus, SourceFile};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::scratch::ScratchDir;

/// One submitted file: its client-side name and contents.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a local file as if it had been uploaded.
    pub fn from_path(path: &Path) -> Result<Self, AcquisitionError> {
        let bytes = std::fs::read(path)
            .map_err(|e| AcquisitionError::Upload(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(base_name(&path.to_string_lossy()), bytes))
    }
}

/// Strip any directory part a client sent along with the file name.
pub fn base_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload".to_string()
    } else {
        base.to_string()
    }
}

pub fn ingest_uploads(
    uploads: &[Upload],
    progress: &dyn ProgressReporter,
) -> Result<Corpus, AcquisitionError> {
    progress.report(ProgressEvent::Acquiring {
        source: format!("{} uploaded file(s)", uploads.len()),
    });
    let scratch = ScratchDir::temp("askdocs-upload-").map_err(AcquisitionError::scratch)?;

    let mut files = Vec::with_capacity(uploads.len());
    for (i, upload) in uploads.iter().enumerate() {
        // One sub-directory per upload keeps duplicate names apart.
        let dir = scratch.path().join(i.to_string());
        std::fs::create_dir_all(&dir)
            .map_err(|e| AcquisitionError::Upload(format!("{}: {}", upload.name, e)))?;
        let path = dir.join(base_name(&upload.name));
        std::fs::write(&path, &upload.bytes)
            .map_err(|e| AcquisitionError::Upload(format!("{}: {}", upload.name, e)))?;
        files.push(SourceFile::new(path));
    }

    Ok(ingest::assemble(&files, progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    #[test]
    fn base_name_strips_client_paths() {
        assert_eq!(base_name("C:\\Users\\me\\report.pdf"), "report.pdf");
        assert_eq!(base_name("dir/sub/notes.txt"), "notes.txt");
        assert_eq!(base_name("../"), "upload");
        assert_eq!(base_name("plain.csv"), "plain.csv");
    }

    #[test]
    fn uploads_joined_in_submission_order() {
        let uploads = vec![
            Upload::new("second.txt", b"two".to_vec()),
            Upload::new("first.txt", b"one".to_vec()),
        ];
        let corpus = ingest_uploads(&uploads, &NoProgress).unwrap();
        assert_eq!(corpus.text(), "two\none");
    }

    #[test]
    fn duplicate_names_are_both_read() {
        let uploads = vec![
            Upload::new("data.txt", b"first copy".to_vec()),
            Upload::new("data.txt", b"second copy".to_vec()),
        ];
        let corpus = ingest_uploads(&uploads, &NoProgress).unwrap();
        assert_eq!(corpus.text(), "first copy\nsecond copy");
    }
}
