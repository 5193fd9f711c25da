//! Extension-based routing to format readers.
//!
//! [`DocumentFormat`] is the closed set of formats the pipeline understands.
//! Each variant is paired with exactly one reader in [`DocumentFormat::reader`];
//! adding a variant without a reader does not compile.

use std::path::Path;

use crate::extract::{self, ExtractError};
use crate::models::{ExtractedText, SourceFile};

/// Signature shared by all format readers: file bytes in, text out.
pub type Reader = fn(&[u8]) -> Result<String, ExtractError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    /// `.txt` and `.csv`, read verbatim.
    PlainText,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 5] = [
        DocumentFormat::Pdf,
        DocumentFormat::Docx,
        DocumentFormat::Xlsx,
        DocumentFormat::Pptx,
        DocumentFormat::PlainText,
    ];

    /// Match a bare extension (no dot), case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            "xlsx" => Some(DocumentFormat::Xlsx),
            "pptx" => Some(DocumentFormat::Pptx),
            "txt" | "csv" => Some(DocumentFormat::PlainText),
            _ => None,
        }
    }

    /// Detect the format from a path's extension. No content sniffing.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            DocumentFormat::Pdf => &["pdf"],
            DocumentFormat::Docx => &["docx"],
            DocumentFormat::Xlsx => &["xlsx"],
            DocumentFormat::Pptx => &["pptx"],
            DocumentFormat::PlainText => &["txt", "csv"],
        }
    }

    /// Short label used in error markers.
    pub fn label(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Docx => "DOCX",
            DocumentFormat::Xlsx => "XLSX",
            DocumentFormat::Pptx => "PPTX",
            DocumentFormat::PlainText => "TXT",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF text layer, page by page (no OCR)",
            DocumentFormat::Docx => "Word body paragraphs",
            DocumentFormat::Xlsx => "every sheet, non-empty rows, cells joined by ' | '",
            DocumentFormat::Pptx => "text of every top-level shape, slide by slide",
            DocumentFormat::PlainText => "verbatim UTF-8, invalid bytes dropped",
        }
    }

    pub fn reader(self) -> Reader {
        match self {
            DocumentFormat::Pdf => extract::read_pdf,
            DocumentFormat::Docx => extract::read_docx,
            DocumentFormat::Xlsx => extract::read_xlsx,
            DocumentFormat::Pptx => extract::read_pptx,
            DocumentFormat::PlainText => extract::read_text,
        }
    }

    /// All accepted extensions, in declaration order.
    pub fn all_extensions() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .flat_map(|f| f.extensions().iter().copied())
            .collect()
    }
}

/// Route one file to its reader.
///
/// Unsupported extensions yield `(None, "")`. Reader failures never escape:
/// they come back as an [`ExtractedText`] holding the error marker.
pub fn read_file(file: &SourceFile) -> (Option<DocumentFormat>, ExtractedText) {
    let Some(format) = DocumentFormat::from_path(file.path()) else {
        tracing::debug!(file = %file.name, "unsupported extension, skipping");
        return (None, ExtractedText::empty());
    };

    let extracted = match extract::extract_file(format, file.path()) {
        Ok(text) => ExtractedText::ok(text),
        Err(e) => {
            tracing::warn!(file = %file.name, format = format.label(), error = %e, "extraction failed");
            ExtractedText::failed(extract::failure_marker(format, &file.name, &e))
        }
    };
    (Some(format), extracted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_match_is_case_insensitive() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/B.PDF")),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("Deck.PpTx")),
            Some(DocumentFormat::Pptx)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("data.CSV")),
            Some(DocumentFormat::PlainText)
        );
    }

    #[test]
    fn unsupported_or_missing_extension() {
        assert_eq!(DocumentFormat::from_path(Path::new("image.png")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("legacy.doc")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("archive.zip")), None);
    }

    #[test]
    fn every_extension_routes_to_exactly_one_format() {
        for ext in DocumentFormat::all_extensions() {
            let owners: Vec<_> = DocumentFormat::ALL
                .iter()
                .filter(|f| f.extensions().contains(&ext))
                .collect();
            assert_eq!(owners.len(), 1, "extension {} has {} owners", ext, owners.len());
            assert_eq!(DocumentFormat::from_extension(ext), Some(*owners[0]));
        }
    }

    #[test]
    fn unsupported_file_reads_as_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg");
        std::fs::write(&path, [0xff, 0xd8, 0xff]).unwrap();
        let (format, text) = read_file(&SourceFile::new(&path));
        assert_eq!(format, None);
        assert_eq!(text, ExtractedText::empty());
    }

    #[test]
    fn corrupted_supported_files_yield_markers() {
        let tmp = tempfile::TempDir::new().unwrap();
        for name in ["broken.pdf", "broken.docx", "broken.xlsx", "broken.pptx"] {
            let path = tmp.path().join(name);
            std::fs::write(&path, b"this is not what the extension claims").unwrap();
            let (format, text) = read_file(&SourceFile::new(&path));
            assert!(format.is_some());
            assert!(text.failed, "{} should fail", name);
            assert!(text.text.contains(name), "marker must name {}: {}", name, text.text);
            assert!(text.text.contains('['));
        }
    }

    #[test]
    fn missing_file_yields_marker() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("gone.txt");
        let (format, text) = read_file(&SourceFile::new(&path));
        assert_eq!(format, Some(DocumentFormat::PlainText));
        assert!(text.failed);
        assert!(text.text.contains("[TXT error gone.txt:"));
    }
}
