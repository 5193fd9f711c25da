//! Whole-pipeline scenarios through the library, with the model and the
//! remote folder replaced by in-process stubs.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use askdocs::config::Config;
use askdocs::connector_upload::Upload;
use askdocs::ingest::AcquisitionError;
use askdocs::llm::ModelError;
use askdocs::progress::NoProgress;
use askdocs::query::{QueryOutcome, QueryState};
use askdocs::session::Session;
use askdocs::traits::{
    FolderSync, Generation, GenerationParams, GenerativeModel, SyncReport,
};

/// Returns a fixed reply and remembers every prompt it was given.
struct RecordingModel {
    reply: Result<Generation, ModelError>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    fn answering(text: &str) -> Self {
        Self {
            reply: Ok(Generation::answer(text)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for RecordingModel {
    fn model_name(&self) -> &str {
        "recording-stub"
    }

    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<Generation, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone()
    }
}

/// Writes a fixed tree into the destination, or refuses the folder.
struct StubDrive {
    files: Vec<(&'static str, &'static [u8])>,
    calls: AtomicUsize,
}

#[async_trait]
impl FolderSync for StubDrive {
    fn name(&self) -> &str {
        "stub-drive"
    }

    async fn mirror(&self, folder_id: &str, dest: &Path) -> Result<SyncReport, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if folder_id != "goodFolder" {
            return Err(AcquisitionError::RemoteFolder(format!(
                "Drive folder lookup failed (HTTP 404 Not Found): File not found: {}",
                folder_id
            )));
        }
        for (rel, body) in &self.files {
            let path = dest.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, body).unwrap();
        }
        Ok(SyncReport {
            downloaded: self.files.len(),
            failed: vec!["video.mp4: HTTP 403".to_string()],
        })
    }
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

#[tokio::test]
async fn single_text_upload_answers_profit_question() {
    let mut session = Session::new(&Config::minimal());
    session
        .load_uploads(
            &[Upload::new("finance.txt", b"Revenue: 100\nCost: 40".to_vec())],
            &NoProgress,
        )
        .unwrap();
    assert_eq!(session.corpus().text(), "Revenue: 100\nCost: 40");

    let model = RecordingModel::answering("60");
    let state = session
        .ask(&model, "What is the profit?", &NoProgress)
        .await
        .clone();
    assert_eq!(state, QueryState::Resolved(QueryOutcome::Answer("60".into())));

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Revenue: 100\nCost: 40"));
    assert!(prompts[0].contains("What is the profit?"));
}

#[test]
fn zip_with_corrupt_pdf_and_text_keeps_both() {
    let mut session = Session::new(&Config::minimal());
    let archive = zip_bytes(&[
        ("scan.pdf", &b"%PDF-1.7\n%%%% truncated garbage"[..]),
        ("notes/summary.txt", &b"The full text of the valid file."[..]),
    ]);
    session.load_archive(&archive, &NoProgress).unwrap();

    let text = session.corpus().text();
    assert!(text.contains("[PDF error scan.pdf:"), "corpus: {}", text);
    assert!(text.contains("The full text of the valid file."));
    assert_eq!(session.corpus().failed_count(), 1);
    assert!(session.can_ask());
}

#[tokio::test]
async fn invalid_folder_aborts_and_question_is_ignored() {
    let drive = StubDrive {
        files: vec![],
        calls: AtomicUsize::new(0),
    };
    let mut session = Session::new(&Config::minimal());

    let err = session
        .load_folder(&drive, "missingFolder", &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, AcquisitionError::RemoteFolder(_)));
    assert!(session.corpus().text().is_empty());
    assert!(!session.can_ask());
    assert!(session.notice().unwrap().contains("File not found"));

    let model = RecordingModel::answering("should not be used");
    let state = session.ask(&model, "Anything there?", &NoProgress).await;
    assert_eq!(state, &QueryState::Idle);
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn unparseable_folder_reference_never_reaches_remote() {
    let drive = StubDrive {
        files: vec![],
        calls: AtomicUsize::new(0),
    };
    let mut session = Session::new(&Config::minimal());
    let err = session
        .load_folder(&drive, "https://example.com/nothing", &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, AcquisitionError::RemoteFolder(_)));
    assert_eq!(drive.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn mirrored_folder_is_read_recursively() {
    let drive = StubDrive {
        files: vec![
            ("a.txt", &b"alpha"[..]),
            ("sub/b.csv", &b"x,y"[..]),
            ("sub/deeper/c.txt", &b"gamma"[..]),
            ("image.png", &[0x89u8, 0x50, 0x4e, 0x47][..]),
        ],
        calls: AtomicUsize::new(0),
    };
    let mut session = Session::new(&Config::minimal());
    session
        .load_folder(
            &drive,
            "https://drive.google.com/drive/folders/goodFolder?usp=sharing",
            &NoProgress,
        )
        .await
        .unwrap();

    let corpus = session.corpus();
    assert_eq!(corpus.files().len(), 4);
    assert_eq!(corpus.skipped_count(), 1);
    for part in ["alpha", "x,y", "gamma"] {
        assert!(corpus.text().contains(part));
    }
}

#[tokio::test]
async fn mirror_dir_is_cleared_and_removed() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mirror = tmp.path().join("mirror");
    std::fs::create_dir_all(&mirror).unwrap();
    std::fs::write(mirror.join("leftover.txt"), "from another session").unwrap();

    let mut config = Config::minimal();
    config.drive.mirror_dir = Some(mirror.clone());
    let drive = StubDrive {
        files: vec![("fresh.txt", &b"fresh"[..])],
        calls: AtomicUsize::new(0),
    };
    let mut session = Session::new(&config);
    session
        .load_folder(&drive, "goodFolder", &NoProgress)
        .await
        .unwrap();

    assert_eq!(session.corpus().text(), "fresh");
    assert!(!mirror.exists());
}

#[tokio::test]
async fn long_corpus_is_cut_at_the_configured_cutoff() {
    let mut config = Config::minimal();
    config.query.cutoff_chars = 50;
    let mut session = Session::new(&config);
    let body = format!("{}{}", "a".repeat(50), "TAIL-MARKER");
    session
        .load_uploads(&[Upload::new("big.txt", body.into_bytes())], &NoProgress)
        .unwrap();

    let model = RecordingModel::answering("ok");
    session.ask(&model, "q", &NoProgress).await;
    let prompt = &model.prompts()[0];
    assert!(prompt.contains(&"a".repeat(50)));
    assert!(!prompt.contains("TAIL"));
}
