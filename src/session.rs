//! One interactive session: the current corpus, its chunk count, and the
//! query stage.
//!
//! Each ingestion pass replaces the corpus wholesale. A failed pass leaves
//! the session with an empty corpus and an abort notice, so a question
//! asked afterwards is ignored instead of running against partial data.

use std::path::PathBuf;

use crate::chunk;
use crate::config::{ChunkingConfig, Config};
use crate::connector_drive;
use crate::connector_upload::{self, Upload};
use crate::connector_zip;
use crate::ingest::AcquisitionError;
use crate::llm;
use crate::models::Corpus;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::query::{QueryStage, QueryState};
use crate::traits::{FolderSync, GenerativeModel};

pub struct Session {
    chunking: ChunkingConfig,
    mirror_dir: Option<PathBuf>,
    corpus: Corpus,
    chunk_count: usize,
    query: QueryStage,
    notice: Option<String>,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            chunking: config.chunking.clone(),
            mirror_dir: config.drive.mirror_dir.clone(),
            corpus: Corpus::default(),
            chunk_count: 0,
            query: QueryStage::new(&config.query, llm::generation_params(&config.model)),
            notice: None,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Summary of the last pass, or why it was aborted.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn query_state(&self) -> &QueryState {
        self.query.state()
    }

    /// Questions are only accepted once a pass produced some text.
    pub fn can_ask(&self) -> bool {
        !self.corpus.is_empty()
    }

    /// Install the result of an ingestion pass.
    pub fn apply_pass(
        &mut self,
        pass: Result<Corpus, AcquisitionError>,
        progress: &dyn ProgressReporter,
    ) -> Result<(), AcquisitionError> {
        self.query.reset();
        match pass {
            Ok(corpus) => {
                // Counted for display only; the prompt uses the raw prefix.
                self.chunk_count = chunk::chunk_count(
                    corpus.text(),
                    self.chunking.chunk_size,
                    self.chunking.chunk_overlap,
                );
                progress.report(ProgressEvent::Chunked {
                    chunks: self.chunk_count as u64,
                });
                self.notice = Some(format!(
                    "Loaded {} file(s): {} failed, {} skipped; {} characters in {} chunks.",
                    corpus.files().len(),
                    corpus.failed_count(),
                    corpus.skipped_count(),
                    corpus.char_count(),
                    self.chunk_count
                ));
                self.corpus = corpus;
                Ok(())
            }
            Err(err) => {
                tracing::warn!("acquisition aborted: {}", err);
                self.corpus = Corpus::default();
                self.chunk_count = 0;
                self.notice = Some(format!("Aborted: {}", err));
                Err(err)
            }
        }
    }

    pub fn load_uploads(
        &mut self,
        uploads: &[Upload],
        progress: &dyn ProgressReporter,
    ) -> Result<(), AcquisitionError> {
        let pass = connector_upload::ingest_uploads(uploads, progress);
        self.apply_pass(pass, progress)
    }

    pub fn load_archive(
        &mut self,
        bytes: &[u8],
        progress: &dyn ProgressReporter,
    ) -> Result<(), AcquisitionError> {
        let pass = connector_zip::ingest_archive(bytes, progress);
        self.apply_pass(pass, progress)
    }

    pub async fn load_folder(
        &mut self,
        sync: &dyn FolderSync,
        folder_ref: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<(), AcquisitionError> {
        let pass =
            connector_drive::ingest_folder(sync, folder_ref, self.mirror_dir.as_deref(), progress)
                .await;
        self.apply_pass(pass, progress)
    }

    /// Ask about the current corpus. Ignored (state stays idle) when the
    /// corpus is empty or the question is blank.
    pub async fn ask(
        &mut self,
        model: &dyn GenerativeModel,
        question: &str,
        progress: &dyn ProgressReporter,
    ) -> &QueryState {
        self.query
            .ask(model, &self.corpus, question, progress)
            .await
    }
}
