//! Seams for the two network collaborators.
//!
//! The pipeline never talks to a remote service directly. Remote folders
//! are mirrored through a [`FolderSync`] and prompts are answered by a
//! [`GenerativeModel`]. The built-in implementations are
//! [`DriveSync`](crate::connector_drive::DriveSync) and
//! [`GeminiClient`](crate::llm::GeminiClient); tests swap in stubs.
//!
//! ```text
//!   folder id ──► FolderSync::mirror ──► local dir ──► ingest::assemble ──► Corpus
//!                                                                            │
//!   question ─────────────────────────────────► query::render_prompt ◄───────┘
//!                                                        │
//!                                         GenerativeModel::generate
//! ```

use std::path::Path;

use async_trait::async_trait;

use crate::ingest::AcquisitionError;
use crate::llm::ModelError;

// ═══════════════════════════════════════════════════════════════════════
// FolderSync
// ═══════════════════════════════════════════════════════════════════════

/// Result of mirroring one remote folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Files written to the destination directory.
    pub downloaded: usize,
    /// Remote files that could not be fetched, as `"<name>: <reason>"`.
    pub failed: Vec<String>,
}

/// Mirrors a remote folder into a local directory.
///
/// Implementations recurse into sub-folders and keep going when a single
/// file cannot be fetched, recording it in [`SyncReport::failed`]. Only a
/// failure to reach or list the folder itself is an error.
#[async_trait]
pub trait FolderSync: Send + Sync {
    /// Short label for progress output (e.g. `"drive"`).
    fn name(&self) -> &str;

    /// Copy every file under `folder_id` into `dest`, keeping the
    /// sub-folder layout.
    async fn mirror(&self, folder_id: &str, dest: &Path) -> Result<SyncReport, AcquisitionError>;
}

// ═══════════════════════════════════════════════════════════════════════
// GenerativeModel
// ═══════════════════════════════════════════════════════════════════════

/// Sampling knobs passed with every request. `None` leaves the provider
/// default in place.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// What the model returned for a successful call.
///
/// An empty `text` means the model declined to answer; `diagnostics` then
/// holds whatever the provider said about why (block reason, finish
/// reason, safety categories).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub diagnostics: Vec<String>,
}

impl Generation {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            diagnostics: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Answers one prompt with one synchronous request. No retries.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Model identifier shown in progress output.
    fn model_name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, ModelError>;
}
