//! Google Drive folder connector.
//!
//! Mirrors a shared Drive folder into a local scratch directory through the
//! Drive v3 REST API, then runs the mirrored tree through the same
//! assembler as the archive mode. Sub-folders are walked recursively,
//! listings are paginated, and Google-native documents are exported to
//! their Office equivalents so the regular readers can handle them.
//!
//! # Configuration
//!
//! ```toml
//! [drive]
//! api_key_env = "GOOGLE_API_KEY"
//! # endpoint = "http://localhost:9000"   # test double
//! # mirror_dir = "/var/tmp/askdocs-drive" # cleared before every sync
//! ```
//!
//! A file that fails to download is logged and skipped. A folder that
//! cannot be read (bad id, no access, network down) aborts the pass.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{ApiKey, DriveConfig};
use crate::ingest::{self, AcquisitionError};
use crate::models::Corpus;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::scratch::ScratchDir;
use crate::traits::{FolderSync, SyncReport};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps.";

/// Pull a folder id out of a raw id or a Drive URL
/// (`.../drive/folders/<id>?usp=sharing`, `...open?id=<id>`).
pub fn parse_folder_id(input: &str) -> Option<String> {
    let input = input.trim();
    let candidate = if let Some((_, rest)) = input.split_once("/folders/") {
        rest.split(['/', '?', '#']).next().unwrap_or_default()
    } else if let Some(query) = input.split_once('?').map(|(_, q)| q) {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("id="))
            .unwrap_or_default()
            .split('#')
            .next()
            .unwrap_or_default()
    } else {
        input
    };

    let valid = !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| candidate.to_string())
}

/// Mirror `folder_ref` and assemble the mirrored files into a corpus.
///
/// `mirror_dir` pins the scratch location; it is wiped before the sync and
/// removed afterwards. Without it a fresh temp directory is used.
pub async fn ingest_folder(
    sync: &dyn FolderSync,
    folder_ref: &str,
    mirror_dir: Option<&Path>,
    progress: &dyn ProgressReporter,
) -> Result<Corpus, AcquisitionError> {
    let folder_id = parse_folder_id(folder_ref).ok_or_else(|| {
        AcquisitionError::RemoteFolder(format!(
            "'{}' is not a folder id or folder URL",
            folder_ref.trim()
        ))
    })?;

    progress.report(ProgressEvent::Acquiring {
        source: format!("{} folder {}", sync.name(), folder_id),
    });
    let scratch =
        ScratchDir::acquire(mirror_dir, "askdocs-drive-").map_err(AcquisitionError::scratch)?;

    let report = sync.mirror(&folder_id, scratch.path()).await?;
    for failure in &report.failed {
        tracing::warn!(folder = %folder_id, "skipped remote file: {}", failure);
    }
    tracing::info!(
        folder = %folder_id,
        downloaded = report.downloaded,
        failed = report.failed.len(),
        "folder mirrored"
    );

    let files = ingest::walk_files(scratch.path(), None)
        .map_err(|e| AcquisitionError::RemoteFolder(format!("{:#}", e)))?;
    Ok(ingest::assemble(&files, progress))
}

// ============ Drive client ============

/// [`FolderSync`] over the Drive v3 API, authenticated with an API key.
/// The folder must be shared so that the key can read it.
pub struct DriveSync {
    client: reqwest::Client,
    endpoint: String,
    api_key: ApiKey,
}

impl DriveSync {
    pub fn new(config: &DriveConfig, api_key: ApiKey) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.endpoint)
    }

    async fn folder_metadata(&self, folder_id: &str) -> Result<DriveFile> {
        let url = format!("{}/{}", self.files_url(), folder_id);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.expose()),
                ("fields", "id,name,mimeType"),
                ("supportsAllDrives", "true"),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to reach Drive for folder {}", folder_id))?;
        let body = check_status(resp, "folder lookup").await?;
        serde_json::from_str(&body).context("Malformed Drive folder metadata")
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>> {
        let query = format!("'{}' in parents and trashed = false", folder_id);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self.client.get(self.files_url()).query(&[
                ("key", self.api_key.expose()),
                ("q", query.as_str()),
                ("fields", "nextPageToken,files(id,name,mimeType)"),
                ("pageSize", "1000"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ]);
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }

            let resp = req
                .send()
                .await
                .with_context(|| format!("Failed to list Drive folder {}", folder_id))?;
            let body = check_status(resp, "folder listing").await?;
            let page = parse_file_list(&body)?;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }

    async fn download(&self, file: &DriveFile, dest: &Path) -> Result<PathBuf> {
        let (url, export_mime, file_name) = match export_target(&file.mime_type) {
            Some((mime, ext)) => (
                format!("{}/{}/export", self.files_url(), file.id),
                Some(mime),
                format!("{}.{}", safe_name(&file.name), ext),
            ),
            None if file.mime_type.starts_with(GOOGLE_APPS_PREFIX) => {
                anyhow::bail!("{} has no downloadable form", file.mime_type)
            }
            None => (
                format!("{}/{}", self.files_url(), file.id),
                None,
                safe_name(&file.name),
            ),
        };

        let mut req = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.expose())]);
        req = match export_mime {
            Some(mime) => req.query(&[("mimeType", mime)]),
            None => req.query(&[("alt", "media"), ("supportsAllDrives", "true")]),
        };

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "HTTP {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            );
        }
        let bytes = resp.bytes().await?;

        let mut path = dest.join(&file_name);
        if path.exists() {
            path = dest.join(format!("{}_{}", file.id, file_name));
        }
        std::fs::write(&path, &bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[async_trait]
impl FolderSync for DriveSync {
    fn name(&self) -> &str {
        "drive"
    }

    async fn mirror(&self, folder_id: &str, dest: &Path) -> Result<SyncReport, AcquisitionError> {
        let remote = |e: anyhow::Error| AcquisitionError::RemoteFolder(format!("{:#}", e));

        let root = self.folder_metadata(folder_id).await.map_err(remote)?;
        if root.mime_type != FOLDER_MIME {
            return Err(AcquisitionError::RemoteFolder(format!(
                "'{}' is not a folder ({})",
                root.name, root.mime_type
            )));
        }

        let mut report = SyncReport::default();
        let mut pending = vec![(root.id, dest.to_path_buf())];

        while let Some((id, dir)) = pending.pop() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))
                .map_err(remote)?;
            let children = self.list_children(&id).await.map_err(remote)?;

            for child in children {
                if child.mime_type == FOLDER_MIME {
                    pending.push((child.id, dir.join(safe_name(&child.name))));
                    continue;
                }
                match self.download(&child, &dir).await {
                    Ok(path) => {
                        tracing::debug!(file = %child.name, path = %path.display(), "downloaded");
                        report.downloaded += 1;
                    }
                    Err(e) => report.failed.push(format!("{}: {:#}", child.name, e)),
                }
            }
        }

        Ok(report)
    }
}

// ============ Listing payloads ============

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

fn parse_file_list(body: &str) -> Result<FileList> {
    serde_json::from_str(body).context("Malformed Drive file listing")
}

async fn check_status(resp: reqwest::Response, what: &str) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!(
            "Drive {} failed (HTTP {}): {}",
            what,
            status,
            body.chars().take(500).collect::<String>()
        );
    }
    Ok(body)
}

/// Office format to export a Google-native document as.
fn export_target(mime_type: &str) -> Option<(&'static str, &'static str)> {
    match mime_type {
        "application/vnd.google-apps.document" => Some((
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "docx",
        )),
        "application/vnd.google-apps.spreadsheet" => Some((
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "xlsx",
        )),
        "application/vnd.google-apps.presentation" => Some((
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "pptx",
        )),
        _ => None,
    }
}

/// Drive names may contain path separators; keep them inside the mirror.
fn safe_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "untitled".to_string(),
        other => other.to_string(),
    }
}
