//! Ingestion and query progress reporting.
//!
//! Progress is emitted on **stderr** so stdout stays parseable for scripts.
//! The pipeline blocks while a pass or a model call runs; these events are
//! the only sign of life in the meantime.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Files are being gathered (upload persisted, archive unpacked, folder mirrored).
    Acquiring { source: String },
    /// File `n` of `total` is being read.
    Extracting { name: String, n: u64, total: u64 },
    /// The corpus was split into this many chunks.
    Chunked { chunks: u64 },
    /// A model request is in flight.
    Querying { model: String },
    /// The model request finished (answer, no answer, or error).
    Resolved { outcome: String },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "[3/12] reading report.pdf".
pub struct StderrProgress;

fn human_line(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Acquiring { source } => format!("acquiring {}...", source),
        ProgressEvent::Extracting { name, n, total } => {
            format!("[{}/{}] reading {}", n, total, name)
        }
        ProgressEvent::Chunked { chunks } => format!("split into {} chunk(s)", chunks),
        ProgressEvent::Querying { model } => format!("waiting for {}...", model),
        ProgressEvent::Resolved { outcome } => format!("done: {}", outcome),
    }
}

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", human_line(&event));
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

fn json_line(event: &ProgressEvent) -> serde_json::Value {
    use serde_json::json;
    let (phase, mut detail) = match event {
        ProgressEvent::Acquiring { source } => ("acquiring", json!({ "source": source })),
        ProgressEvent::Extracting { name, n, total } => (
            "extracting",
            json!({ "file": name, "n": n, "total": total }),
        ),
        ProgressEvent::Chunked { chunks } => ("chunked", json!({ "chunks": chunks })),
        ProgressEvent::Querying { model } => ("querying", json!({ "model": model })),
        ProgressEvent::Resolved { outcome } => ("resolved", json!({ "outcome": outcome })),
    };
    detail["event"] = json!("progress");
    detail["phase"] = json!(phase);
    detail
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", json_line(&event));
        let _ = err.flush();
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
