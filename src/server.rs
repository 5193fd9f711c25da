//! HTTP front end.
//!
//! A small form application over one shared [`Session`]. Every request
//! takes the session lock for its whole duration, so ingestion passes and
//! model calls never overlap.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | HTML page with all forms, the corpus summary and the last result |
//! | `POST` | `/upload` | Multipart, repeated `files` field |
//! | `POST` | `/upload-zip` | Multipart, one `archive` field |
//! | `POST` | `/folder` | JSON or form: `{ "folder": "<id or url>" }` |
//! | `POST` | `/ask` | JSON or form: `{ "question": "..." }` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unsupported file type: logo.png" } }
//! ```
//!
//! Error codes: `bad_request` (400), `no_corpus` (409),
//! `acquisition_failed` (422), `unavailable` (503), `internal` (500).
//!
//! Browsers (requests accepting `text/html`) are redirected back to `/`
//! after a form post instead of receiving JSON.

use axum::{
    extract::{DefaultBodyLimit, Form, FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::Config;
use crate::connector_upload::{self, Upload};
use crate::connector_zip;
use crate::dispatch::DocumentFormat;
use crate::ingest::AcquisitionError;
use crate::progress::NoProgress;
use crate::query::{QueryOutcome, QueryState};
use crate::session::Session;
use crate::traits::{FolderSync, GenerativeModel};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    session: Arc<Mutex<Session>>,
    model: Arc<dyn GenerativeModel>,
    /// `None` when no Drive credential is configured.
    drive: Option<Arc<dyn FolderSync>>,
}

impl AppState {
    pub fn new(
        config: &Config,
        model: Arc<dyn GenerativeModel>,
        drive: Option<Arc<dyn FolderSync>>,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new(config))),
            model,
            drive,
        }
    }
}

pub fn router(config: &Config, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/upload", post(handle_upload))
        .route("/upload-zip", post(handle_upload_zip))
        .route("/folder", post(handle_folder))
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.server.max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

/// Bind `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config, state: AppState) -> anyhow::Result<()> {
    let app = router(config, state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("askdocs listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<AcquisitionError> for AppError {
    fn from(err: AcquisitionError) -> Self {
        AppError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: "acquisition_failed",
            message: err.to_string(),
        }
    }
}

// ============ Request helpers ============

/// Accepts `application/json` and `application/x-www-form-urlencoded`.
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send + 'static,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| bad_request(e.body_text()))?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| bad_request(e.body_text()))?;
            Ok(Self(value))
        }
    }
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// JSON for API clients, a redirect to the page for browsers.
fn reply<T: Serialize>(headers: &HeaderMap, body: T) -> Response {
    if wants_html(headers) {
        Redirect::to("/").into_response()
    } else {
        Json(body).into_response()
    }
}

// ============ Views ============

#[derive(Serialize)]
struct FileView {
    name: String,
    format: Option<&'static str>,
    chars: usize,
    status: &'static str,
}

#[derive(Serialize)]
struct CorpusView {
    notice: Option<String>,
    files: Vec<FileView>,
    chars: usize,
    chunks: usize,
    can_ask: bool,
}

impl CorpusView {
    fn of(session: &Session) -> Self {
        let corpus = session.corpus();
        Self {
            notice: session.notice().map(str::to_string),
            files: corpus
                .files()
                .iter()
                .map(|f| FileView {
                    name: f.name.clone(),
                    format: f.format.map(DocumentFormat::label),
                    chars: f.chars,
                    status: f.status(),
                })
                .collect(),
            chars: corpus.char_count(),
            chunks: session.chunk_count(),
            can_ask: session.can_ask(),
        }
    }
}

#[derive(Serialize)]
struct ModelErrorView {
    category: &'static str,
    detail: String,
    guidance: &'static str,
}

#[derive(Serialize)]
struct AskView {
    state: &'static str,
    answer: Option<String>,
    diagnostics: Vec<String>,
    error: Option<ModelErrorView>,
}

impl AskView {
    fn of(state: &QueryState) -> Self {
        let mut view = AskView {
            state: "idle",
            answer: None,
            diagnostics: Vec::new(),
            error: None,
        };
        match state {
            QueryState::Idle => {}
            QueryState::InFlight => view.state = "in_flight",
            QueryState::Resolved(outcome) => {
                view.state = outcome.label();
                match outcome {
                    QueryOutcome::Answer(text) => view.answer = Some(text.clone()),
                    QueryOutcome::NoAnswer { diagnostics } => {
                        view.diagnostics = diagnostics.clone()
                    }
                    QueryOutcome::Failed(err) => {
                        view.error = Some(ModelErrorView {
                            category: err.category(),
                            detail: err.detail().to_string(),
                            guidance: err.guidance(),
                        })
                    }
                }
            }
        }
        view
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET / ============

async fn handle_index(State(state): State<AppState>) -> Html<String> {
    let session = state.session.lock().await;
    Html(render_page(&session, state.drive.is_some()))
}

fn render_page(session: &Session, drive_enabled: bool) -> String {
    let accept: Vec<String> = DocumentFormat::all_extensions()
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect();

    let mut files = String::new();
    for f in session.corpus().files() {
        files.push_str(&format!(
            "<li>{} <small>({}, {} chars)</small></li>",
            escape_html(&f.name),
            f.status(),
            f.chars
        ));
    }

    let notice = session
        .notice()
        .map(|n| format!("<p class=\"notice\">{}</p>", escape_html(n)))
        .unwrap_or_default();

    let result = match session.query_state() {
        QueryState::Resolved(outcome) => format!(
            "<h2>Result</h2><pre class=\"{}\">{}</pre>",
            outcome.label(),
            escape_html(&outcome.render())
        ),
        _ => String::new(),
    };

    let folder_form = if drive_enabled {
        "<form method=\"post\" action=\"/folder\">\
         <label>Drive folder id or URL <input name=\"folder\" size=\"60\"></label>\
         <button>Sync folder</button></form>"
    } else {
        "<p><small>Drive folders are disabled (no Drive API key).</small></p>"
    };

    let disabled = if session.can_ask() { "" } else { " disabled" };

    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>askdocs</title></head><body>\
         <h1>askdocs</h1>\
         <form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">\
         <label>Files <input type=\"file\" name=\"files\" multiple accept=\"{accept}\"></label>\
         <button>Upload</button></form>\
         <form method=\"post\" action=\"/upload-zip\" enctype=\"multipart/form-data\">\
         <label>Folder as .zip <input type=\"file\" name=\"archive\" accept=\".zip\"></label>\
         <button>Upload archive</button></form>\
         {folder_form}\
         {notice}<ul>{files}</ul>\
         <form method=\"post\" action=\"/ask\">\
         <label>Question <input name=\"question\" size=\"80\"{disabled}></label>\
         <button{disabled}>Ask</button></form>\
         {result}</body></html>\n",
        accept = accept.join(","),
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ============ POST /upload, /upload-zip ============

async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        if name.is_empty() {
            continue;
        }
        let base = connector_upload::base_name(&name);
        if DocumentFormat::from_path(std::path::Path::new(&base)).is_none() {
            return Err(bad_request(format!("unsupported file type: {}", base)));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        uploads.push(Upload::new(name, bytes.to_vec()));
    }
    if uploads.is_empty() {
        return Err(bad_request("no files submitted in field 'files'"));
    }

    let mut session = state.session.lock().await;
    let pass = tokio::task::spawn_blocking(move || {
        connector_upload::ingest_uploads(&uploads, &NoProgress)
    })
    .await
    .map_err(|e| internal(e.to_string()))?;
    session.apply_pass(pass, &NoProgress)?;
    Ok(reply(&headers, CorpusView::of(&session)))
}

async fn handle_upload_zip(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut archive = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        if field.name() != Some("archive") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        if !name.to_lowercase().ends_with(".zip") {
            return Err(bad_request(format!("expected a .zip archive, got '{}'", name)));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        archive = Some(bytes.to_vec());
        break;
    }
    let bytes = archive.ok_or_else(|| bad_request("no archive submitted in field 'archive'"))?;

    let mut session = state.session.lock().await;
    let pass = tokio::task::spawn_blocking(move || connector_zip::ingest_archive(&bytes, &NoProgress))
        .await
        .map_err(|e| internal(e.to_string()))?;
    session.apply_pass(pass, &NoProgress)?;
    Ok(reply(&headers, CorpusView::of(&session)))
}

// ============ POST /folder ============

#[derive(Deserialize)]
struct FolderRequest {
    folder: String,
}

async fn handle_folder(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonOrForm(req): JsonOrForm<FolderRequest>,
) -> Result<Response, AppError> {
    let drive = state.drive.clone().ok_or_else(|| AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "unavailable",
        message: "Drive folders are disabled: no Drive API key configured".to_string(),
    })?;
    if req.folder.trim().is_empty() {
        return Err(bad_request("folder must not be empty"));
    }

    let mut session = state.session.lock().await;
    session
        .load_folder(drive.as_ref(), &req.folder, &NoProgress)
        .await?;
    Ok(reply(&headers, CorpusView::of(&session)))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonOrForm(req): JsonOrForm<AskRequest>,
) -> Result<Response, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let mut session = state.session.lock().await;
    if !session.can_ask() {
        return Err(AppError {
            status: StatusCode::CONFLICT,
            code: "no_corpus",
            message: "no document text loaded; the question was ignored".to_string(),
        });
    }
    let view = AskView::of(
        session
            .ask(state.model.as_ref(), &req.question, &NoProgress)
            .await,
    );
    Ok(reply(&headers, view))
}
