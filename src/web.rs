//! Interactive entry point: an upload form and a small JSON API (axum).
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /` | HTML form: decks, user name, identifier prefix, prompt, template |
//! | `POST /upload` | multipart upload, converts every `.pptx` part |
//! | `GET /download/{filename}` | fetch a rendered document |
//! | `POST /api/convert` | one base64-encoded deck as JSON |
//! | `GET /api/health` | liveness |
//!
//! Every request builds its own [`ConversionConfig`] from the server's base
//! config plus the submitted fields, then runs the same
//! [`SopGenerator`] the batch CLI uses. Uploaded decks live in a temporary
//! directory that is removed when the request finishes.

use crate::config::ConversionConfig;
use crate::convert::SopGenerator;
use crate::error::SopError;
use crate::output::BatchOutput;
use crate::prompts::DEFAULT_SOP_PROMPT;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

/// Largest request body accepted (multipart or JSON).
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Template file name pre-filled in the form.
pub const DEFAULT_TEMPLATE_NAME: &str = "LS-sop.docx";

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

/// Shared state: the base configuration and where named templates live.
#[derive(Clone)]
pub struct AppState {
    base: Arc<ConversionConfig>,
    template_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(base: ConversionConfig, template_dir: impl Into<PathBuf>) -> Self {
        Self {
            base: Arc::new(base),
            template_dir: Arc::new(template_dir.into()),
        }
    }

    /// The base config with one request's form fields applied.
    fn request_config(&self, options: &RequestOptions) -> ConversionConfig {
        let mut config = (*self.base).clone();
        if let Some(name) = non_blank(&options.user_name) {
            config.user_name = name.to_string();
        }
        if let Some(ref prefix) = options.id_prefix {
            config.id_prefix = Some(prefix.trim().to_string()).filter(|p| !p.is_empty());
        }
        if let Some(prompt) = non_blank(&options.prompt) {
            config.prompt = Some(prompt.to_string());
        }
        if let Some(template) = non_blank(&options.template) {
            config.template_path = self.template_dir.join(secure_filename(template));
        }
        config
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Per-request overrides submitted with the decks.
#[derive(Debug, Default, Deserialize)]
struct RequestOptions {
    user_name: Option<String>,
    id_prefix: Option<String>,
    prompt: Option<String>,
    template: Option<String>,
}

/// Body of `POST /api/convert`.
#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    /// The deck, base64-encoded.
    pub file_content: String,
    pub filename: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub id_prefix: Option<String>,
}

/// Result of a conversion request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub success: bool,
    /// Decks that produced a document.
    pub processed: usize,
    pub failed: usize,
    /// Names to pass to `/download/{filename}`.
    pub output_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl From<BatchOutput> for ConvertResponse {
    fn from(batch: BatchOutput) -> Self {
        Self {
            success: true,
            processed: batch.stats.processed_files,
            failed: batch.stats.failed_files,
            output_files: batch.output_names(),
            errors: batch
                .files
                .iter()
                .filter_map(|f| f.error.as_ref().map(ToString::to_string))
                .collect(),
        }
    }
}

/// An error answered as `{"success": false, "error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<SopError> for ApiError {
    fn from(e: SopError) -> Self {
        error!("Processing error: {}", e);
        Self::internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Build the router. Exposed so callers can mount it elsewhere or serve it
/// on their own listener.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/download/:filename", get(download))
        .route("/api/convert", post(api_convert))
        .route("/api/health", get(|| async { Json(serde_json::json!({ "status": "ok" })) }))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
#[instrument(skip(state))]
pub async fn start_server(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = router(state);
    let listener = TcpListener::bind(&addr).await?;
    info!("SOP generator listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(index_page(&state.base.user_name))
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ConvertResponse>, ApiError> {
    let staging = TempDir::new().map_err(|e| ApiError::internal(format!("staging dir: {e}")))?;
    let mut options = RequestOptions::default();
    let mut decks = Vec::new();
    let mut saw_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid upload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                saw_file = true;
                let original = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("invalid upload: {e}")))?;
                if !original.to_ascii_lowercase().ends_with(".pptx") {
                    warn!("Ignoring non-.pptx upload '{}'", original);
                    continue;
                }
                decks.push(stage_deck(staging.path(), &original, &data).await?);
            }
            "user_name" | "mango_prefix" | "id_prefix" | "prompt" | "template" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("invalid form field: {e}")))?;
                match name.as_str() {
                    "user_name" => options.user_name = Some(value),
                    "prompt" => options.prompt = Some(value),
                    "template" => options.template = Some(value),
                    _ => options.id_prefix = Some(value),
                }
            }
            _ => {}
        }
    }

    if !saw_file {
        return Err(ApiError::bad_request("No files uploaded"));
    }
    if decks.is_empty() {
        return Err(ApiError::bad_request("No valid PowerPoint files uploaded"));
    }

    run(&state, &options, &decks).await
}

async fn api_convert(
    State(state): State<AppState>,
    Json(request): Json<ConvertRequest>,
) -> Result<Json<ConvertResponse>, ApiError> {
    if !request.filename.to_ascii_lowercase().ends_with(".pptx") {
        return Err(ApiError::bad_request("filename must end in .pptx"));
    }
    let data = base64::engine::general_purpose::STANDARD
        .decode(request.file_content.trim())
        .map_err(|e| ApiError::bad_request(format!("file_content is not valid base64: {e}")))?;

    let staging = TempDir::new().map_err(|e| ApiError::internal(format!("staging dir: {e}")))?;
    let deck = stage_deck(staging.path(), &request.filename, &data).await?;
    let options = RequestOptions {
        user_name: request.user_name,
        id_prefix: request.id_prefix,
        prompt: request.prompt,
        template: request.template,
    };

    run(&state, &options, &[deck]).await
}

async fn download(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, ApiError> {
    let name = secure_filename(&filename);
    let not_found = || ApiError {
        status: StatusCode::NOT_FOUND,
        message: "File not found".into(),
    };
    if name.is_empty() {
        return Err(not_found());
    }

    let path = state.base.output_dir.join(&name);
    let bytes = tokio::fs::read(&path).await.map_err(|_| not_found())?;
    let headers = [
        (header::CONTENT_TYPE, DOCX_MIME.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        ),
    ];
    Ok((headers, bytes).into_response())
}

/// Save an upload under its sanitized name, adding `-2`, `-3`, … to the
/// stem when an earlier upload in the request already took that name.
async fn stage_deck(dir: &Path, original: &str, data: &[u8]) -> Result<PathBuf, ApiError> {
    let name = secure_filename(original);
    if name.is_empty() {
        return Err(ApiError::bad_request(format!("invalid file name '{original}'")));
    }
    let path = unique_path(dir, &name);
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| ApiError::internal(format!("saving upload: {e}")))?;
    Ok(path)
}

fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    (2..)
        .map(|n| dir.join(format!("{stem}-{n}{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

async fn run(
    state: &AppState,
    options: &RequestOptions,
    decks: &[PathBuf],
) -> Result<Json<ConvertResponse>, ApiError> {
    let config = state.request_config(options);
    // Loads the template and creates the output directory.
    let generator = tokio::task::spawn_blocking(move || SopGenerator::new(&config))
        .await
        .map_err(|e| ApiError::internal(format!("generator setup: {e}")))??;
    let batch = generator.process_batch(decks).await;
    Ok(Json(ConvertResponse::from(batch)))
}

/// Reduce a client-supplied name to a safe single path component.
///
/// `../../etc/passwd` → `etc_passwd`, `My Deck.pptx` → `My_Deck.pptx`.
pub fn secure_filename(name: &str) -> String {
    let spaced = name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = RE_UNSAFE_CHARS.replace_all(&joined, "");
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn index_page(default_user: &str) -> String {
    INDEX_HTML
        .replace("{{USER_NAME}}", &escape_html(default_user))
        .replace("{{TEMPLATE}}", DEFAULT_TEMPLATE_NAME)
        .replace("{{PROMPT}}", &escape_html(DEFAULT_SOP_PROMPT))
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>SOP Generator - PowerPoint to Word</title>
  <style>
    body { font-family: Verdana, Arial, sans-serif; margin: 40px; background: #f5f5f5; }
    .container { background: white; padding: 30px; border-radius: 8px; max-width: 800px; margin: 0 auto; }
    .upload-area { border: 2px dashed #4CAF50; padding: 30px; text-align: center; margin: 20px 0; }
    .form-group { margin: 20px 0; }
    label { display: block; font-weight: bold; margin-bottom: 5px; }
    input[type="text"], textarea { width: 100%; padding: 8px; box-sizing: border-box; }
    textarea { font-family: monospace; font-size: 12px; }
    button { background: #4CAF50; color: white; padding: 12px 24px; border: none; cursor: pointer; }
    .status { margin-top: 20px; padding: 10px; }
    .success { background: #c8e6c9; color: #2e7d32; }
    .error { background: #ffcccc; color: #cc0000; }
  </style>
</head>
<body>
  <div class="container">
    <h1>Standard Operating Procedure Generator</h1>
    <p>Convert PowerPoint work instructions to SOP Word documents.</p>
    <form method="POST" enctype="multipart/form-data" action="/upload" id="uploadForm">
      <div class="upload-area">
        <p><strong>Select PowerPoint files to convert:</strong></p>
        <input type="file" name="files" multiple accept=".pptx" required>
      </div>
      <div class="form-group">
        <label for="user_name">Your Name (for revision tracking):</label>
        <input type="text" name="user_name" id="user_name" value="{{USER_NAME}}" required>
      </div>
      <div class="form-group">
        <label for="mango_prefix">Document ID Prefix (optional):</label>
        <input type="text" name="mango_prefix" id="mango_prefix" placeholder="e.g., MANGO-2024-">
      </div>
      <div class="form-group">
        <label for="prompt">Model Prompt (customize if needed):</label>
        <textarea name="prompt" id="prompt" rows="10">{{PROMPT}}</textarea>
      </div>
      <div class="form-group">
        <label for="template">Template Filename:</label>
        <input type="text" name="template" id="template" value="{{TEMPLATE}}" required>
      </div>
      <button type="submit">Generate SOP Documents</button>
    </form>
    <div class="status" id="status" style="display: none;"></div>
    <div id="downloads"></div>
  </div>
  <script>
    document.getElementById('uploadForm').addEventListener('submit', async function (e) {
      e.preventDefault();
      const status = document.getElementById('status');
      const downloads = document.getElementById('downloads');
      status.style.display = 'block';
      status.className = 'status';
      status.textContent = 'Processing files... Please wait.';
      downloads.innerHTML = '';
      try {
        const response = await fetch('/upload', { method: 'POST', body: new FormData(this) });
        const result = await response.json();
        if (!result.success) throw new Error(result.error || 'Processing failed');
        status.className = 'status success';
        status.textContent = `Processed ${result.processed} file(s), ${result.failed} failed.`;
        const list = document.createElement('ul');
        for (const file of result.output_files) {
          const item = document.createElement('li');
          const link = document.createElement('a');
          link.href = '/download/' + encodeURIComponent(file);
          link.textContent = file;
          item.appendChild(link);
          list.appendChild(item);
        }
        downloads.appendChild(list);
      } catch (err) {
        status.className = 'status error';
        status.textContent = 'Error: ' + err.message;
      }
    });
  </script>
</body>
</html>
"#;
