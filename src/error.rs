//! Error types for the pptx2sop library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SopError`] — **Fatal**: the batch cannot start at all (template
//!   missing, no API credential, unreadable prompt file). Returned as
//!   `Err(SopError)` from [`crate::convert::SopGenerator::new`] and the
//!   top-level `convert*` functions, before any deck is touched.
//!
//! * [`FileError`] — **Non-fatal**: a single deck failed (corrupt archive,
//!   network error, rejected credential) but its siblings are fine. Stored
//!   inside [`crate::output::FileResult`] so callers see which positions of
//!   the batch failed and why.
//!
//! A model reply that is not valid JSON is neither: the document is still
//! produced from a degraded context, see
//! [`crate::pipeline::interpret::Interpretation`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pptx2sop library.
#[derive(Debug, Error)]
pub enum SopError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The Word template does not exist at the configured path.
    #[error("Template not found: '{path}'\nCheck --template points to an existing .docx file.")]
    TemplateNotFound { path: PathBuf },

    /// The template exists but is not a readable .docx archive.
    #[error("Template '{path}' is not a valid .docx archive: {detail}")]
    InvalidTemplate { path: PathBuf, detail: String },

    /// No API credential and no pre-built provider were configured.
    #[error("No model API key configured.\nSet CLAUDE_API_KEY or pass --api-key.")]
    MissingCredential,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A prompt file was given but could not be read.
    #[error("Failed to read prompt file '{path}': {source}")]
    PromptReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The batch input path does not exist.
    #[error("Input not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// The input directory holds no `.pptx` files.
    #[error("No .pptx files found in '{path}'")]
    NoDecksFound { path: PathBuf },

    /// The input directory could not be listed.
    #[error("Failed to scan input directory '{path}': {source}")]
    InputScanFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Pipeline stage a [`FileError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Model,
    Render,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Extract => "extract",
            Stage::Model => "model",
            Stage::Render => "render",
            Stage::Write => "write",
        };
        f.write_str(s)
    }
}

/// A non-fatal error for a single deck.
///
/// The batch continues past it; the file's slot in
/// [`crate::output::BatchOutput`] is marked absent.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum FileError {
    /// The deck is corrupt, not a .pptx, or could not be read.
    #[error("{file}: unreadable deck: {detail}")]
    UnreadableDeck { file: String, detail: String },

    /// Connection failure or timeout talking to the model endpoint.
    #[error("{file}: network error: {detail}")]
    NetworkFailure { file: String, detail: String },

    /// The endpoint rejected the credential.
    #[error("{file}: authentication failed: {detail}")]
    AuthFailure { file: String, detail: String },

    /// The endpoint answered with a non-success status.
    #[error("{file}: model API error: {detail}")]
    ApiError { file: String, detail: String },

    /// A success status whose body is not the expected reply shape.
    #[error("{file}: malformed model response: {detail}")]
    MalformedResponse { file: String, detail: String },

    /// A template placeholder had no value in the document context.
    #[error("{file}: template rendering failed: {detail}")]
    RenderError { file: String, detail: String },

    /// The rendered document could not be written.
    #[error("{file}: failed to write output: {detail}")]
    OutputWriteFailed { file: String, detail: String },
}

impl FileError {
    /// The stage this error was raised in.
    pub fn stage(&self) -> Stage {
        match self {
            FileError::UnreadableDeck { .. } => Stage::Extract,
            FileError::NetworkFailure { .. }
            | FileError::AuthFailure { .. }
            | FileError::ApiError { .. }
            | FileError::MalformedResponse { .. } => Stage::Model,
            FileError::RenderError { .. } => Stage::Render,
            FileError::OutputWriteFailed { .. } => Stage::Write,
        }
    }

    /// Name of the deck the error belongs to.
    pub fn file(&self) -> &str {
        match self {
            FileError::UnreadableDeck { file, .. }
            | FileError::NetworkFailure { file, .. }
            | FileError::AuthFailure { file, .. }
            | FileError::ApiError { file, .. }
            | FileError::MalformedResponse { file, .. }
            | FileError::RenderError { file, .. }
            | FileError::OutputWriteFailed { file, .. } => file,
        }
    }
}
