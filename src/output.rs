//! Result types returned by the conversion coordinator.

use crate::error::FileError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Outcome of converting one deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    /// The input deck.
    pub source: PathBuf,
    /// The rendered document, `None` when any stage failed.
    pub output: Option<PathBuf>,
    /// The model reply was not valid JSON; the document was produced from
    /// fallback values and needs manual review.
    pub degraded: bool,
    /// Model usage for this deck (0 when the call did not succeed).
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    pub error: Option<FileError>,
}

impl FileResult {
    pub(crate) fn failed(source: PathBuf, error: FileError, duration_ms: u64) -> Self {
        Self {
            source,
            output: None,
            degraded: false,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.output.is_some()
    }

    /// File name of the rendered document, if any.
    pub fn output_name(&self) -> Option<String> {
        self.output
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
    }
}

/// Aggregate numbers for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_files: usize,
    pub processed_files: usize,
    pub failed_files: usize,
    pub degraded_files: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// Per-file results of a batch, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub files: Vec<FileResult>,
    pub stats: BatchStats,
}

impl BatchOutput {
    pub(crate) fn from_results(files: Vec<FileResult>, total_duration_ms: u64) -> Self {
        let stats = BatchStats {
            total_files: files.len(),
            processed_files: files.iter().filter(|f| f.is_success()).count(),
            failed_files: files.iter().filter(|f| !f.is_success()).count(),
            degraded_files: files.iter().filter(|f| f.degraded).count(),
            total_input_tokens: files.iter().map(|f| f.input_tokens).sum(),
            total_output_tokens: files.iter().map(|f| f.output_tokens).sum(),
            total_duration_ms,
        };
        Self { files, stats }
    }

    /// One entry per input deck: the output path, or `None` where it failed.
    pub fn outputs(&self) -> Vec<Option<&Path>> {
        self.files.iter().map(|f| f.output.as_deref()).collect()
    }

    /// Output paths of the decks that succeeded, in input order.
    pub fn successful(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().filter_map(|f| f.output.as_deref())
    }

    /// Output file names of the decks that succeeded, in input order.
    pub fn output_names(&self) -> Vec<String> {
        self.files.iter().filter_map(FileResult::output_name).collect()
    }
}
