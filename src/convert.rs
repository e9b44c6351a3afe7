//! Pipeline coordinator: sequences extract → format → model → interpret →
//! render for each deck and aggregates the batch.
//!
//! Configuration problems (missing template, no credential, unusable output
//! directory) are caught once in [`SopGenerator::new`], before any deck is
//! touched. After that nothing aborts a batch: a deck that fails in any stage
//! is logged and recorded as an absent output at its position, and the next
//! deck is processed.
//!
//! Both the CLI and the web handlers go through [`SopGenerator`]; they only
//! differ in how they gather input paths and report the [`BatchOutput`].

use crate::config::ConversionConfig;
use crate::context::DocumentContext;
use crate::error::{FileError, SopError};
use crate::output::{BatchOutput, FileResult};
use crate::pipeline::interpret::{self, Interpretation};
use crate::pipeline::llm::{AnthropicClient, CompletionProvider, ModelRequest, Usage};
use crate::pipeline::render::{self, DocxTemplate, TemplateReport};
use crate::pipeline::{extract, format};
use chrono::Local;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs decks through the pipeline with one validated configuration.
pub struct SopGenerator {
    config: ConversionConfig,
    provider: Arc<dyn CompletionProvider>,
    template: Arc<DocxTemplate>,
}

/// What a successful run of the stages produced.
struct Processed {
    output: PathBuf,
    degraded: bool,
    usage: Usage,
}

impl SopGenerator {
    /// Validate the configuration and prepare the shared resources.
    ///
    /// # Errors
    /// - [`SopError::TemplateNotFound`] / [`SopError::InvalidTemplate`]
    /// - [`SopError::MissingCredential`] when neither a provider nor an API
    ///   key is configured
    /// - [`SopError::OutputDirFailed`]
    pub fn new(config: &ConversionConfig) -> Result<Self, SopError> {
        let template = DocxTemplate::load(&config.template_path)?;
        let provider = resolve_provider(config)?;

        std::fs::create_dir_all(&config.output_dir).map_err(|e| SopError::OutputDirFailed {
            path: config.output_dir.clone(),
            source: e,
        })?;

        debug!(
            "Generator ready: template={}, provider={}, model={}, output_dir={}",
            template.path().display(),
            provider.name(),
            config.model,
            config.output_dir.display()
        );

        Ok(Self {
            config: config.clone(),
            provider,
            template: Arc::new(template),
        })
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert a single deck. Never fails; check [`FileResult::error`].
    pub async fn process_file(&self, path: &Path) -> FileResult {
        self.process_indexed(path, 1, 1).await
    }

    /// Convert every deck in `inputs`.
    ///
    /// With `concurrency > 1` up to that many decks are in flight at once,
    /// but `files` in the result is always in input order.
    pub async fn process_batch(&self, inputs: &[PathBuf]) -> BatchOutput {
        let start = Instant::now();
        let total = inputs.len();
        info!("Processing {} deck(s)", total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let pending: Vec<_> = inputs
            .iter()
            .enumerate()
            .map(|(i, path)| self.process_indexed(path, i + 1, total))
            .collect();
        let files: Vec<FileResult> = stream::iter(pending)
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let output = BatchOutput::from_results(files, start.elapsed().as_millis() as u64);
        info!(
            "Completed: {}/{} files processed successfully ({} degraded, {}ms)",
            output.stats.processed_files,
            total,
            output.stats.degraded_files,
            output.stats.total_duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, output.stats.processed_files);
        }
        output
    }

    async fn process_indexed(&self, path: &Path, index: usize, total: usize) -> FileResult {
        let start = Instant::now();
        let file = display_name(path);
        info!("[{}/{}] Processing {}", index, total, file);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_file_start(index, total, &file);
        }

        let result = self.run_stages(path, &file).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(done) => {
                info!("[{}/{}] {} → {}", index, total, file, done.output.display());
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_file_complete(index, total, &done.output);
                }
                FileResult {
                    source: path.to_path_buf(),
                    output: Some(done.output),
                    degraded: done.degraded,
                    input_tokens: done.usage.input_tokens,
                    output_tokens: done.usage.output_tokens,
                    duration_ms,
                    error: None,
                }
            }
            Err(e) => {
                error!("[{}/{}] {} stage failed: {}", index, total, e.stage(), e);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_file_error(index, total, &e.to_string());
                }
                FileResult::failed(path.to_path_buf(), e, duration_ms)
            }
        }
    }

    async fn run_stages(&self, path: &Path, file: &str) -> Result<Processed, FileError> {
        // ── Extract ──────────────────────────────────────────────────────
        let deck = extract::extract_deck(path).await?;
        debug!("{}: extracted {} slides", file, deck.slide_count());

        // ── Model call ───────────────────────────────────────────────────
        let request = ModelRequest {
            model: self.config.model.clone(),
            prompt: format::build_prompt(&deck, self.config.prompt_text()),
            max_tokens: self.config.max_tokens,
        };
        let (text, usage) = self.provider.complete(&request).await.into_result(file)?;

        // ── Interpret ────────────────────────────────────────────────────
        let now = Local::now();
        let base = DocumentContext::new(self.config.user_name.clone(), now.date_naive());
        let interpretation = interpret::interpret(&text, base);
        let degraded = interpretation.is_degraded();
        if let Interpretation::Degraded { ref reason, .. } = interpretation {
            warn!("{}: {}; document needs manual review", file, reason);
        }
        let context = interpret::finalize(
            interpretation.into_context(),
            path,
            deck.slide_count(),
            self.config.effective_id_prefix(),
            now,
        );

        // ── Render + write ───────────────────────────────────────────────
        let dest = self
            .config
            .output_dir
            .join(render::output_file_name(path, now.date_naive()));
        let values = context.template_values();
        let template = Arc::clone(&self.template);
        let task_dest = dest.clone();
        let task_file = file.to_string();

        tokio::task::spawn_blocking(move || {
            let bytes = template
                .render(&values, now)
                .map_err(|detail| FileError::RenderError {
                    file: task_file.clone(),
                    detail,
                })?;
            render::write_document(&task_dest, &bytes).map_err(|e| FileError::OutputWriteFailed {
                file: task_file,
                detail: format!("{}: {e}", task_dest.display()),
            })
        })
        .await
        .map_err(|e| FileError::RenderError {
            file: file.to_string(),
            detail: format!("render task panicked: {e}"),
        })??;

        Ok(Processed {
            output: dest,
            degraded,
            usage,
        })
    }
}

/// Resolve the model client: a pre-built provider wins over the API key.
fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn CompletionProvider>, SopError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }
    Ok(Arc::new(AnthropicClient::from_config(config)?))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// The decks to process for `input`: the file itself, or the `.pptx` files
/// directly inside a directory, sorted by name.
pub fn collect_decks(input: &Path) -> Result<Vec<PathBuf>, SopError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(SopError::InputNotFound {
            path: input.to_path_buf(),
        });
    }

    let scan_err = |e: std::io::Error| SopError::InputScanFailed {
        path: input.to_path_buf(),
        source: e,
    };
    let mut decks = Vec::new();
    for entry in std::fs::read_dir(input).map_err(scan_err)? {
        let path = entry.map_err(scan_err)?.path();
        let is_deck = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pptx"))
            .unwrap_or(false);
        if is_deck && path.is_file() {
            decks.push(path);
        }
    }

    if decks.is_empty() {
        return Err(SopError::NoDecksFound {
            path: input.to_path_buf(),
        });
    }
    decks.sort();
    Ok(decks)
}

/// Convert a deck or a directory of decks.
///
/// # Example
/// ```rust,no_run
/// use pptx2sop::{convert, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::builder()
///     .api_key(std::env::var("CLAUDE_API_KEY")?)
///     .template_path("templates/LS-sop.docx")
///     .build()?;
/// let batch = convert("input/", &config).await?;
/// println!("{}/{} converted", batch.stats.processed_files, batch.stats.total_files);
/// # Ok(())
/// # }
/// ```
pub async fn convert(input: impl AsRef<Path>, config: &ConversionConfig) -> Result<BatchOutput, SopError> {
    let decks = collect_decks(input.as_ref())?;
    convert_batch(&decks, config).await
}

/// Convert an explicit list of decks.
pub async fn convert_batch(inputs: &[PathBuf], config: &ConversionConfig) -> Result<BatchOutput, SopError> {
    let generator = SopGenerator::new(config)?;
    Ok(generator.process_batch(inputs).await)
}

/// Convert one deck.
pub async fn convert_file(input: impl AsRef<Path>, config: &ConversionConfig) -> Result<FileResult, SopError> {
    let generator = SopGenerator::new(config)?;
    Ok(generator.process_file(input.as_ref()).await)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(input: impl AsRef<Path>, config: &ConversionConfig) -> Result<BatchOutput, SopError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SopError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(input, config))
}

/// Extract a deck and return the text the model would be shown for it.
///
/// Needs no credential and no template.
pub async fn inspect(input: impl AsRef<Path>) -> Result<String, FileError> {
    let deck = extract::extract_deck(input.as_ref()).await?;
    Ok(format::format_deck(&deck))
}

/// Check a template against the fields a document context supplies.
///
/// The report lists every placeholder and row loop, plus anything the
/// renderer would reject. Needs no credential and no deck.
pub fn inspect_template(path: impl AsRef<Path>) -> Result<TemplateReport, SopError> {
    let template = DocxTemplate::load(path.as_ref())?;
    let sample = DocumentContext::new(crate::config::DEFAULT_USER_NAME, Local::now().date_naive());
    template.analyze(&sample.template_values())
}
