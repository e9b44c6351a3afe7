//! Configuration types for deck-to-SOP conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The config is constructed once (by the
//! CLI, the web handler or a library caller) and passed by reference into
//! every stage; no stage reads process environment.

use crate::error::SopError;
use crate::pipeline::llm::CompletionProvider;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default Messages endpoint.
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Default value of the `anthropic-version` header.
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "claude-3-sonnet-20240229";

/// Default user name recorded in the revision sheet.
pub const DEFAULT_USER_NAME: &str = "System User";

/// Configuration for converting slide decks into SOP documents.
///
/// Built via [`ConversionConfig::builder()`].
///
/// # Example
/// ```rust
/// use pptx2sop::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .api_key("sk-ant-...")
///     .template_path("templates/LS-sop.docx")
///     .id_prefix("MANGO-")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tokens, 4000);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// API credential sent as `x-api-key`. Required unless `provider` is set.
    pub api_key: Option<String>,

    /// Messages endpoint URL. Default: [`DEFAULT_API_URL`].
    pub api_url: String,

    /// `anthropic-version` header value. Default: [`DEFAULT_API_VERSION`].
    pub api_version: String,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Maximum tokens the model may generate per deck. Default: 4000.
    ///
    /// The reply is a single small JSON object; 4000 leaves room for decks
    /// with long definition lists without truncating the closing brace.
    pub max_tokens: u32,

    /// Timeout for the single model call, in seconds. Default: 120.
    ///
    /// A timed-out call is reported as a network failure for that deck.
    pub api_timeout_secs: u64,

    /// Instruction prompt. If None, uses [`crate::prompts::DEFAULT_SOP_PROMPT`].
    pub prompt: Option<String>,

    /// Path to the `.docx` template.
    pub template_path: PathBuf,

    /// Directory rendered documents are written to. Default: `outputs`.
    pub output_dir: PathBuf,

    /// Author recorded in the document and its revision sheet.
    pub user_name: String,

    /// Prefix for synthesized document identifiers. None disables synthesis.
    pub id_prefix: Option<String>,

    /// Number of decks whose model calls may be in flight at once. Default: 1.
    ///
    /// Results are always reported in input order, whatever the value.
    pub concurrency: usize,

    /// Pre-constructed model client. Takes precedence over `api_key`.
    pub provider: Option<Arc<dyn CompletionProvider>>,

    /// Receives per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4000,
            api_timeout_secs: 120,
            prompt: None,
            template_path: PathBuf::new(),
            output_dir: PathBuf::from("outputs"),
            user_name: DEFAULT_USER_NAME.to_string(),
            id_prefix: None,
            concurrency: 1,
            provider: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("prompt", &self.prompt.as_ref().map(|p| p.len()))
            .field("template_path", &self.template_path)
            .field("output_dir", &self.output_dir)
            .field("user_name", &self.user_name)
            .field("id_prefix", &self.id_prefix)
            .field("concurrency", &self.concurrency)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The instruction prompt in effect.
    pub fn prompt_text(&self) -> &str {
        self.prompt
            .as_deref()
            .unwrap_or(crate::prompts::DEFAULT_SOP_PROMPT)
    }

    /// The identifier prefix, if one was configured and is non-empty.
    pub fn effective_id_prefix(&self) -> Option<&str> {
        self.id_prefix.as_deref().filter(|p| !p.is_empty())
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.api_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config.api_version = version.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template_path = path.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.config.user_name = name.into();
        self
    }

    pub fn id_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.config.id_prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, SopError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(SopError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(SopError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(SopError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(SopError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
