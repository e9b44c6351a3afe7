//! # pptx2sop
//!
//! Convert PowerPoint work-instruction decks into Standard Operating
//! Procedure Word documents with a language model.
//!
//! Each deck's slide text is sent to the Anthropic Messages API together with
//! an instruction prompt asking for the SOP sections as JSON. The reply fills
//! a `.docx` template (objective, scope, responsibilities, definitions,
//! revision table), producing one document per deck.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .pptx
//!  │
//!  ├─ 1. Extract    slide titles + body text, in slide order
//!  ├─ 2. Format     instruction prompt + plain-text deck
//!  ├─ 3. Model      one Messages API call (no retry)
//!  ├─ 4. Interpret  JSON reply → DocumentContext (degrades, never fails)
//!  └─ 5. Render     fill the Word template → outputs/{stem}_SOP_{date}.docx
//! ```
//!
//! A deck that fails in any stage is recorded as absent in the batch result;
//! the rest of the batch carries on. Only configuration problems (missing
//! template, missing credential) stop a run, and they do so before any deck
//! is processed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pptx2sop::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .api_key(std::env::var("CLAUDE_API_KEY")?)
//!         .template_path("templates/LS-sop.docx")
//!         .user_name("Jane Doe")
//!         .id_prefix("MANGO-")
//!         .build()?;
//!     let batch = convert("input/", &config).await?;
//!     for file in &batch.files {
//!         match &file.output {
//!             Some(path) => println!("{} → {}", file.source.display(), path.display()),
//!             None => eprintln!("{} failed", file.source.display()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pptx2sop` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `web`   | on      | Enables [`web`], the upload form and JSON API (axum) |
//!
//! Disable both when using only the library:
//! ```toml
//! pptx2sop = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod convert;
pub mod deck;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "web")]
pub mod web;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use context::{DocumentContext, RevisionEntry};
pub use convert::{
    collect_decks, convert, convert_batch, convert_file, convert_sync, inspect, inspect_template, SopGenerator,
};
pub use deck::{Slide, SlideDeck};
pub use error::{FileError, SopError, Stage};
pub use output::{BatchOutput, BatchStats, FileResult};
pub use pipeline::interpret::Interpretation;
pub use pipeline::llm::{AnthropicClient, CompletionProvider, FailureKind, ModelReply, ModelRequest, Usage};
pub use pipeline::render::{RowLoop, TemplateReport};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
