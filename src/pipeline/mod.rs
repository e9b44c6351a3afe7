//! Pipeline stages for deck-to-SOP conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the coordinator in [`crate::convert`] only sequences
//! them.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ format ──▶ llm ──▶ interpret ──▶ render
//!  (.pptx)    (prompt)  (HTTP)   (JSON→ctx)    (.docx)
//! ```
//!
//! 1. [`extract`]   — read slide titles and body text; runs in
//!    `spawn_blocking` because unzipping and XML parsing are CPU-bound
//! 2. [`format`]    — instruction prompt + plain-text rendering of the deck
//! 3. [`llm`]       — one Messages API call; the only stage with network I/O
//! 4. [`interpret`] — reply text → [`crate::context::DocumentContext`],
//!    degrading instead of failing
//! 5. [`render`]    — fill the Word template and write the document

pub mod extract;
pub mod format;
pub mod interpret;
pub mod llm;
pub mod render;
