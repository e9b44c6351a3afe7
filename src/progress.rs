//! Progress-callback trait for per-file conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the coordinator processes each deck. The CLI drives its
//! progress bar from these; the web handler does not install one.
//!
//! # Example
//!
//! ```rust
//! use pptx2sop::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, output: &std::path::Path) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} → {}", index, total, output.display());
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the coordinator as it processes each deck.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. With `concurrency > 1` the per-file methods may be
/// called from different tasks; protect shared state accordingly.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before any deck is processed.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before extraction of a deck begins.
    ///
    /// # Arguments
    /// * `index` — 1-indexed position in the batch
    /// * `total` — number of decks in the batch
    /// * `file`  — deck file name
    fn on_file_start(&self, index: usize, total: usize, file: &str) {
        let _ = (index, total, file);
    }

    /// Called when a document has been written.
    fn on_file_complete(&self, index: usize, total: usize, output: &Path) {
        let _ = (index, total, output);
    }

    /// Called when a deck fails in any stage.
    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every deck has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        successes: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_file_start(&self, _index: usize, _total: usize, _file: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _index: usize, _total: usize, _output: &Path) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, success_count: usize) {
            self.successes.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_file_start(1, 2, "a.pptx");
        cb.on_file_complete(1, 2, Path::new("outputs/a_SOP_20240101.docx"));
        cb.on_file_error(2, 2, "unreadable deck");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_file_start(1, 2, "a.pptx");
        tracker.on_file_complete(1, 2, Path::new("a.docx"));
        tracker.on_file_start(2, 2, "b.pptx");
        tracker.on_file_error(2, 2, "network error");
        tracker.on_batch_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.successes.load(Ordering::SeqCst), 1);
    }
}
