//! Progress-callback trait for layout and describe events.
//!
//! Inject an [`Arc<dyn ParseProgressCallback>`] via
//! [`crate::config::ParseConfigBuilder::progress_callback`] to receive events
//! as the pipeline works through pages and regions.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfparse::{ParseConfig, ParseProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RegionCounter(AtomicUsize);
//!
//! impl ParseProgressCallback for RegionCounter {
//!     fn on_region_complete(&self, _page_index: usize, _detection_index: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ParseConfig::builder()
//!     .progress_callback(Arc::new(RegionCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes pages and regions.
///
/// Layout and describe calls run concurrently, so every method may be called
/// from several tasks at once; implementations must synchronise their own
/// state. All methods default to no-ops.
pub trait ParseProgressCallback: Send + Sync {
    /// Called once after rendering, before the first layout call.
    fn on_parse_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a page's layout call succeeded.
    fn on_layout_complete(&self, page_index: usize, region_count: usize) {
        let _ = (page_index, region_count);
    }

    /// Called when a page's layout call failed after all attempts.
    fn on_layout_error(&self, page_index: usize, error: &str) {
        let _ = (page_index, error);
    }

    /// Called when a region was described.
    fn on_region_complete(&self, page_index: usize, detection_index: usize) {
        let _ = (page_index, detection_index);
    }

    /// Called when a region's describe call failed after all attempts.
    fn on_region_error(&self, page_index: usize, detection_index: usize, error: &str) {
        let _ = (page_index, detection_index, error);
    }

    /// Called once after every page has been attempted.
    fn on_parse_complete(&self, total_regions: usize, failed_regions: usize) {
        let _ = (total_regions, failed_regions);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ParseProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ParseConfig`].
pub type ProgressCallback = Arc<dyn ParseProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        layouts: AtomicUsize,
        regions: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ParseProgressCallback for Tracking {
        fn on_layout_complete(&self, _page_index: usize, region_count: usize) {
            self.layouts.fetch_add(1, Ordering::SeqCst);
            self.regions.fetch_add(region_count, Ordering::SeqCst);
        }

        fn on_region_error(&self, _page_index: usize, _detection_index: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_parse_start(2);
        cb.on_layout_complete(0, 3);
        cb.on_layout_error(1, "boom");
        cb.on_region_complete(0, 0);
        cb.on_region_error(0, 1, "boom");
        cb.on_parse_complete(3, 1);
    }

    #[test]
    fn arc_dyn_callback_receives_events() {
        let tracker = Arc::new(Tracking::default());
        let cb: ProgressCallback = tracker.clone();
        cb.on_layout_complete(0, 2);
        cb.on_layout_complete(1, 5);
        cb.on_region_error(1, 4, "timeout");
        assert_eq!(tracker.layouts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.regions.load(Ordering::SeqCst), 7);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }
}
