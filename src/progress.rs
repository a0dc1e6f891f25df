//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through extraction, ratio computation and
//! the model calls.
//!
//! # Example
//!
//! ```rust
//! use edgequake_fininsight::{AnalysisConfig, AnalysisProgressCallback, AnalysisStage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: AnalysisStage, detail: &str) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} done: {}", stage, detail);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//! let config = AnalysisConfig::builder()
//!     .progress_callback(counter as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisStage {
    Input,
    Extract,
    Ratios,
    Insights,
    Analytics,
    Recommendations,
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalysisStage::Input => "input",
            AnalysisStage::Extract => "extract",
            AnalysisStage::Ratios => "ratios",
            AnalysisStage::Insights => "insights",
            AnalysisStage::Analytics => "analytics",
            AnalysisStage::Recommendations => "recommendations",
        };
        f.write_str(s)
    }
}

/// Called by the pipeline as it runs.
///
/// The insight, analytics and recommendation calls run concurrently, so
/// their events may interleave and arrive from different threads.
/// All methods default to no-ops.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once the input has been read and validated.
    fn on_analysis_start(&self, source: &str, input_bytes: u64) {
        let _ = (source, input_bytes);
    }

    fn on_stage_start(&self, stage: AnalysisStage) {
        let _ = stage;
    }

    /// `detail` is a short human summary, e.g. "12 pages, 3 tables".
    fn on_stage_complete(&self, stage: AnalysisStage, detail: &str) {
        let _ = (stage, detail);
    }

    /// A stage degraded but the run continues.
    fn on_stage_error(&self, stage: AnalysisStage, error: &str) {
        let _ = (stage, error);
    }

    /// Called once after every stage has been attempted.
    ///
    /// * `failed_sections` — model sections replaced by a placeholder
    fn on_analysis_complete(&self, failed_sections: usize) {
        let _ = failed_sections;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        started: AtomicUsize,
        completed: Mutex<Vec<AnalysisStage>>,
        errors: AtomicUsize,
    }

    impl AnalysisProgressCallback for TrackingCallback {
        fn on_stage_start(&self, _stage: AnalysisStage) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, stage: AnalysisStage, _detail: &str) {
            self.completed.lock().unwrap().push(stage);
        }

        fn on_stage_error(&self, _stage: AnalysisStage, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_analysis_start("report.pdf", 1024);
        cb.on_stage_start(AnalysisStage::Extract);
        cb.on_stage_complete(AnalysisStage::Extract, "3 pages");
        cb.on_stage_error(AnalysisStage::Insights, "timeout");
        cb.on_analysis_complete(1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_stage_start(AnalysisStage::Extract);
        tracker.on_stage_complete(AnalysisStage::Extract, "2 pages");
        tracker.on_stage_start(AnalysisStage::Insights);
        tracker.on_stage_error(AnalysisStage::Insights, "HTTP 500");

        assert_eq!(tracker.started.load(Ordering::SeqCst), 2);
        assert_eq!(*tracker.completed.lock().unwrap(), vec![AnalysisStage::Extract]);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stage_display() {
        assert_eq!(AnalysisStage::Recommendations.to_string(), "recommendations");
    }
}
