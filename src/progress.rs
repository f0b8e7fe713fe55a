//! Progress-callback trait for scan stage events.
//!
//! Inject an [`Arc<dyn ScanProgressCallback>`] via
//! [`crate::config::ScanConfigBuilder::progress_callback`] to receive events
//! as a scan moves through its stages. The CLI uses it to drive a spinner; a
//! UI would use it to animate the capture screen.
//!
//! # Example
//!
//! ```rust
//! use edgequake_scanpay::{ScanConfig, ScanProgressCallback, ScanStage};
//! use std::sync::{Arc, Mutex};
//!
//! struct Recorder(Mutex<Vec<ScanStage>>);
//!
//! impl ScanProgressCallback for Recorder {
//!     fn on_stage(&self, stage: ScanStage) {
//!         self.0.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let config = ScanConfig::builder()
//!     .progress_callback(Arc::new(Recorder(Mutex::new(Vec::new()))))
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// Stages of a single scan, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStage {
    /// Reading the image from disk, URL or base64.
    Loading,
    /// Sniffing the format and downscaling.
    Encoding,
    /// Waiting on the extraction service.
    Extracting,
    /// Repairing and validating the response.
    Normalizing,
}

impl ScanStage {
    pub fn label(&self) -> &'static str {
        match self {
            ScanStage::Loading => "Loading image…",
            ScanStage::Encoding => "Optimizing pixels…",
            ScanStage::Extracting => "Extracting receipt fields…",
            ScanStage::Normalizing => "Validating amounts…",
        }
    }
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the scan pipeline as it runs.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ScanProgressCallback: Send + Sync {
    /// Called once before any work starts.
    fn on_scan_start(&self) {}

    /// Called on entering each stage.
    fn on_stage(&self, stage: ScanStage) {
        let _ = stage;
    }

    /// Called when a quote was produced.
    ///
    /// # Arguments
    /// * `duration_ms` — wall-clock time of the whole scan
    fn on_scan_complete(&self, duration_ms: u64) {
        let _ = duration_ms;
    }

    /// Called when the scan failed. `error` is the user-facing message.
    fn on_scan_error(&self, error: &str) {
        let _ = error;
    }
}

/// Shared handle to a progress callback.
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;

/// A callback that ignores every event.
pub struct NoopProgressCallback;

impl ScanProgressCallback for NoopProgressCallback {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<String>>);

    impl ScanProgressCallback for Recorder {
        fn on_stage(&self, stage: ScanStage) {
            self.0.lock().unwrap().push(stage.to_string());
        }
        fn on_scan_error(&self, error: &str) {
            self.0.lock().unwrap().push(format!("error: {error}"));
        }
    }

    #[test]
    fn defaults_are_noops() {
        let cb = NoopProgressCallback;
        cb.on_scan_start();
        cb.on_stage(ScanStage::Extracting);
        cb.on_scan_complete(10);
        cb.on_scan_error("x");
    }

    #[test]
    fn overrides_receive_events() {
        let rec = Recorder(Mutex::new(Vec::new()));
        rec.on_stage(ScanStage::Loading);
        rec.on_scan_error("boom");
        let events = rec.0.lock().unwrap();
        assert_eq!(events[0], "Loading image…");
        assert_eq!(events[1], "error: boom");
    }
}
