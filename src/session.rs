//! Scan session: one in-flight extraction, one current quote.
//!
//! A capture screen must never have two extraction calls racing to update
//! it. [`ScanSession`] is an explicit single slot:
//!
//! * At most one scan is in flight. A second request is either rejected
//!   with [`ScanError::ScanInProgress`] or aborts the first, depending on
//!   [`InFlightPolicy`].
//! * Every scan is stamped with a generation number. A result whose
//!   generation is no longer current (the user cancelled, or a newer scan
//!   took over) is discarded instead of replacing the newer state.
//! * The session holds the latest successful [`ScanOutput`] until the user
//!   confirms it (→ [`PaymentIntent`]), cancels, or scans again.
//!
//! The slot is guarded by a `std::sync::Mutex` that is never held across an
//! `.await`.

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::pipeline::extract::{ExtractionService, LlmExtractionService};
use crate::quote::PaymentIntent;
use crate::scan::{scan_with_service, ScanOutput};
use futures::future::{AbortHandle, Abortable};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// What to do when a scan is requested while another is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InFlightPolicy {
    /// Refuse the new scan. (default)
    #[default]
    Reject,
    /// Abort the running scan and start the new one.
    Supersede,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    in_flight: Option<AbortHandle>,
    current: Option<ScanOutput>,
    /// Generation most recently ended by `cancel`.
    last_cancelled: Option<u64>,
}

/// Single-slot scan coordinator. Cheap to clone; clones share the slot.
#[derive(Clone)]
pub struct ScanSession {
    config: ScanConfig,
    service: Arc<dyn ExtractionService>,
    policy: InFlightPolicy,
    slot: Arc<Mutex<Slot>>,
}

impl ScanSession {
    /// Session backed by the vision LLM described by `config`.
    pub fn new(config: ScanConfig) -> Self {
        let service = Arc::new(LlmExtractionService::new(&config));
        Self::with_service(config, service)
    }

    /// Session backed by a caller-supplied extraction service.
    pub fn with_service(config: ScanConfig, service: Arc<dyn ExtractionService>) -> Self {
        Self {
            config,
            service,
            policy: InFlightPolicy::default(),
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn with_policy(mut self, policy: InFlightPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> InFlightPolicy {
        self.policy
    }

    /// Run one scan through the slot.
    ///
    /// Starting a scan discards the previous quote. On success the new
    /// output becomes the session's current quote and a copy is returned.
    ///
    /// # Errors
    /// * [`ScanError::ScanInProgress`] — another scan is running and the policy is `Reject`
    /// * [`ScanError::Superseded`] — a newer scan took over before this one finished
    /// * [`ScanError::Cancelled`] — [`ScanSession::cancel`] was called meanwhile
    /// * any pipeline error from the scan itself
    pub async fn scan(&self, input: impl AsRef<str>) -> Result<ScanOutput, ScanError> {
        let (generation, registration) = self.begin()?;
        // Frees the slot even if this future is dropped mid-scan.
        let release = ReleaseOnDrop {
            slot: Arc::clone(&self.slot),
            generation,
        };

        let fut = scan_with_service(input.as_ref(), self.service.as_ref(), &self.config);
        let outcome = Abortable::new(fut, registration).await;
        drop(release);

        let mut slot = self.lock();
        if slot.generation != generation {
            debug!("Discarding result of stale scan #{}", generation);
            return Err(if slot.last_cancelled == Some(generation) {
                ScanError::Cancelled
            } else {
                ScanError::Superseded
            });
        }

        match outcome {
            // Every abort path bumps the generation first.
            Err(_aborted) => Err(ScanError::Cancelled),
            Ok(Err(e)) => Err(e),
            Ok(Ok(output)) => {
                info!("Scan #{} produced a quote", generation);
                slot.current = Some(output.clone());
                Ok(output)
            }
        }
    }

    /// Abort the in-flight scan, if any, and drop the current quote.
    ///
    /// The aborted scan resolves with [`ScanError::Cancelled`].
    pub fn cancel(&self) {
        let mut slot = self.lock();
        slot.last_cancelled = Some(slot.generation);
        slot.generation += 1;
        slot.current = None;
        if let Some(handle) = slot.in_flight.take() {
            debug!("Cancelling in-flight scan");
            handle.abort();
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    /// The latest successful scan, if it has not been confirmed or cancelled.
    pub fn current(&self) -> Option<ScanOutput> {
        self.lock().current.clone()
    }

    /// Accept the current quote and clear it from the session.
    ///
    /// Returns `None` when there is nothing to confirm (the "payment context
    /// was lost" case on the preview screen).
    pub fn confirm(&self) -> Option<PaymentIntent> {
        self.lock().current.take().map(ScanOutput::into_intent)
    }

    /// Claim the slot for a new scan.
    fn begin(&self) -> Result<(u64, futures::future::AbortRegistration), ScanError> {
        let mut slot = self.lock();
        if let Some(previous) = slot.in_flight.take() {
            match self.policy {
                InFlightPolicy::Reject => {
                    slot.in_flight = Some(previous);
                    return Err(ScanError::ScanInProgress);
                }
                InFlightPolicy::Supersede => {
                    debug!("Superseding in-flight scan #{}", slot.generation);
                    previous.abort();
                }
            }
        }

        slot.generation += 1;
        slot.current = None;
        let (handle, registration) = AbortHandle::new_pair();
        slot.in_flight = Some(handle);
        Ok((slot.generation, registration))
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        lock_slot(&self.slot)
    }
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    // A panic while holding the lock leaves the slot consistent enough.
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the in-flight handle of one scan generation when dropped.
struct ReleaseOnDrop {
    slot: Arc<Mutex<Slot>>,
    generation: u64,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        let mut slot = lock_slot(&self.slot);
        if slot.generation == self.generation && slot.in_flight.take().is_some() {
            debug!("Released slot of scan #{}", self.generation);
        }
    }
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.lock();
        f.debug_struct("ScanSession")
            .field("service", &self.service.name())
            .field("policy", &self.policy)
            .field("generation", &slot.generation)
            .field("scanning", &slot.in_flight.is_some())
            .field("has_quote", &slot.current.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::ReceiptImage;
    use crate::pipeline::extract::ExtractionResponse;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const RECEIPT: &str = r#"{"merchantName":"Cafe","country":"USA","currencyCode":"usd","subtotal":100,"tax":18,"total":50}"#;

    /// The first `stall` calls never return; later calls answer immediately.
    struct Stalling {
        calls: AtomicUsize,
        stall: usize,
        body: &'static str,
    }

    impl Stalling {
        fn new(body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                stall: 1,
                body,
            })
        }
    }

    #[async_trait]
    impl ExtractionService for Stalling {
        fn name(&self) -> String {
            "stalling".into()
        }

        async fn extract(&self, _image: &ReceiptImage) -> Result<ExtractionResponse, ScanError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.stall {
                futures::future::pending::<()>().await;
            }
            Ok(ExtractionResponse::new(self.body))
        }
    }

    /// Always answers immediately.
    struct Fixed(&'static str);

    #[async_trait]
    impl ExtractionService for Fixed {
        fn name(&self) -> String {
            "fixed".into()
        }

        async fn extract(&self, _image: &ReceiptImage) -> Result<ExtractionResponse, ScanError> {
            Ok(ExtractionResponse::new(self.0))
        }
    }

    fn png_data_uri() -> String {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");
        format!("data:image/png;base64,{}", STANDARD.encode(buf))
    }

    async fn wait_until_scanning(session: &ScanSession) {
        while !session.is_scanning() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn completed_scan_becomes_current_quote() {
        let session = ScanSession::with_service(ScanConfig::default(), Arc::new(Fixed(RECEIPT)));
        let output = session.scan(png_data_uri()).await.expect("scan");
        assert_eq!(output.quote.original_amount, 118.0);
        assert_eq!(session.current(), Some(output));
        assert!(!session.is_scanning());
    }

    #[tokio::test]
    async fn confirm_hands_off_once() {
        let session = ScanSession::with_service(ScanConfig::default(), Arc::new(Fixed(RECEIPT)));
        session.scan(png_data_uri()).await.expect("scan");

        let intent = session.confirm().expect("quote to confirm");
        assert_eq!(intent.quote.original_currency_code, "USD");
        assert_eq!(intent.rate.code, "USD");
        assert!(session.current().is_none());
        assert!(session.confirm().is_none());
    }

    #[tokio::test]
    async fn failed_scan_leaves_no_quote() {
        let failing = ScanSession::with_service(ScanConfig::default(), Arc::new(Fixed("   ")));
        let err = failing.scan(png_data_uri()).await.unwrap_err();
        assert!(matches!(err, ScanError::EmptyResponse));
        assert!(failing.current().is_none());
        assert!(!failing.is_scanning());
    }

    #[tokio::test]
    async fn second_scan_is_rejected_by_default() {
        let session = ScanSession::with_service(ScanConfig::default(), Stalling::new(RECEIPT));
        assert_eq!(session.policy(), InFlightPolicy::Reject);

        let first = {
            let s = session.clone();
            tokio::spawn(async move { s.scan(png_data_uri()).await })
        };
        wait_until_scanning(&session).await;

        let err = session.scan(png_data_uri()).await.unwrap_err();
        assert!(matches!(err, ScanError::ScanInProgress));
        assert!(session.is_scanning(), "first scan must keep the slot");

        session.cancel();
        let first = first.await.expect("join");
        assert!(matches!(first, Err(ScanError::Cancelled)));
    }

    #[tokio::test]
    async fn supersede_discards_the_older_scan() {
        let session = ScanSession::with_service(ScanConfig::default(), Stalling::new(RECEIPT))
            .with_policy(InFlightPolicy::Supersede);

        let first = {
            let s = session.clone();
            tokio::spawn(async move { s.scan(png_data_uri()).await })
        };
        wait_until_scanning(&session).await;

        let second = session.scan(png_data_uri()).await.expect("newer scan wins");
        let first = first.await.expect("join");
        assert!(matches!(first, Err(ScanError::Superseded)));
        assert_eq!(session.current(), Some(second));
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_scan() {
        let session = ScanSession::with_service(ScanConfig::default(), Stalling::new(RECEIPT));
        let first = {
            let s = session.clone();
            tokio::spawn(async move { s.scan(png_data_uri()).await })
        };
        wait_until_scanning(&session).await;

        session.cancel();
        assert!(!session.is_scanning());
        let first = first.await.expect("join");
        assert!(matches!(first, Err(ScanError::Cancelled)));
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn dropped_scan_frees_the_slot() {
        let session = ScanSession::with_service(ScanConfig::default(), Stalling::new(RECEIPT));

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), session.scan(png_data_uri())).await;
        assert!(timed_out.is_err(), "first scan stalls");
        assert!(!session.is_scanning());

        let output = session.scan(png_data_uri()).await.expect("slot is free again");
        assert_eq!(output.quote.original_amount, 118.0);
    }

    #[tokio::test]
    async fn superseded_scan_leaves_newer_handle_alone() {
        let service = Arc::new(Stalling {
            calls: AtomicUsize::new(0),
            stall: 2,
            body: RECEIPT,
        });
        let session = ScanSession::with_service(ScanConfig::default(), service)
            .with_policy(InFlightPolicy::Supersede);

        let first = {
            let s = session.clone();
            tokio::spawn(async move { s.scan(png_data_uri()).await })
        };
        wait_until_scanning(&session).await;
        let second = {
            let s = session.clone();
            tokio::spawn(async move { s.scan(png_data_uri()).await })
        };

        let first = first.await.expect("join");
        assert!(matches!(first, Err(ScanError::Superseded)));
        assert!(session.is_scanning(), "newer scan still owns the slot");

        session.cancel();
        assert!(matches!(second.await.expect("join"), Err(ScanError::Cancelled)));
    }

    #[test]
    fn debug_reports_slot_state() {
        let session = ScanSession::with_service(ScanConfig::default(), Arc::new(Fixed(RECEIPT)));
        let dbg = format!("{:?}", session);
        assert!(dbg.contains("fixed"));
        assert!(dbg.contains("has_quote: false"));
    }
}
