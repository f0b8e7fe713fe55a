//! Scan entry points: image in, quote out.
//!
//! [`scan`] is the primary entry point: it resolves the input, calls the
//! configured vision LLM and returns a [`ScanOutput`]. [`scan_with_service`]
//! runs the same pipeline against any [`ExtractionService`], which is how
//! tests and alternative backends plug in.

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::fees::FeeBreakdown;
use crate::pipeline::encode::{self, ReceiptImage};
use crate::pipeline::extract::{ExtractionService, LlmExtractionService};
use crate::pipeline::{input, normalize, parse};
use crate::progress::ScanStage;
use crate::quote::{PaymentIntent, PaymentQuote};
use crate::reference::CurrencyRate;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything a scan produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutput {
    pub quote: PaymentQuote,
    /// Rate entry the quote was converted with.
    pub rate: CurrencyRate,
    /// Fee figures derived from `quote` with the configured schedule.
    pub fees: FeeBreakdown,
    pub stats: ScanStats,
}

impl ScanOutput {
    /// Accept the quote: package it for the payment-initiation service.
    pub fn into_intent(self) -> PaymentIntent {
        PaymentIntent {
            quote: self.quote,
            rate: self.rate,
            fees: self.fees,
        }
    }
}

/// Timing and usage for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Service that answered, e.g. `gemini/gemini-2.0-flash`.
    pub service: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub extraction_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Scan a receipt image given as a path, URL, data URI or bare base64.
///
/// Uses the vision LLM described by `config`. A missing credential fails
/// before the input is read or downloaded.
///
/// # Errors
/// Any [`ScanError`]; none is retried.
pub async fn scan(input_str: impl AsRef<str>, config: &ScanConfig) -> Result<ScanOutput, ScanError> {
    let service = LlmExtractionService::new(config);
    scan_with_service(input_str, &service, config).await
}

/// Scan an already-encoded image (the capture surface's base64 payload).
pub async fn scan_image(image: &ReceiptImage, config: &ScanConfig) -> Result<ScanOutput, ScanError> {
    let service = LlmExtractionService::new(config);
    scan_image_with_service(image, &service, config).await
}

/// [`scan`] against a caller-supplied extraction service.
pub async fn scan_with_service<S>(
    input_str: impl AsRef<str>,
    service: &S,
    config: &ScanConfig,
) -> Result<ScanOutput, ScanError>
where
    S: ExtractionService + ?Sized,
{
    let input_str = input_str.as_ref();
    notify_start(config);

    let prepared = async {
        service.preflight()?;
        stage(config, ScanStage::Loading);
        let loaded = input::resolve_input(input_str, config.download_timeout_secs).await?;
        stage(config, ScanStage::Encoding);
        encode::encode_image(&loaded, config.max_image_pixels)
    }
    .await;

    match prepared {
        Ok(image) => run(&image, service, config).await,
        Err(e) => Err(notify_error(config, e)),
    }
}

/// [`scan_image`] against a caller-supplied extraction service.
pub async fn scan_image_with_service<S>(
    image: &ReceiptImage,
    service: &S,
    config: &ScanConfig,
) -> Result<ScanOutput, ScanError>
where
    S: ExtractionService + ?Sized,
{
    notify_start(config);
    if let Err(e) = service.preflight() {
        return Err(notify_error(config, e));
    }
    run(image, service, config).await
}

/// Synchronous wrapper around [`scan`].
///
/// Creates a temporary tokio runtime internally.
pub fn scan_sync(input_str: impl AsRef<str>, config: &ScanConfig) -> Result<ScanOutput, ScanError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(scan(input_str, config))
}

/// Turn a response body into an output without calling any service.
///
/// Useful for replaying a saved provider response.
pub fn quote_from_response(body: &str, config: &ScanConfig) -> Result<ScanOutput, ScanError> {
    let raw = parse::parse_extraction(body)?;
    let quote = normalize::normalize(&raw, &config.reference)?;
    let rate = config
        .reference
        .rates
        .resolve(Some(quote.original_currency_code.as_str()))
        .clone();
    let fees = config.fees.breakdown(&quote);
    if !fees.final_debit.is_finite() {
        return Err(ScanError::InvalidAmount {
            total: quote.original_amount,
        });
    }
    Ok(ScanOutput {
        quote,
        rate,
        fees,
        stats: ScanStats::default(),
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run<S>(image: &ReceiptImage, service: &S, config: &ScanConfig) -> Result<ScanOutput, ScanError>
where
    S: ExtractionService + ?Sized,
{
    let total_start = Instant::now();
    let service_name = service.name();
    info!("Starting extraction via {}", service_name);

    // ── Step 1: Extract ──────────────────────────────────────────────────
    stage(config, ScanStage::Extracting);
    let extraction_start = Instant::now();
    let response = match service.extract(image).await {
        Ok(r) => r,
        Err(e) => return Err(notify_error(config, e)),
    };
    let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;
    debug!("Extraction body: {} bytes", response.text.len());

    // ── Step 2: Parse + normalize ────────────────────────────────────────
    stage(config, ScanStage::Normalizing);
    let mut output = match quote_from_response(&response.text, config) {
        Ok(o) => o,
        Err(e) => return Err(notify_error(config, e)),
    };

    output.stats = ScanStats {
        service: service_name,
        input_tokens: response.input_tokens,
        output_tokens: response.output_tokens,
        extraction_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Quote ready: {} {:.2} → {:.2} local ({}), {}ms",
        output.quote.original_currency_code,
        output.quote.original_amount,
        output.quote.inr_amount,
        output.quote.route_label(),
        output.stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_complete(output.stats.total_duration_ms);
    }
    Ok(output)
}

fn notify_start(config: &ScanConfig) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_start();
    }
}

fn stage(config: &ScanConfig, stage: ScanStage) {
    debug!("Stage: {:?}", stage);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(stage);
    }
}

fn notify_error(config: &ScanConfig, error: ScanError) -> ScanError {
    warn!("Scan failed [{}]: {}", error.code(), error);
    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_error(error.user_message());
    }
    error
}
