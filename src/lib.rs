//! # edgequake-scanpay
//!
//! Turn a photo of a receipt or payment QR code into a cross-border payment
//! quote using Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! A vision LLM reads a crumpled receipt far better than classic OCR, but its
//! answer is untrusted: fields go missing, totals disagree with their line
//! items, currencies come back as symbols or lower-case, and the JSON arrives
//! wrapped in chatter. This crate is the layer between that answer and a
//! payment screen: it repairs the response, reconciles the amounts, converts
//! the currency and classifies the settlement route, and refuses to produce a
//! quote only when there is no positive amount to pay.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Image
//!  │
//!  ├─ 1. Input      resolve path / URL / data URI / base64
//!  ├─ 2. Encode     sniff format, downscale, base64
//!  ├─ 3. Extract    one call to gemini / gpt / claude / … (no retry)
//!  ├─ 4. Parse      recover the JSON object (fences, brace matching)
//!  ├─ 5. Normalize  reconcile total, resolve currency, classify route
//!  └─ 6. Fees       bridge fee + tax on fee → final debit
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_scanpay::{scan, ScanConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credential read from GEMINI_API_KEY at call time
//!     let config = ScanConfig::default();
//!     let output = scan("receipt.jpg", &config).await?;
//!     println!(
//!         "{} {:.2} → ₹{:.2} (final debit ₹{:.2})",
//!         output.quote.original_currency_code,
//!         output.quote.original_amount,
//!         output.quote.inr_amount,
//!         output.fees.rounded().final_debit,
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scanpay` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-scanpay = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod fees;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod quote;
pub mod reference;
pub mod scan;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::ScanError;
pub use fees::{round_currency, FeeBreakdown, FeeSchedule};
pub use pipeline::encode::ReceiptImage;
pub use pipeline::extract::{ExtractionResponse, ExtractionService, LlmExtractionService};
pub use progress::{ProgressCallback, ScanProgressCallback, ScanStage};
pub use quote::{PaymentIntent, PaymentQuote, RawExtraction};
pub use reference::{CurrencyRate, Placeholders, RateTable, ReferenceData};
pub use scan::{
    quote_from_response, scan, scan_image, scan_image_with_service, scan_sync, scan_with_service,
    ScanOutput, ScanStats,
};
pub use session::{InFlightPolicy, ScanSession};
