//! Error types for the edgequake-scanpay library.
//!
//! Every failure of a scan attempt is a [`ScanError`]. All variants are
//! terminal for the current attempt: nothing is retried automatically, and
//! the presentation layer is expected to offer a "retry scan" action no matter
//! which variant it receives.
//!
//! Incomplete extraction data is *not* an error. Missing merchant names,
//! missing countries and unknown currency codes are repaired silently by the
//! normalizer; only an unusable amount or an unparsable response is fatal.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-scanpay library.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// The API credential for the extraction provider is not set.
    #[error("Extraction provider credential '{env_var}' is not set.\nExport it before scanning: export {env_var}=...")]
    MissingCredential { env_var: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The reference-data file could not be read or parsed.
    #[error("Failed to load reference data from '{path}': {detail}")]
    ReferenceData { path: PathBuf, detail: String },

    // ── Input ─────────────────────────────────────────────────────────────
    /// Image file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    ImageNotFound { path: PathBuf },

    /// The bytes supplied are not a usable image.
    #[error("Invalid receipt image: {detail}")]
    InvalidImage { detail: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Extraction service ────────────────────────────────────────────────
    /// The underlying provider call failed (network, HTTP status, auth).
    #[error("Extraction service call failed: {message}")]
    TransportFailure { message: String },

    /// The extraction call did not complete within the configured timeout.
    #[error("Extraction service timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider answered with an empty body.
    #[error("Extraction service returned no data")]
    EmptyResponse,

    /// The body contained no recoverable JSON object.
    #[error("Extraction response was malformed: {detail}")]
    MalformedResponse { detail: String },

    // ── Normalization ─────────────────────────────────────────────────────
    /// The reconciled total is zero or negative.
    #[error("Receipt total must be positive, got {total}")]
    InvalidAmount { total: f64 },

    // ── Session ───────────────────────────────────────────────────────────
    /// A scan is already in flight and the session rejects a second one.
    #[error("A scan is already in progress")]
    ScanInProgress,

    /// A newer scan replaced this one before it finished; its result was discarded.
    #[error("Scan was superseded by a newer scan")]
    Superseded,

    /// The caller cancelled the scan before it finished.
    #[error("Scan was cancelled")]
    Cancelled,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Stable machine-readable code, suitable for logs and UI branching.
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::MissingCredential { .. } => "API_KEY_MISSING",
            ScanError::InvalidConfig(_) => "INVALID_CONFIG",
            ScanError::ReferenceData { .. } => "REFERENCE_DATA",
            ScanError::ImageNotFound { .. } => "IMAGE_NOT_FOUND",
            ScanError::InvalidImage { .. } => "INVALID_IMAGE",
            ScanError::DownloadFailed { .. } => "DOWNLOAD_FAILED",
            ScanError::TransportFailure { .. } => "TRANSPORT_FAILURE",
            ScanError::Timeout { .. } => "TIMEOUT",
            ScanError::EmptyResponse => "EMPTY_RESPONSE",
            ScanError::MalformedResponse { .. } => "PARSING_FAILED",
            ScanError::InvalidAmount { .. } => "INVALID_AMOUNT",
            ScanError::ScanInProgress => "SCAN_IN_PROGRESS",
            ScanError::Superseded => "SUPERSEDED",
            ScanError::Cancelled => "CANCELLED",
            ScanError::Internal(_) => "INTERNAL",
        }
    }

    /// Short message for the capture screen.
    ///
    /// Unlike `Display`, these never include provider detail or file paths.
    pub fn user_message(&self) -> &'static str {
        match self {
            ScanError::MissingCredential { .. } => {
                "The scanner is not initialized. Set the provider API key and try again."
            }
            ScanError::InvalidConfig(_) | ScanError::ReferenceData { .. } => {
                "The scanner is misconfigured. Check the settings and try again."
            }
            ScanError::ImageNotFound { .. } | ScanError::InvalidImage { .. } => {
                "That image could not be read. Capture the receipt again."
            }
            ScanError::DownloadFailed { .. } => {
                "The image could not be downloaded. Check your connection."
            }
            ScanError::TransportFailure { .. } => {
                "The scanning service could not be reached. Check your connection."
            }
            ScanError::Timeout { .. } => "The scanning service took too long to respond.",
            ScanError::EmptyResponse => "The scanning engine returned no data.",
            ScanError::MalformedResponse { .. } => {
                "The data returned from the scanner was malformed."
            }
            ScanError::InvalidAmount { .. } => {
                "No payable amount was found on the receipt. Make sure the total is visible."
            }
            ScanError::ScanInProgress => "A scan is already running. Please wait.",
            ScanError::Superseded | ScanError::Cancelled => "The scan was interrupted.",
            ScanError::Internal(_) => "Something went wrong while scanning.",
        }
    }

    /// Whether the capture screen should offer "retry scan" for this error.
    ///
    /// Every terminal failure is retryable by the user. A superseded scan is
    /// not: its replacement is already running.
    pub fn is_retryable_by_user(&self) -> bool {
        !matches!(self, ScanError::Superseded)
    }
}
