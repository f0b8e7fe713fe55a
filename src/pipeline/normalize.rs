//! Receipt Normalizer: untrusted [`RawExtraction`] → trusted [`PaymentQuote`].
//!
//! The normalizer prefers a best-effort quote over failing. Identity fields
//! (merchant, country, currency) are cosmetic and repaired silently; only
//! the amount is load-bearing, and a non-positive resolved total is fatal.
//!
//! ## Total reconciliation
//!
//! The extractor sometimes mis-totals a receipt while reading subtotal and
//! tax correctly, so when both are present their sum is trusted over the
//! reported total:
//!
//! | `subtotal + tax` | vs `total`            | resolved total    |
//! |------------------|-----------------------|-------------------|
//! | `> 0`            | differs by `> 0.01`   | `subtotal + tax`  |
//! | any              | agrees within `0.01`  | `total`           |
//! | any              | `total` absent / `<= 0` | `subtotal + tax` |

use crate::error::ScanError;
use crate::quote::{PaymentQuote, RawExtraction};
use crate::reference::ReferenceData;
use tracing::{debug, warn};

/// Absolute tolerance, in currency units, between `total` and `subtotal + tax`.
pub const TOTAL_TOLERANCE: f64 = 0.01;

/// Pick the single trusted payable amount.
///
/// Absent or non-numeric `subtotal`/`tax` count as `0`.
pub fn resolve_total(subtotal: f64, tax: f64, total: Option<f64>) -> f64 {
    let calculated = subtotal + tax;
    match total {
        Some(reported) if calculated > 0.0 && (calculated - reported).abs() > TOTAL_TOLERANCE => {
            if reported > 0.0 {
                debug!(
                    "Reported total {} disagrees with subtotal+tax {}; using the sum",
                    reported, calculated
                );
            }
            calculated
        }
        Some(reported) if reported > 0.0 => reported,
        _ => calculated,
    }
}

/// Convert an extraction into a quote.
///
/// # Errors
/// [`ScanError::InvalidAmount`] when the resolved total is `<= 0`, or when
/// it or its converted amount overflows to infinity.
pub fn normalize(raw: &RawExtraction, reference: &ReferenceData) -> Result<PaymentQuote, ScanError> {
    let subtotal = raw.subtotal().unwrap_or(0.0);
    let tax = raw.tax().unwrap_or(0.0);
    let total = resolve_total(subtotal, tax, raw.total());

    if !total.is_finite() || total <= 0.0 {
        return Err(ScanError::InvalidAmount { total });
    }

    let reported_code = raw.currency_code();
    let rate = reference.rates.resolve(reported_code.as_deref());
    if let Some(ref code) = reported_code {
        if *code != rate.code {
            warn!("Unknown currency '{}', falling back to {}", code, rate.code);
        }
    }

    let inr_amount = total * rate.rate;
    if !inr_amount.is_finite() {
        warn!("Converted amount overflows for total {} {}", total, rate.code);
        return Err(ScanError::InvalidAmount { total });
    }

    let merchant_name = raw.merchant_name();
    let country = raw.country();
    let is_domestic_route = reference.is_domestic(&[country.as_deref(), merchant_name.as_deref()]);

    Ok(PaymentQuote {
        merchant_name: merchant_name.unwrap_or_else(|| reference.placeholders.merchant_name.clone()),
        country: country.unwrap_or_else(|| reference.placeholders.country.clone()),
        original_currency_code: rate.code.clone(),
        original_amount: total,
        // A zero subtotal means the extractor only saw the total.
        subtotal: if subtotal != 0.0 { subtotal } else { total },
        tax,
        inr_amount,
        is_domestic_route,
    })
}
