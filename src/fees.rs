//! Fee Calculator: derive the bridge fee, tax on fee and final debit.
//!
//! Fee figures are pure functions of a [`PaymentQuote`] and two configured
//! rates. They are never stored on the quote and never rounded during the
//! calculation; round only when displaying, with [`FeeBreakdown::rounded`] or
//! [`round_currency`]. Recomputing from the same inputs therefore always
//! yields bit-identical results.

use crate::quote::PaymentQuote;
use serde::{Deserialize, Serialize};

/// Default bridge fee: 1.5% of the converted amount.
pub const DEFAULT_BRIDGE_FEE_RATE: f64 = 0.015;

/// Default tax charged on the bridge fee: 18%.
pub const DEFAULT_TAX_ON_FEE_RATE: f64 = 0.18;

/// Typical international markup charged by retail banks, used for the
/// savings estimate shown next to the breakdown.
pub const DEFAULT_BANK_MARKUP_RATE: f64 = 0.035;

/// Fee rates applied to every quote. Fixed configuration, never user input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub bridge_fee_rate: f64,
    pub tax_on_fee_rate: f64,
    pub bank_markup_rate: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            bridge_fee_rate: DEFAULT_BRIDGE_FEE_RATE,
            tax_on_fee_rate: DEFAULT_TAX_ON_FEE_RATE,
            bank_markup_rate: DEFAULT_BANK_MARKUP_RATE,
        }
    }
}

impl FeeSchedule {
    /// Every rate must be finite and non-negative.
    pub fn validate(&self) -> Result<(), String> {
        for (name, rate) in [
            ("bridge fee rate", self.bridge_fee_rate),
            ("tax-on-fee rate", self.tax_on_fee_rate),
            ("bank markup rate", self.bank_markup_rate),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(format!("{name} must be a non-negative number, got {rate}"));
            }
        }
        Ok(())
    }

    pub fn breakdown(&self, quote: &PaymentQuote) -> FeeBreakdown {
        FeeBreakdown::compute(quote, self.bridge_fee_rate, self.tax_on_fee_rate)
            .with_savings(self.bank_markup_rate)
    }
}

/// Derived fee figures for one quote, in local currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub bridge_fee: f64,
    pub tax_on_fee: f64,
    pub final_debit: f64,
    /// Estimated saving versus a retail bank's international markup.
    pub estimated_savings: f64,
}

impl FeeBreakdown {
    /// `bridge = inr × fee_rate`, `tax = bridge × tax_rate`,
    /// `final = inr + bridge + tax`.
    pub fn compute(quote: &PaymentQuote, fee_rate: f64, tax_on_fee_rate: f64) -> Self {
        let base = quote.inr_amount;
        let bridge_fee = base * fee_rate;
        let tax_on_fee = bridge_fee * tax_on_fee_rate;
        Self {
            bridge_fee,
            tax_on_fee,
            final_debit: base + bridge_fee + tax_on_fee,
            estimated_savings: 0.0,
        }
    }

    pub fn with_savings(mut self, bank_markup_rate: f64) -> Self {
        self.estimated_savings = self.final_debit * bank_markup_rate;
        self
    }

    /// Copy with every figure rounded to two decimals, for display only.
    pub fn rounded(&self) -> Self {
        Self {
            bridge_fee: round_currency(self.bridge_fee),
            tax_on_fee: round_currency(self.tax_on_fee),
            final_debit: round_currency(self.final_debit),
            estimated_savings: round_currency(self.estimated_savings),
        }
    }
}

/// Round to two decimals, half away from zero.
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(inr: f64) -> PaymentQuote {
        PaymentQuote {
            merchant_name: "m".into(),
            country: "c".into(),
            original_currency_code: "USD".into(),
            original_amount: inr / 83.5,
            subtotal: 0.0,
            tax: 0.0,
            inr_amount: inr,
            is_domestic_route: false,
        }
    }

    #[test]
    fn computes_breakdown() {
        let fees = FeeBreakdown::compute(&quote(1000.0), 0.015, 0.18);
        assert!((fees.bridge_fee - 15.0).abs() < 1e-9);
        assert!((fees.tax_on_fee - 2.7).abs() < 1e-9);
        assert!((fees.final_debit - 1017.7).abs() < 1e-9);
    }

    #[test]
    fn recomputation_is_bit_identical() {
        let q = quote(9853.0 * 1.0000001);
        let a = FeeBreakdown::compute(&q, DEFAULT_BRIDGE_FEE_RATE, DEFAULT_TAX_ON_FEE_RATE);
        let b = FeeBreakdown::compute(&q, DEFAULT_BRIDGE_FEE_RATE, DEFAULT_TAX_ON_FEE_RATE);
        assert_eq!(a.final_debit.to_bits(), b.final_debit.to_bits());
    }

    #[test]
    fn no_rounding_before_presentation() {
        let fees = FeeBreakdown::compute(&quote(333.333), 0.015, 0.18);
        assert_ne!(fees.bridge_fee, round_currency(fees.bridge_fee));
        assert_eq!(fees.rounded().bridge_fee, 5.0);
    }

    #[test]
    fn zero_rates_leave_amount_untouched() {
        let fees = FeeBreakdown::compute(&quote(500.0), 0.0, 0.0);
        assert_eq!(fees.final_debit, 500.0);
    }

    #[test]
    fn schedule_rejects_negative_and_nan() {
        let mut s = FeeSchedule::default();
        assert!(s.validate().is_ok());
        s.tax_on_fee_rate = -0.1;
        assert!(s.validate().is_err());
        s.tax_on_fee_rate = f64::NAN;
        assert!(s.validate().is_err());
    }

    #[test]
    fn savings_estimate() {
        let fees = FeeSchedule::default().breakdown(&quote(1000.0));
        assert!((fees.estimated_savings - 1017.7 * 0.035).abs() < 1e-9);
    }

    #[test]
    fn round_currency_half_away_from_zero() {
        assert_eq!(round_currency(1.005_000_1), 1.01);
        assert_eq!(round_currency(2.344), 2.34);
        assert_eq!(round_currency(-2.345_000_1), -2.35);
    }
}
