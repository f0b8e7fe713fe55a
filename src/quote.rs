//! Data model: untrusted extraction, trusted quote, confirmed intent.

use crate::fees::FeeBreakdown;
use crate::reference::CurrencyRate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields the extraction service reported, exactly as received.
///
/// Nothing here is trusted. Every field may be missing, mistyped, zero,
/// negative or inconsistent with the others; accessors coerce on read and
/// never fail. Field names follow the extraction schema (camelCase) and
/// accept the common aliases models emit instead. A body may carry both a
/// key and its alias; the first non-null one in [`RawExtraction`]'s key
/// order wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct RawExtraction {
    #[serde(rename = "merchantName")]
    pub merchant_name: Option<Value>,
    pub country: Option<Value>,
    #[serde(rename = "currencyCode")]
    pub currency_code: Option<Value>,
    pub subtotal: Option<Value>,
    pub tax: Option<Value>,
    pub total: Option<Value>,
}

const MERCHANT_KEYS: &[&str] = &["merchantName", "merchant_name", "merchant"];
const COUNTRY_KEYS: &[&str] = &["country"];
const CURRENCY_KEYS: &[&str] = &["currencyCode", "currency", "currency_code"];
const SUBTOTAL_KEYS: &[&str] = &["subtotal"];
const TAX_KEYS: &[&str] = &["tax"];
const TOTAL_KEYS: &[&str] = &["total", "totalAmount", "total_amount"];

impl From<Map<String, Value>> for RawExtraction {
    fn from(mut map: Map<String, Value>) -> Self {
        Self {
            merchant_name: take_first(&mut map, MERCHANT_KEYS),
            country: take_first(&mut map, COUNTRY_KEYS),
            currency_code: take_first(&mut map, CURRENCY_KEYS),
            subtotal: take_first(&mut map, SUBTOTAL_KEYS),
            tax: take_first(&mut map, TAX_KEYS),
            total: take_first(&mut map, TOTAL_KEYS),
        }
    }
}

/// First non-null value among `keys`, in order.
fn take_first(map: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|key| map.remove(*key))
        .find(|value| !value.is_null())
}

impl RawExtraction {
    /// Merchant name, trimmed. Blank counts as absent.
    pub fn merchant_name(&self) -> Option<String> {
        text_of(self.merchant_name.as_ref())
    }

    /// Country, trimmed. Blank counts as absent.
    pub fn country(&self) -> Option<String> {
        text_of(self.country.as_ref())
    }

    /// Currency code, trimmed and upper-cased. Blank counts as absent.
    pub fn currency_code(&self) -> Option<String> {
        text_of(self.currency_code.as_ref()).map(|c| c.to_uppercase())
    }

    pub fn subtotal(&self) -> Option<f64> {
        number_of(self.subtotal.as_ref())
    }

    pub fn tax(&self) -> Option<f64> {
        number_of(self.tax.as_ref())
    }

    pub fn total(&self) -> Option<f64> {
        number_of(self.total.as_ref())
    }
}

/// Coerce a JSON value to a finite number.
///
/// Numbers pass through; strings are parsed after trimming. Anything else,
/// including NaN and infinities, is `None`.
pub(crate) fn number_of(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn text_of(value: Option<&Value>) -> Option<String> {
    let s = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Canonical, trusted output of the normalizer.
///
/// Invariant: `original_amount > 0`. Constructed once per scan and never
/// modified; fee figures are derived from it on demand with
/// [`FeeBreakdown::compute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQuote {
    pub merchant_name: String,
    pub country: String,
    pub original_currency_code: String,
    /// Resolved total in the receipt's currency.
    pub original_amount: f64,
    pub subtotal: f64,
    pub tax: f64,
    /// `original_amount × rate`, unrounded.
    pub inr_amount: f64,
    pub is_domestic_route: bool,
}

impl PaymentQuote {
    /// Human label for the settlement route.
    pub fn route_label(&self) -> &'static str {
        if self.is_domestic_route {
            "Native UPI Path"
        } else {
            "Universal Bridge"
        }
    }
}

/// A quote the user accepted, ready for the payment-initiation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub quote: PaymentQuote,
    pub rate: CurrencyRate,
    pub fees: FeeBreakdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_numeric_strings() {
        let raw: RawExtraction =
            serde_json::from_value(json!({ "subtotal": " 12.50 ", "tax": "abc", "total": 14 }))
                .unwrap();
        assert_eq!(raw.subtotal(), Some(12.5));
        assert_eq!(raw.tax(), None);
        assert_eq!(raw.total(), Some(14.0));
    }

    #[test]
    fn non_scalar_values_are_absent() {
        let raw: RawExtraction = serde_json::from_value(json!({
            "merchantName": { "name": "x" },
            "total": [1, 2],
            "tax": null,
            "country": true
        }))
        .unwrap();
        assert_eq!(raw.merchant_name(), None);
        assert_eq!(raw.total(), None);
        assert_eq!(raw.tax(), None);
        assert_eq!(raw.country(), None);
    }

    #[test]
    fn accepts_currency_alias_and_upper_cases() {
        let raw: RawExtraction =
            serde_json::from_value(json!({ "currency": " sgd " })).unwrap();
        assert_eq!(raw.currency_code().as_deref(), Some("SGD"));
    }

    #[test]
    fn key_and_alias_together_are_accepted() {
        let cases = [
            (json!({ "currency": "SGD", "currencyCode": "EUR" }), "currency"),
            (json!({ "total": 10, "totalAmount": 12 }), "total"),
            (json!({ "merchantName": "Cafe", "merchant": "Other" }), "merchant"),
        ];
        for (body, field) in cases {
            let raw: RawExtraction = serde_json::from_value(body.clone())
                .unwrap_or_else(|e| panic!("{field}: {e} for {body}"));
            match field {
                "currency" => assert_eq!(raw.currency_code().as_deref(), Some("EUR")),
                "total" => assert_eq!(raw.total(), Some(10.0)),
                _ => assert_eq!(raw.merchant_name().as_deref(), Some("Cafe")),
            }
        }
    }

    #[test]
    fn null_key_falls_through_to_alias() {
        let raw: RawExtraction =
            serde_json::from_value(json!({ "total": null, "total_amount": "7.25" })).unwrap();
        assert_eq!(raw.total(), Some(7.25));
    }

    #[test]
    fn serialised_extraction_reads_back() {
        let raw: RawExtraction =
            serde_json::from_value(json!({ "merchant": "Cafe", "currency": "usd", "total": 3 }))
                .unwrap();
        let back: RawExtraction =
            serde_json::from_value(serde_json::to_value(&raw).unwrap()).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn blank_text_is_absent() {
        let raw: RawExtraction =
            serde_json::from_value(json!({ "merchantName": "   ", "country": "Nepal " })).unwrap();
        assert_eq!(raw.merchant_name(), None);
        assert_eq!(raw.country().as_deref(), Some("Nepal"));
    }

    #[test]
    fn quote_serialises_camel_case() {
        let quote = PaymentQuote {
            merchant_name: "Cafe".into(),
            country: "Singapore".into(),
            original_currency_code: "SGD".into(),
            original_amount: 10.0,
            subtotal: 9.0,
            tax: 1.0,
            inr_amount: 621.0,
            is_domestic_route: true,
        };
        let v = serde_json::to_value(&quote).unwrap();
        assert_eq!(v["originalCurrencyCode"], "SGD");
        assert_eq!(v["isDomesticRoute"], true);
        assert_eq!(quote.route_label(), "Native UPI Path");
    }
}
