//! Static reference data: currency rates and domestic-market keywords.
//!
//! Reference data is loaded once at startup and shared immutably for the
//! lifetime of the process (wrap it in an `Arc` and hand it to
//! [`crate::config::ScanConfig`]). Nothing in the pipeline mutates it; to
//! change rates, load a new [`ReferenceData`] and build a new config.
//!
//! Rates are expressed as *local (INR) units per one unit of foreign
//! currency*, so converting a receipt total is a single multiplication.
//!
//! The built-in table is a snapshot and is only meant as a working default.
//! Deployments load their own file with [`ReferenceData::from_json_file`]:
//!
//! ```json
//! {
//!   "default_currency": "USD",
//!   "rates": [
//!     { "code": "USD", "symbol": "$", "rate": 83.5 },
//!     { "code": "SGD", "symbol": "S$", "rate": 62.1 }
//!   ],
//!   "domestic_markets": ["India", "Singapore"],
//!   "placeholders": { "merchant_name": "Elite Merchant", "country": "International Node" }
//! }
//! ```
//!
//! Every top-level field is optional; omitted fields keep the built-in value.

use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Code of the entry unknown currencies fall back to.
pub const DEFAULT_CURRENCY: &str = "USD";

/// One row of the currency table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRate {
    /// ISO 4217 code, upper-case.
    pub code: String,
    /// Display symbol, e.g. `$`.
    pub symbol: String,
    /// Local units per one unit of this currency.
    pub rate: f64,
}

impl CurrencyRate {
    pub fn new(code: impl Into<String>, symbol: impl Into<String>, rate: f64) -> Self {
        Self {
            code: code.into(),
            symbol: symbol.into(),
            rate,
        }
    }
}

/// Immutable currency table keyed by upper-case ISO code.
#[derive(Debug, Clone)]
pub struct RateTable {
    rates: HashMap<String, CurrencyRate>,
    default_code: String,
}

impl RateTable {
    /// Build a table, validating every row and the presence of the default entry.
    pub fn new(
        rows: impl IntoIterator<Item = CurrencyRate>,
        default_code: impl Into<String>,
    ) -> Result<Self, ScanError> {
        let mut rates = HashMap::new();
        for mut row in rows {
            row.code = row.code.trim().to_uppercase();
            if row.code.is_empty() {
                return Err(ScanError::InvalidConfig(
                    "currency rate with empty code".into(),
                ));
            }
            if !row.rate.is_finite() || row.rate <= 0.0 {
                return Err(ScanError::InvalidConfig(format!(
                    "rate for {} must be positive, got {}",
                    row.code, row.rate
                )));
            }
            rates.insert(row.code.clone(), row);
        }

        let default_code = default_code.into().trim().to_uppercase();
        if !rates.contains_key(&default_code) {
            return Err(ScanError::InvalidConfig(format!(
                "default currency {default_code} has no rate entry"
            )));
        }

        Ok(Self {
            rates,
            default_code,
        })
    }

    /// Look up a code exactly (after trim + upper-case). `None` when unknown.
    pub fn get(&self, code: &str) -> Option<&CurrencyRate> {
        self.rates.get(&code.trim().to_uppercase())
    }

    /// Look up a code, falling back to the default entry when unknown or absent.
    pub fn resolve(&self, code: Option<&str>) -> &CurrencyRate {
        code.and_then(|c| self.get(c))
            .unwrap_or_else(|| self.default_rate())
    }

    /// The fallback entry.
    pub fn default_rate(&self) -> &CurrencyRate {
        // `new` guarantees the default entry exists.
        &self.rates[&self.default_code]
    }

    pub fn default_code(&self) -> &str {
        &self.default_code
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Rows sorted by code, for display.
    pub fn sorted(&self) -> Vec<&CurrencyRate> {
        let mut rows: Vec<&CurrencyRate> = self.rates.values().collect();
        rows.sort_by(|a, b| a.code.cmp(&b.code));
        rows
    }
}

impl Default for RateTable {
    fn default() -> Self {
        let rows = builtin_rates()
            .iter()
            .map(|(code, symbol, rate)| CurrencyRate::new(*code, *symbol, *rate))
            .collect::<Vec<_>>();
        let rates = rows.into_iter().map(|r| (r.code.clone(), r)).collect();
        Self {
            rates,
            default_code: DEFAULT_CURRENCY.to_string(),
        }
    }
}

/// Strings substituted for identity fields the extractor could not read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Placeholders {
    pub merchant_name: String,
    pub country: String,
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            merchant_name: "Elite Merchant".to_string(),
            country: "International Node".to_string(),
        }
    }
}

/// All static data the normalizer needs.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub rates: RateTable,
    /// Lower-cased keywords; a match routes the payment over the local network.
    domestic_markets: Vec<String>,
    pub placeholders: Placeholders,
}

impl Default for ReferenceData {
    fn default() -> Self {
        Self {
            rates: RateTable::default(),
            domestic_markets: normalise_keywords(BUILTIN_DOMESTIC_MARKETS.iter().copied()),
            placeholders: Placeholders::default(),
        }
    }
}

/// On-disk shape of a reference-data file.
#[derive(Debug, Default, Deserialize)]
struct ReferenceFile {
    default_currency: Option<String>,
    rates: Option<Vec<CurrencyRate>>,
    domestic_markets: Option<Vec<String>>,
    placeholders: Option<Placeholders>,
}

impl ReferenceData {
    pub fn new(
        rates: RateTable,
        domestic_markets: impl IntoIterator<Item = impl AsRef<str>>,
        placeholders: Placeholders,
    ) -> Self {
        Self {
            rates,
            domestic_markets: normalise_keywords(domestic_markets),
            placeholders,
        }
    }

    /// Parse reference data from a JSON string. Omitted fields keep built-in values.
    pub fn from_json_str(json: &str) -> Result<Self, ScanError> {
        let file: ReferenceFile = serde_json::from_str(json)
            .map_err(|e| ScanError::InvalidConfig(format!("reference data: {e}")))?;

        let builtin = Self::default();
        let default_code = file
            .default_currency
            .unwrap_or_else(|| builtin.rates.default_code().to_string());

        let rates = match file.rates {
            Some(rows) => RateTable::new(rows, default_code)?,
            None => RateTable::new(builtin.rates.rates.into_values(), default_code)?,
        };

        let domestic_markets = match file.domestic_markets {
            Some(words) => normalise_keywords(words),
            None => builtin.domestic_markets,
        };

        Ok(Self {
            rates,
            domestic_markets,
            placeholders: file.placeholders.unwrap_or(builtin.placeholders),
        })
    }

    /// Load reference data from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::ReferenceData {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let data = Self::from_json_str(&text).map_err(|e| ScanError::ReferenceData {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        debug!(
            "Loaded {} currency rates and {} domestic markets from {}",
            data.rates.len(),
            data.domestic_markets.len(),
            path.display()
        );
        Ok(data)
    }

    pub fn domestic_markets(&self) -> &[String] {
        &self.domestic_markets
    }

    /// True when any haystack contains any domestic-market keyword,
    /// case-insensitively. Substring match, so "Singapore Pte" and
    /// "Republic of Singapore" both count.
    pub fn is_domestic(&self, haystacks: &[Option<&str>]) -> bool {
        haystacks.iter().flatten().any(|text| {
            let text = text.to_lowercase();
            self.domestic_markets
                .iter()
                .any(|keyword| text.contains(keyword.as_str()))
        })
    }
}

fn normalise_keywords(words: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    words
        .into_iter()
        .map(|w| w.as_ref().trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

// ── Built-in tables ──────────────────────────────────────────────────────

fn builtin_rates() -> &'static [(&'static str, &'static str, f64)] {
    &[
        ("USD", "$", 83.5),
        ("EUR", "€", 90.2),
        ("GBP", "£", 105.8),
        ("SGD", "S$", 62.1),
        ("AED", "AED ", 22.73),
        ("JPY", "¥", 0.56),
        ("AUD", "A$", 55.0),
        ("CAD", "C$", 61.4),
        ("CHF", "CHF ", 94.3),
        ("THB", "฿", 2.31),
        ("MYR", "RM", 17.7),
        ("HKD", "HK$", 10.7),
        ("CNY", "¥", 11.5),
        ("NPR", "Rs ", 0.625),
        ("LKR", "Rs ", 0.28),
        ("MUR", "₨", 1.82),
        ("OMR", "OMR ", 216.9),
        ("QAR", "QR ", 22.9),
        ("INR", "₹", 1.0),
    ]
}

/// Markets reachable over the local instant-payment network.
const BUILTIN_DOMESTIC_MARKETS: &[&str] = &[
    "India",
    "Singapore",
    "UAE",
    "United Arab Emirates",
    "Nepal",
    "Bhutan",
    "Mauritius",
    "Sri Lanka",
    "France",
    "Oman",
    "Qatar",
];
