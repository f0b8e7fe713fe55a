//! Prompts for receipt extraction.
//!
//! The extraction schema is described in the prompt rather than enforced by
//! the provider: not every backend supports a native JSON mode, and those
//! that do still treat "required" as advisory. The response is always
//! repaired and validated downstream, so the prompt only has to make a
//! well-formed object *likely*.
//!
//! Callers can override the default via [`crate::config::ScanConfig::system_prompt`].

/// Field list of the extraction target, as shown to the model.
pub const EXTRACTION_SCHEMA: &str = r#"{
  "merchantName": string,   // name of the shop, restaurant or payee
  "country": string,        // country where the receipt was issued
  "currencyCode": string,   // ISO 4217 code, e.g. "USD", "SGD", "EUR"
  "subtotal": number,       // amount before tax
  "tax": number,            // tax or service charge
  "total": number           // final payable amount (required)
}"#;

/// Default system prompt for receipt and payment-QR extraction.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a receipt reader for a cross-border payments app. The image shows a shop receipt, an invoice, or a payment QR code with its printed label.

Extract the payment details and follow these rules precisely:

1. AMOUNTS
   - Report amounts as plain JSON numbers without currency symbols or thousands separators
   - "total" is the final amount the customer must pay
   - If a value is not printed, provide your best estimate; omit it only if there is no basis at all

2. CURRENCY
   - Report the ISO 4217 code of the currency the amounts are printed in
   - Infer it from the symbol and the country when no code is printed

3. IDENTITY
   - "merchantName" is the business name as printed, not the address
   - "country" is the full English country name

4. OUTPUT FORMAT
   - Output ONLY one JSON object with these fields:
"#;

/// Full system prompt: rules followed by the schema.
pub fn extraction_prompt() -> String {
    format!("{DEFAULT_SYSTEM_PROMPT}{EXTRACTION_SCHEMA}\n   - Do NOT wrap the object in code fences\n   - Do NOT add commentary or explanations")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_schema_field() {
        let prompt = extraction_prompt();
        for field in ["merchantName", "country", "currencyCode", "subtotal", "tax", "total"] {
            assert!(prompt.contains(field), "missing {field}");
        }
    }
}
