//! Pipeline stages for receipt-to-quote conversion.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested on its own and the extraction backend can be swapped without
//! touching validation.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ extract ──▶ parse ──▶ normalize
//! (path/URL) (base64)   (VLM)     (repair)   (quote)
//! ```
//!
//! 1. [`input`]     — resolve a path, URL, data URI or bare base64 to bytes
//! 2. [`encode`]    — sniff the format, downscale oversized photos, base64-wrap
//! 3. [`extract`]   — the single outbound call; the only stage with network I/O
//! 4. [`parse`]     — recover a JSON object from the response body
//! 5. [`normalize`] — reconcile amounts, resolve currency, classify route

pub mod encode;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod parse;
