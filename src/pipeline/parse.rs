//! Response repair: recover a JSON object from whatever the model returned.
//!
//! Even in JSON mode, models sometimes wrap the object in a ```json fence,
//! prefix it with "Sure! Here is…", or append an explanation. Parsing is
//! therefore attempted in three passes:
//!
//! 1. the whole body as JSON
//! 2. the body with an outer code fence removed
//! 3. the first balanced top-level `{…}` found by brace matching
//!
//! Brace matching is string-aware: braces inside JSON string literals (and
//! escaped quotes inside those) do not count.

use crate::error::ScanError;
use crate::quote::RawExtraction;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n?(.*?)\n?```\s*$").unwrap());

/// Parse a response body into an untrusted extraction.
///
/// # Errors
/// * [`ScanError::EmptyResponse`] — body is empty or whitespace
/// * [`ScanError::MalformedResponse`] — no JSON object could be recovered
pub fn parse_extraction(body: &str) -> Result<RawExtraction, ScanError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ScanError::EmptyResponse);
    }

    let object = locate_object(body).ok_or_else(|| {
        warn!("No JSON object in extraction response ({} bytes)", body.len());
        ScanError::MalformedResponse {
            detail: format!("no JSON object found in: {}", preview(body)),
        }
    })?;

    Ok(RawExtraction::from(object))
}

/// Find the JSON object in `body`, trying each pass in turn.
fn locate_object(body: &str) -> Option<Map<String, Value>> {
    if let Some(obj) = parse_object(body) {
        return Some(obj);
    }

    if let Some(caps) = RE_OUTER_FENCE.captures(body) {
        if let Some(obj) = parse_object(caps[1].trim()) {
            debug!("Recovered JSON from fenced response");
            return Some(obj);
        }
    }

    let mut search_from = 0;
    while let Some(candidate) = first_balanced_object(&body[search_from..]) {
        if let Some(obj) = parse_object(candidate.text) {
            warn!("Recovered JSON object embedded in surrounding text");
            return Some(obj);
        }
        search_from += candidate.start + 1;
    }
    None
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

struct Candidate<'a> {
    start: usize,
    text: &'a str,
}

/// The first `{` and its matching `}`, skipping braces inside strings.
fn first_balanced_object(s: &str) -> Option<Candidate<'_>> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in s[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(Candidate {
                        start,
                        text: &s[start..end],
                    });
                }
            }
            _ => {}
        }
    }
    None
}

/// First 80 characters, for error messages.
fn preview(body: &str) -> String {
    let mut out: String = body.chars().take(80).collect();
    if body.chars().count() > 80 {
        out.push('…');
    }
    out
}
