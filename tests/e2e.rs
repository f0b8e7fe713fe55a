//! End-to-end tests against a live vision provider.
//!
//! These use real receipt photos in `./test_cases/` and make live LLM API
//! calls. They are gated behind the `E2E_ENABLED` environment variable so
//! they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 GEMINI_API_KEY=... cargo test --test e2e -- --nocapture

use edgequake_scanpay::{scan, ScanConfig, ScanError, ScanSession};
use std::path::PathBuf;

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no image file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn live_config() -> ScanConfig {
    let mut builder = ScanConfig::builder();
    if let Ok(provider) = std::env::var("SCANPAY_PROVIDER") {
        builder = builder.provider_name(provider);
    }
    if let Ok(model) = std::env::var("SCANPAY_MODEL") {
        builder = builder.model(model);
    }
    builder.build().expect("valid config")
}

#[tokio::test]
async fn test_scan_restaurant_receipt() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("receipt.jpg"));

    let out = scan(path.to_string_lossy(), &live_config())
        .await
        .expect("live scan should succeed");

    println!("{}", serde_json::to_string_pretty(&out).unwrap());
    assert!(out.quote.original_amount > 0.0);
    assert!(out.quote.inr_amount > 0.0);
    assert!(!out.quote.merchant_name.is_empty());
    assert!(out.fees.final_debit > out.quote.inr_amount);
    assert!(out.stats.input_tokens > 0);
}

#[tokio::test]
async fn test_session_confirm_live() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("receipt.jpg"));

    let session = ScanSession::new(live_config());
    let out = session
        .scan(path.to_string_lossy())
        .await
        .expect("live scan should succeed");
    let intent = session.confirm().expect("quote to confirm");
    assert_eq!(intent.quote, out.quote);
}

#[tokio::test]
async fn test_unreadable_image_fails_fast() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }

    let err = scan(test_cases_dir().join("nope.jpg").to_string_lossy(), &live_config())
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::ImageNotFound { .. }));
}
