//! CLI binary for edgequake-scanpay.
//!
//! A thin shim over the library crate that maps CLI flags to `ScanConfig`,
//! shows the payment breakdown, and asks for confirmation.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_scanpay::pipeline::input::{is_data_uri, is_url};
use edgequake_scanpay::{
    round_currency, ProgressCallback, ReferenceData, ScanConfig, ScanError, ScanOutput,
    ScanProgressCallback, ScanSession, ScanStage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that follows the scan stages.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Scanning");
        Arc::new(Self { bar })
    }
}

impl ScanProgressCallback for CliProgressCallback {
    fn on_scan_start(&self) {
        self.bar.set_message("Warming up…");
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_stage(&self, stage: ScanStage) {
        self.bar.set_message(stage.label());
    }

    fn on_scan_complete(&self, duration_ms: u64) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} Receipt read in {}",
            green("✔"),
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0))
        );
    }

    fn on_scan_error(&self, _error: &str) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scan a receipt photo and confirm interactively
  scanpay receipt.jpg

  # Scan from a URL, print the quote as JSON, no prompt
  scanpay https://example.com/receipt.png --json

  # Auto-confirm and emit the payment intent
  scanpay receipt.jpg --yes

  # Use OpenAI instead of Gemini
  scanpay --provider openai --model gpt-4.1-mini receipt.jpg

  # Custom rate table and fee schedule
  scanpay --reference rates.json --fee-rate 0.01 receipt.jpg

REFERENCE DATA FILE (--reference):
  {
    "default_currency": "USD",
    "rates": [ { "code": "USD", "symbol": "$", "rate": 83.5 } ],
    "domestic_markets": ["India", "Singapore", "Nepal"],
    "placeholders": { "merchant_name": "Elite Merchant", "country": "International Node" }
  }
  Every field is optional; omitted fields keep the built-in values.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  SCANPAY_PROVIDER        Override provider (gemini, openai, anthropic, ollama)
  SCANPAY_MODEL           Override model ID
  RUST_LOG                Override log filter

EXIT STATUS:
  0  quote produced (and confirmed, when prompted)
  1  scan failed; the message says why, run the same command to retry
  2  quote declined
"#;

/// Scan receipts and payment QR codes into cross-border payment quotes.
#[derive(Parser, Debug)]
#[command(
    name = "scanpay",
    version,
    about = "Scan receipts into cross-border payment quotes using Vision LLMs",
    long_about = "Read a receipt or payment-QR photo with a Vision Language Model, reconcile the \
extracted amounts, convert the currency and show the full fee breakdown before you confirm. \
Supports Google Gemini, OpenAI, Anthropic and any provider edgequake-llm knows.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image file path, HTTP/HTTPS URL, data URI, or bare base64.
    input: String,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-mini).
    #[arg(long, env = "SCANPAY_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "SCANPAY_PROVIDER")]
    provider: Option<String>,

    /// Environment variable holding the provider API key
    /// (gemini, openai, anthropic, openrouter).
    #[arg(long, env = "SCANPAY_CREDENTIAL_ENV")]
    credential_env: Option<String>,

    /// Reference-data JSON file (currency rates, domestic markets).
    #[arg(long, env = "SCANPAY_REFERENCE")]
    reference: Option<PathBuf>,

    /// Bridge fee as a fraction of the converted amount.
    #[arg(long, env = "SCANPAY_FEE_RATE", default_value_t = 0.015)]
    fee_rate: f64,

    /// Tax on the bridge fee as a fraction.
    #[arg(long, env = "SCANPAY_TAX_ON_FEE_RATE", default_value_t = 0.18)]
    tax_on_fee_rate: f64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "SCANPAY_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Longest image edge sent to the provider, in pixels.
    #[arg(long, env = "SCANPAY_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Extraction call timeout in seconds.
    #[arg(long, env = "SCANPAY_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SCANPAY_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Output the scan result as JSON instead of the breakdown; never prompts.
    #[arg(long, env = "SCANPAY_JSON")]
    json: bool,

    /// Confirm without prompting and print the payment intent as JSON.
    #[arg(short, long)]
    yes: bool,

    /// Disable the spinner.
    #[arg(long, env = "SCANPAY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCANPAY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, env = "SCANPAY_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && io::stderr().is_terminal();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ScanProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run scan ─────────────────────────────────────────────────────────
    let session = ScanSession::new(config);
    let output = match session.scan(&cli.input).await {
        Ok(output) => output,
        Err(e) => {
            report_error(&e, &cli.input);
            return Ok(ExitCode::from(1));
        }
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(ExitCode::SUCCESS);
    }

    if !cli.quiet {
        print_breakdown(&output, cli.fee_rate);
    }

    let confirmed = cli.yes || (io::stdin().is_terminal() && ask_confirmation()?);
    if !confirmed {
        session.cancel();
        if !cli.quiet {
            eprintln!("{} Payment request cancelled", dim("✗"));
        }
        return Ok(ExitCode::from(2));
    }

    let Some(intent) = session.confirm() else {
        eprintln!("{} The payment context was lost. Please retry scanning.", red("✘"));
        return Ok(ExitCode::from(1));
    };
    let json = serde_json::to_string_pretty(&intent).context("Failed to serialise payment intent")?;
    println!("{json}");
    if !cli.quiet {
        eprintln!("{} Payment intent handed off", green("✔"));
    }
    Ok(ExitCode::SUCCESS)
}

/// Map CLI args to `ScanConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ScanConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let reference = match cli.reference {
        Some(ref path) => ReferenceData::from_json_file(path).context("Invalid reference data")?,
        None => ReferenceData::default(),
    };

    let mut builder = ScanConfig::builder()
        .reference(Arc::new(reference))
        .bridge_fee_rate(cli.fee_rate)
        .tax_on_fee_rate(cli.tax_on_fee_rate)
        .max_image_pixels(cli.max_pixels)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref var) = cli.credential_env {
        builder = builder.credential_env(var);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Print the merchant card and transparency breakdown to stderr.
fn print_breakdown(output: &ScanOutput, fee_rate: f64) {
    let q = &output.quote;
    let fees = output.fees.rounded();

    eprintln!();
    eprintln!("  {}", bold(&q.merchant_name));
    eprintln!(
        "  {}",
        dim(&format!("{} • {}", q.country, q.route_label()))
    );
    eprintln!();
    eprintln!(
        "  Total bill            {}{:.2}   {}",
        output.rate.symbol,
        q.original_amount,
        dim(&format!("≈ ₹{:.2}", round_currency(q.inr_amount)))
    );
    eprintln!();
    eprintln!("  {}", cyan("Transparency breakdown"));
    eprintln!(
        "  Mid-market rate       1 {} = {} INR",
        output.rate.code, output.rate.rate
    );
    eprintln!(
        "  Bridge fee ({}%)      ₹{:.2}",
        percent(fee_rate),
        fees.bridge_fee
    );
    eprintln!("  Tax on fee            ₹{:.2}", fees.tax_on_fee);
    eprintln!("  ─────────────────────────────────");
    eprintln!("  Final bank deduction  {}", bold(&format!("₹{:.2}", fees.final_debit)));
    eprintln!(
        "  {}",
        green(&format!(
            "You're saving ~₹{:.2} vs standard bank international markups.",
            fees.estimated_savings
        ))
    );
    eprintln!();
}

fn percent(rate: f64) -> String {
    let p = round_currency(rate * 100.0);
    if p.fract() == 0.0 {
        format!("{p:.0}")
    } else {
        format!("{p}")
    }
}

fn ask_confirmation() -> Result<bool> {
    eprint!("{} ", bold("Confirm payment? [y/N]"));
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read confirmation")?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn report_error(e: &ScanError, input: &str) {
    eprintln!("{} {}", red("✘ Capture interrupted:"), e.user_message());
    eprintln!("  {}", dim(&format!("[{}] {}", e.code(), e)));
    if e.is_retryable_by_user() {
        eprintln!("  {}", dim(&retry_hint(input)));
    }
}

/// Longest input echoed back verbatim in the retry hint.
const MAX_ECHOED_INPUT: usize = 256;

/// Retry hint that repeats paths and URLs but never an inline image payload.
fn retry_hint(input: &str) -> String {
    let input = input.trim();
    if is_data_uri(input) || (!is_url(input) && input.len() > MAX_ECHOED_INPUT) {
        format!(
            "Retry scan: run scanpay again with the same image ({} bytes inline)",
            input.len()
        )
    } else {
        format!("Retry scan: scanpay {input}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_hint_repeats_paths_and_urls() {
        assert_eq!(retry_hint("receipt.jpg"), "Retry scan: scanpay receipt.jpg");
        assert_eq!(
            retry_hint("https://example.com/r.png"),
            "Retry scan: scanpay https://example.com/r.png"
        );
    }

    #[test]
    fn retry_hint_never_echoes_inline_images() {
        let payload = "A".repeat(4 * 1024 * 1024);
        let data_uri = format!("data:image/png;base64,{payload}");
        for input in [payload.as_str(), data_uri.as_str()] {
            let hint = retry_hint(input);
            assert!(hint.len() < 100, "hint too long: {} bytes", hint.len());
            assert!(!hint.contains("AAAA"));
        }
    }
}
