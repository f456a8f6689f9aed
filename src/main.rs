//! ResearchGuard - request guard for LLM-driven investment research
//!
//! A CLI that puts every research request for a ticker through input
//! validation, prompt sanitization and a per-caller sliding-window quota
//! before it may reach the LLM or a data provider.
//!
//! Exit codes:
//!   0 - Every key, ticker and quota check passed
//!   1 - Runtime error (config, missing API key, report write failure, etc.)
//!   2 - A key, ticker or quota check was rejected

mod audit;
mod cli;
mod config;
mod dispatch;
mod error;
mod guard;
mod models;
mod report;

use anyhow::{Context, Result};
use audit::EventLog;
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use dispatch::DispatchOptions;
use guard::RequestGuard;
use models::{ApiKeyCheck, EventSummary, GuardReport, ReportMetadata};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Configuration decides the log level and file, so it loads first
    let (config, config_path) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config, &args) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }

    info!("ResearchGuard v{}", env!("CARGO_PKG_VERSION"));
    match config_path {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    match run_guard(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .researchguard.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize rate limits, key policies, and sanitization.");
    Ok(())
}

/// Initialize logging: console always, plus the log file when configured.
fn init_logging(config: &Config, args: &Args) -> Result<()> {
    let level = config.log_level(args.quiet);

    let console = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let file = match config.general.log_file {
        Some(ref path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(console)
        .with(file);

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to set tracing subscriber: {}", e);
    }

    Ok(())
}

/// Run every check for this invocation. Returns exit code (0 or 2).
async fn run_guard(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let caller_id = config.general.caller_id.clone();

    let event_log = EventLog::new();
    let guard = RequestGuard::from_config(&config)?.with_sink(Arc::new(event_log.clone()));

    let settings = guard.settings();
    if settings.enabled {
        info!(
            "Rate limiting {} requests/minute for caller {}",
            settings.max_requests_per_minute, caller_id
        );
    } else {
        warn!("Rate limiting is disabled");
    }

    // Step 1: API key
    let api_key = args.resolve_api_key().with_context(|| {
        format!(
            "Missing API key. Set {} or pass --api-key.",
            cli::api_key_env_var(&args.provider)
        )
    })?;

    let api_key_check = match guard.validate_api_key(&caller_id, &api_key, &args.provider) {
        Ok(key) => {
            println!("✅ {} API key validated", key.provider());
            ApiKeyCheck {
                provider: key.provider().to_string(),
                fingerprint: Some(key.fingerprint()),
                error: None,
            }
        }
        Err(e) => {
            eprintln!("❌ [{}] {}", e.kind(), e);
            ApiKeyCheck {
                provider: args.provider.clone(),
                fingerprint: None,
                error: Some(e.to_string()),
            }
        }
    };

    // Step 2: prompt text
    let sanitized_prompt = args
        .prompt
        .as_deref()
        .map(|prompt| guard.sanitize_text(&caller_id, prompt));

    // Step 3: tickers, skipped entirely when the key is unusable
    let tickers = args.effective_tickers();
    let checks = if api_key_check.is_valid() {
        if args.demo {
            println!("🎯 Running in demo mode");
        }
        println!("🔍 Checking {} ticker(s) as caller '{}'...", tickers.len(), caller_id);

        let options = DispatchOptions {
            caller_id: caller_id.clone(),
            requests_per_ticker: args.requests,
            wait_on_limit: args.wait,
            show_progress: !args.quiet,
        };
        dispatch::dispatch_all(&guard, &tickers, &options).await
    } else {
        warn!("Skipping {} ticker(s): API key rejected", tickers.len());
        Vec::new()
    };

    // Step 4: build the report
    debug!("Recorded {} security events", event_log.len());
    let events = event_log.snapshot();

    let report = GuardReport {
        metadata: ReportMetadata {
            caller_id: caller_id.clone(),
            run_date: Utc::now(),
            rate_limiting_enabled: settings.enabled,
            max_requests_per_minute: settings.max_requests_per_minute,
            max_tokens_per_request: config.rate_limit.max_tokens_per_request,
            tickers_checked: checks.len(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        api_key: api_key_check,
        sanitized_prompt,
        checks,
        summary: EventSummary::from_events(&events),
        events,
    };

    print_summary(&report);

    if let Some(ref output_path) = config.general.output {
        let output = match args.format {
            OutputFormat::Json => report::generate_json_report(&report)?,
            OutputFormat::Markdown => report::generate_markdown_report(&report),
        };

        std::fs::write(output_path, &output)
            .with_context(|| format!("Failed to write report to {}", output_path))?;
        println!("💾 Report saved to {}", output_path);
    }

    if report.has_rejections() {
        eprintln!("\n⛔ One or more checks were rejected (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Print a short per-ticker summary.
fn print_summary(report: &GuardReport) {
    println!("\n📊 Guard Summary:");

    for check in &report.checks {
        match check.symbol {
            Some(ref symbol) if check.passed() => {
                println!("   ✅ {}: {} request(s) allowed", symbol, check.requests.len());
            }
            Some(ref symbol) => {
                let retry = check
                    .requests
                    .iter()
                    .filter_map(|r| r.retry_after_secs)
                    .max()
                    .unwrap_or_default();
                println!(
                    "   ⛔ {}: {} of {} request(s) rate limited, retry in {}s",
                    symbol,
                    check.denied_count(),
                    check.requests.len(),
                    retry
                );
            }
            None => {
                println!(
                    "   ❌ '{}': {}",
                    check.input,
                    check.error.as_deref().unwrap_or("invalid")
                );
            }
        }
    }

    let summary = &report.summary;
    println!(
        "   Events: {} | ✅ Allowed: {} | ❌ Rejected: {} | ⛔ Denied: {}",
        summary.total, summary.allowed, summary.rejected, summary.denied
    );
}

/// Load configuration. Defaults < config file < environment < CLI.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    let (mut config, path) = Config::resolve(args.config.as_deref(), Path::new("."))?;
    config
        .apply_env()
        .context("Invalid setting in environment")?;
    config.merge_with_args(args);
    config.validate()?;
    Ok((config, path))
}
