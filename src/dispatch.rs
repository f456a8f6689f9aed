//! Research request dispatch through the guard.
//!
//! This is the caller side of the guard: each ticker is validated, then
//! each research request for it asks the guard for quota. The outbound
//! research call itself belongs to the external research pipeline, so a
//! dispatch stops at the guard's decision.

use crate::error::GuardError;
use crate::guard::RequestGuard;
use crate::models::{RequestOutcome, TickerCheck};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tickers researched in demo mode.
pub const DEMO_TICKERS: [&str; 3] = ["AAPL", "MSFT", "GOOGL"];

/// How requests are dispatched.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Caller identity quota is charged to.
    pub caller_id: String,
    /// Research requests issued per valid ticker.
    pub requests_per_ticker: usize,
    /// On a denial, sleep for the retry-after hint once and ask again.
    pub wait_on_limit: bool,
    /// Show a spinner while waiting.
    pub show_progress: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            caller_id: "default".to_string(),
            requests_per_ticker: 1,
            wait_on_limit: false,
            show_progress: false,
        }
    }
}

/// Run one ticker through the guard.
pub async fn dispatch_ticker(
    guard: &RequestGuard,
    raw_ticker: &str,
    options: &DispatchOptions,
) -> TickerCheck {
    let caller = options.caller_id.as_str();

    let symbol = match guard.validate_ticker(caller, raw_ticker) {
        Ok(symbol) => symbol,
        Err(e) => {
            warn!(kind = %e.kind(), "Skipping ticker: {}", e);
            return TickerCheck {
                input: raw_ticker.to_string(),
                symbol: None,
                error: Some(e.to_string()),
                requests: Vec::new(),
            };
        }
    };

    let mut requests = Vec::with_capacity(options.requests_per_ticker);

    for attempt in 1..=options.requests_per_ticker {
        let admit = || debug!("{} request {} admitted", symbol, attempt);
        let mut result = guard.guarded(caller, admit);
        let mut waited = false;

        if let Err(GuardError::QuotaExceeded { retry_after_secs, .. }) = &result {
            if options.wait_on_limit {
                info!(
                    "Quota exhausted for {}, waiting {}s before retrying {}",
                    caller, retry_after_secs, symbol
                );
                wait_for_retry(Duration::from_secs(*retry_after_secs), options.show_progress)
                    .await;
                result = guard.guarded(caller, admit);
                waited = true;
            }
        }

        let retry_after_secs = match &result {
            Err(GuardError::QuotaExceeded { retry_after_secs, .. }) => Some(*retry_after_secs),
            _ => None,
        };

        requests.push(RequestOutcome {
            attempt,
            allowed: result.is_ok(),
            retry_after_secs,
            waited,
        });
    }

    TickerCheck {
        input: raw_ticker.to_string(),
        symbol: Some(symbol),
        error: None,
        requests,
    }
}

/// Run every ticker through the guard, in order.
pub async fn dispatch_all(
    guard: &RequestGuard,
    tickers: &[String],
    options: &DispatchOptions,
) -> Vec<TickerCheck> {
    let mut checks = Vec::with_capacity(tickers.len());

    for ticker in tickers {
        checks.push(dispatch_ticker(guard, ticker, options).await);
    }

    checks
}

/// Sleep out a quota denial.
async fn wait_for_retry(delay: Duration, show_progress: bool) {
    let spinner = if show_progress {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.yellow} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!(
            "Rate limited, retrying in {:.1}s...",
            delay.as_secs_f64()
        ));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    tokio::time::sleep(delay).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
}
