//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::dispatch::DEMO_TICKERS;
use clap::Parser;
use std::path::PathBuf;

/// ResearchGuard - request guard for LLM investment research
///
/// Validates ticker symbols and API keys, sanitizes prompt text, and
/// enforces a per-caller sliding request quota before research calls
/// reach the LLM or data providers.
///
/// Examples:
///   researchguard --tickers AAPL,MSFT
///   researchguard --tickers AAPL --requests 5 --max-requests-per-minute 3
///   researchguard --demo --output report.md
///   researchguard --tickers BRK.B --prompt "Summarize recent news" --format json -o out.json
///   researchguard --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Ticker symbols to research (comma-separated)
    ///
    /// 1-10 characters from A-Z, 0-9, '.' and '-'; lowercase is uppercased.
    #[arg(
        short,
        long,
        value_name = "SYMBOLS",
        value_delimiter = ',',
        required_unless_present_any = ["init_config", "demo"]
    )]
    pub tickers: Vec<String>,

    /// Research the demo tickers (AAPL, MSFT, GOOGL)
    #[arg(long, conflicts_with = "tickers")]
    pub demo: bool,

    /// Caller identity that quotas are tracked under
    #[arg(long, value_name = "ID", env = "RESEARCHGUARD_CALLER")]
    pub caller: Option<String>,

    /// Provider whose key format policy applies to the API key
    #[arg(long, default_value = "openai", value_name = "NAME")]
    pub provider: String,

    /// API key for the provider
    ///
    /// Falls back to `<PROVIDER>_API_KEY` (e.g. OPENAI_API_KEY, NEWS_API_KEY).
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Requests admitted per caller in any 60 second window
    ///
    /// Overrides MAX_REQUESTS_PER_MINUTE and the config file.
    #[arg(long, value_name = "COUNT")]
    pub max_requests_per_minute: Option<u32>,

    /// Disable rate limiting (every quota check is allowed)
    #[arg(long)]
    pub no_rate_limit: bool,

    /// Research requests to issue per ticker
    #[arg(long, default_value = "1", value_name = "COUNT")]
    pub requests: usize,

    /// When rate limited, wait for the retry-after hint once and try again
    #[arg(long)]
    pub wait: bool,

    /// Prompt text to sanitize before it is sent to the LLM
    #[arg(long, value_name = "TEXT")]
    pub prompt: Option<String>,

    /// Output file path for the report
    ///
    /// No report file is written when omitted.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .researchguard.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .researchguard.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Environment variable holding the API key for `provider`.
pub fn api_key_env_var(provider: &str) -> String {
    format!("{}_API_KEY", provider.trim().to_uppercase().replace('-', "_"))
}

/// Upper bound on --requests, to keep a typo from hammering the guard.
const MAX_REQUESTS_PER_TICKER: usize = 1000;

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.requests == 0 {
            return Err("Requests per ticker must be at least 1".to_string());
        }

        if self.requests > MAX_REQUESTS_PER_TICKER {
            return Err(format!(
                "Requests per ticker must be at most {}",
                MAX_REQUESTS_PER_TICKER
            ));
        }

        if self.max_requests_per_minute == Some(0) {
            return Err("Max requests per minute must be at least 1".to_string());
        }

        if let Some(ref caller) = self.caller {
            if caller.trim().is_empty() {
                return Err("Caller identity must not be empty".to_string());
            }
        }

        if self.provider.trim().is_empty() {
            return Err("Provider name must not be empty".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// The API key from `--api-key`, or else from the provider's variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|key| std::env::var(key).ok())
    }

    /// [`resolve_api_key`](Self::resolve_api_key) over an arbitrary lookup.
    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key
            .clone()
            .or_else(|| lookup(&api_key_env_var(&self.provider)))
    }

    /// Tickers to research: the demo list, or the user's list trimmed.
    ///
    /// Empty entries are kept so that validation reports them.
    pub fn effective_tickers(&self) -> Vec<String> {
        if self.demo {
            return DEMO_TICKERS.iter().map(|t| t.to_string()).collect();
        }

        self.tickers.iter().map(|t| t.trim().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            tickers: vec!["AAPL".to_string()],
            demo: false,
            caller: None,
            provider: "openai".to_string(),
            api_key: None,
            max_requests_per_minute: None,
            no_rate_limit: false,
            requests: 1,
            wait: false,
            prompt: None,
            output: None,
            format: OutputFormat::Markdown,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_ticker_list() {
        let args = Args::try_parse_from([
            "researchguard",
            "--tickers",
            "aapl, msft ,BRK.B",
            "--requests",
            "3",
        ])
        .unwrap();
        assert_eq!(args.effective_tickers(), vec!["aapl", "msft", "BRK.B"]);
        assert_eq!(args.requests, 3);
        assert_eq!(args.format, OutputFormat::Markdown);
    }

    #[test]
    fn test_tickers_required_without_demo() {
        assert!(Args::try_parse_from(["researchguard"]).is_err());
        assert!(Args::try_parse_from(["researchguard", "--demo"]).is_ok());
        assert!(Args::try_parse_from(["researchguard", "--init-config"]).is_ok());
        assert!(Args::try_parse_from(["researchguard", "--demo", "--tickers", "AAPL"]).is_err());
    }

    #[test]
    fn test_demo_tickers() {
        let mut args = make_args();
        args.demo = true;
        args.tickers.clear();
        assert_eq!(args.effective_tickers(), vec!["AAPL", "MSFT", "GOOGL"]);
    }

    #[test]
    fn test_empty_entries_are_kept() {
        let mut args = make_args();
        args.tickers = vec!["AAPL".to_string(), " ".to_string()];
        assert_eq!(args.effective_tickers(), vec!["AAPL", ""]);
    }

    #[test]
    fn test_validation_zero_requests() {
        let mut args = make_args();
        args.requests = 0;
        assert!(args.validate().is_err());

        args.requests = MAX_REQUESTS_PER_TICKER + 1;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_quota() {
        let mut args = make_args();
        args.max_requests_per_minute = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_blank_caller() {
        let mut args = make_args();
        args.caller = Some("  ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_api_key_env_var_follows_provider() {
        assert_eq!(api_key_env_var("openai"), "OPENAI_API_KEY");
        assert_eq!(api_key_env_var("news"), "NEWS_API_KEY");
        assert_eq!(api_key_env_var("alpha-vantage"), "ALPHA_VANTAGE_API_KEY");
    }

    #[test]
    fn test_resolve_api_key() {
        let lookup = |key: &str| match key {
            "OPENAI_API_KEY" => Some("sk-from-env".to_string()),
            "NEWS_API_KEY" => Some("news-from-env".to_string()),
            _ => None,
        };

        let mut args = make_args();
        assert_eq!(args.resolve_api_key_with(lookup).as_deref(), Some("sk-from-env"));

        args.provider = "news".to_string();
        assert_eq!(args.resolve_api_key_with(lookup).as_deref(), Some("news-from-env"));

        args.provider = "alpha_vantage".to_string();
        assert_eq!(args.resolve_api_key_with(lookup), None);

        args.api_key = Some("explicit".to_string());
        assert_eq!(args.resolve_api_key_with(lookup).as_deref(), Some("explicit"));
    }
}
