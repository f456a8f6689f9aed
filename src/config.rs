//! Configuration file handling.
//!
//! This module handles loading `.researchguard.toml`, applying the
//! environment overrides, and merging CLI arguments on top.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".researchguard.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Request quota settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// API key format policy.
    #[serde(default)]
    pub api_keys: ApiKeysConfig,

    /// Prompt text sanitization policy.
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Caller identity quotas are tracked under.
    #[serde(default = "default_caller_id")]
    pub caller_id: String,

    /// Report output path. No report file is written when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Log level name (`trace`, `debug`, `info`, `warn`, `error`).
    /// `warning` and `critical` are accepted as aliases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Append log output, security events included, to this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            caller_id: default_caller_id(),
            output: None,
            verbose: false,
            log_level: None,
            log_file: None,
        }
    }
}

fn default_caller_id() -> String {
    "default".to_string()
}

/// Sliding-window rate limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// When false every quota check is allowed.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests admitted per caller in any trailing 60 seconds.
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,

    /// Token budget per LLM request. Reported, not enforced.
    #[serde(default = "default_max_tokens_per_request")]
    pub max_tokens_per_request: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_minute: default_max_requests_per_minute(),
            max_tokens_per_request: default_max_tokens_per_request(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_requests_per_minute() -> u32 {
    60
}

fn default_max_tokens_per_request() -> u32 {
    4000
}

/// Format rule for one provider's API keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRule {
    /// Minimum key length in characters.
    pub min_length: usize,

    /// Required key prefix, if the provider uses one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// API key policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    /// Minimum length for providers without a rule.
    #[serde(default = "default_min_key_length")]
    pub default_min_length: usize,

    /// Per-provider rules.
    #[serde(default = "default_provider_rules")]
    pub providers: BTreeMap<String, ApiKeyRule>,
}

impl Default for ApiKeysConfig {
    fn default() -> Self {
        Self {
            default_min_length: default_min_key_length(),
            providers: default_provider_rules(),
        }
    }
}

fn default_min_key_length() -> usize {
    16
}

fn default_provider_rules() -> BTreeMap<String, ApiKeyRule> {
    let rule = |min_length: usize, prefix: Option<&str>| ApiKeyRule {
        min_length,
        prefix: prefix.map(String::from),
    };

    [
        ("openai", rule(20, Some("sk-"))),
        ("news", rule(32, None)),
        ("alpha_vantage", rule(16, None)),
    ]
    .into_iter()
    .map(|(name, rule)| (name.to_string(), rule))
    .collect()
}

/// Prompt sanitization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Markers removed case-insensitively.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,

    /// Remove remaining HTML-like tags.
    #[serde(default = "default_true")]
    pub strip_tags: bool,

    /// Maximum sanitized length in characters.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            denylist: default_denylist(),
            strip_tags: true,
            max_length: default_max_length(),
        }
    }
}

fn default_denylist() -> Vec<String> {
    vec!["<script>", "</script>", "javascript:", "onload=", "onerror="]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_length() -> usize {
    10_000
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location in `dir`.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default_in(dir: &Path) -> Result<Option<Self>> {
        let default_path = dir.join(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(&default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Load the explicit config file, or else the default file in `dir`,
    /// or else defaults. Returns the path that was loaded, if any.
    ///
    /// A file that exists but cannot be read or parsed is an error, never
    /// a silent fallback to defaults.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        match Self::load_default_in(dir)
            .with_context(|| format!("Failed to load {}", CONFIG_FILE_NAME))?
        {
            Some(config) => Ok((config, Some(dir.join(CONFIG_FILE_NAME)))),
            None => Ok((Self::default(), None)),
        }
    }

    /// Apply `MAX_REQUESTS_PER_MINUTE`, `MAX_TOKENS_PER_REQUEST`,
    /// `ENABLE_RATE_LIMITING`, `LOG_LEVEL` and `LOG_FILE` from the
    /// process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides from an arbitrary lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("MAX_REQUESTS_PER_MINUTE") {
            self.rate_limit.max_requests_per_minute = value
                .trim()
                .parse()
                .with_context(|| format!("MAX_REQUESTS_PER_MINUTE is not a number: {}", value))?;
        }

        if let Some(value) = lookup("MAX_TOKENS_PER_REQUEST") {
            self.rate_limit.max_tokens_per_request = value
                .trim()
                .parse()
                .with_context(|| format!("MAX_TOKENS_PER_REQUEST is not a number: {}", value))?;
        }

        if let Some(value) = lookup("ENABLE_RATE_LIMITING") {
            self.rate_limit.enabled = parse_bool(&value)
                .with_context(|| format!("ENABLE_RATE_LIMITING is not a boolean: {}", value))?;
        }

        if let Some(value) = lookup("LOG_LEVEL") {
            parse_log_level(&value)
                .with_context(|| format!("LOG_LEVEL is not a log level: {}", value))?;
            self.general.log_level = Some(value.trim().to_lowercase());
        }

        if let Some(value) = lookup("LOG_FILE") {
            let value = value.trim();
            self.general.log_file = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            };
        }

        Ok(())
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file and environment settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref caller) = args.caller {
            self.general.caller_id = caller.clone();
        }

        if let Some(max) = args.max_requests_per_minute {
            self.rate_limit.max_requests_per_minute = max;
        }

        if args.no_rate_limit {
            self.rate_limit.enabled = false;
        }

        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check values a config file could have set to something unusable.
    pub fn validate(&self) -> Result<()> {
        if self.general.caller_id.trim().is_empty() {
            bail!("general.caller_id must not be empty");
        }
        if self.rate_limit.enabled && self.rate_limit.max_requests_per_minute == 0 {
            bail!("rate_limit.max_requests_per_minute must be at least 1");
        }
        if self.sanitizer.max_length == 0 {
            bail!("sanitizer.max_length must be at least 1");
        }
        if let Some(ref level) = self.general.log_level {
            parse_log_level(level).context("general.log_level is invalid")?;
        }
        Ok(())
    }

    /// Effective log level. `quiet` wins over `verbose`, which wins over
    /// `log_level`.
    pub fn log_level(&self, quiet: bool) -> Level {
        if quiet {
            Level::ERROR
        } else if self.general.verbose {
            Level::DEBUG
        } else {
            self.general
                .log_level
                .as_deref()
                .and_then(|level| parse_log_level(level).ok())
                .unwrap_or(Level::INFO)
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

fn parse_log_level(value: &str) -> Result<Level> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" | "critical" => Ok(Level::ERROR),
        other => bail!("expected trace, debug, info, warn or error, got '{}'", other),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => bail!("expected true or false, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.caller_id, "default");
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.max_requests_per_minute, 60);
        assert_eq!(config.rate_limit.max_tokens_per_request, 4000);
        assert_eq!(config.sanitizer.max_length, 10_000);
        assert_eq!(
            config.api_keys.providers.get("openai").and_then(|r| r.prefix.as_deref()),
            Some("sk-")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
caller_id = "research-session"

[rate_limit]
max_requests_per_minute = 10
enabled = false

[api_keys.providers.polygon]
min_length = 24

[sanitizer]
denylist = ["ignore previous instructions"]
max_length = 2000
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.caller_id, "research-session");
        assert_eq!(config.rate_limit.max_requests_per_minute, 10);
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.max_tokens_per_request, 4000);
        assert_eq!(config.api_keys.providers.len(), 1);
        assert_eq!(config.api_keys.providers["polygon"].min_length, 24);
        assert_eq!(config.sanitizer.denylist, vec!["ignore previous instructions"]);
        assert!(config.sanitizer.strip_tags);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit]\nmax_requests_per_minute = 5").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.rate_limit.max_requests_per_minute, 5);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit\nbroken").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_resolve_fails_on_malformed_default_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[rate_limit]\nmax_requests_per_minute = \"5\"\n",
        )
        .unwrap();

        let err = Config::resolve(None, dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_resolve_default_file_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let (config, path) = Config::resolve(None, dir.path()).unwrap();
        assert!(path.is_none());
        assert_eq!(config.rate_limit.max_requests_per_minute, 60);

        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[rate_limit]\nmax_requests_per_minute = 5\n",
        )
        .unwrap();
        let (config, path) = Config::resolve(None, dir.path()).unwrap();
        assert_eq!(path, Some(dir.path().join(CONFIG_FILE_NAME)));
        assert_eq!(config.rate_limit.max_requests_per_minute, 5);
    }

    #[test]
    fn test_resolve_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "not = [valid").unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit]\nmax_requests_per_minute = 9").unwrap();

        let (config, path) = Config::resolve(Some(file.path()), dir.path()).unwrap();
        assert_eq!(path.as_deref(), Some(file.path()));
        assert_eq!(config.rate_limit.max_requests_per_minute, 9);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[
                ("MAX_REQUESTS_PER_MINUTE", "3"),
                ("MAX_TOKENS_PER_REQUEST", " 8000 "),
                ("ENABLE_RATE_LIMITING", "False"),
            ]))
            .unwrap();

        assert_eq!(config.rate_limit.max_requests_per_minute, 3);
        assert_eq!(config.rate_limit.max_tokens_per_request, 8000);
        assert!(!config.rate_limit.enabled);
    }

    #[test]
    fn test_env_absent_keeps_values() {
        let mut config = Config::default();
        config.rate_limit.max_requests_per_minute = 7;
        config.apply_env_with(env(&[])).unwrap();
        assert_eq!(config.rate_limit.max_requests_per_minute, 7);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_env_rejects_malformed_values() {
        let mut config = Config::default();
        let err = config
            .apply_env_with(env(&[("MAX_REQUESTS_PER_MINUTE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("MAX_REQUESTS_PER_MINUTE"));

        let err = config
            .apply_env_with(env(&[("ENABLE_RATE_LIMITING", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("ENABLE_RATE_LIMITING"));
    }

    #[test]
    fn test_env_log_settings() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[
                ("LOG_LEVEL", "WARNING"),
                ("LOG_FILE", "investment_research.log"),
            ]))
            .unwrap();

        assert_eq!(config.general.log_level.as_deref(), Some("warning"));
        assert_eq!(
            config.general.log_file.as_deref(),
            Some("investment_research.log")
        );
        assert_eq!(config.log_level(false), Level::WARN);

        config.apply_env_with(env(&[("LOG_FILE", " ")])).unwrap();
        assert!(config.general.log_file.is_none());

        let err = config
            .apply_env_with(env(&[("LOG_LEVEL", "loud")]))
            .unwrap_err();
        assert!(err.to_string().contains("LOG_LEVEL"));
    }

    #[test]
    fn test_log_level_precedence() {
        let mut config = Config::default();
        assert_eq!(config.log_level(false), Level::INFO);

        config.general.log_level = Some("critical".to_string());
        assert_eq!(config.log_level(false), Level::ERROR);

        config.general.verbose = true;
        assert_eq!(config.log_level(false), Level::DEBUG);
        assert_eq!(config.log_level(true), Level::ERROR);
    }

    #[test]
    fn test_verbose_key_from_file() {
        let config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        assert_eq!(config.log_level(false), Level::DEBUG);
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut config = Config::default();
        config.general.log_level = Some("chatty".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_quota() {
        let mut config = Config::default();
        config.rate_limit.max_requests_per_minute = 0;
        assert!(config.validate().is_err());

        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[rate_limit]"));
        assert!(toml_str.contains("[api_keys.providers.openai]"));
        assert!(toml_str.contains("[sanitizer]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.rate_limit.max_requests_per_minute, 60);
    }
}
