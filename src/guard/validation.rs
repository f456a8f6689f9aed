//! Ticker and API key validation.
//!
//! Both validators are pure functions; the guard wraps them to emit
//! security events.

use crate::config::{ApiKeyRule, ApiKeysConfig};
use crate::error::GuardError;
use crate::models::{ApiKeyCredential, TickerSymbol};
use std::collections::BTreeMap;

/// Maximum ticker length in characters, exchange suffix included.
pub const MAX_TICKER_LEN: usize = 10;

/// Validate and normalize a ticker symbol.
///
/// The input is uppercased, then must be 1 to 10 characters drawn from
/// `A-Z`, `0-9`, `.` and `-`. Surrounding whitespace is not trimmed.
/// Only ASCII letters are case-folded; `ß` is rejected, not read as `SS`.
pub fn validate_ticker(input: &str) -> Result<TickerSymbol, GuardError> {
    if input.is_empty() {
        return Err(GuardError::ticker(input, "ticker is empty"));
    }

    let normalized = input.to_ascii_uppercase();

    let len = normalized.chars().count();
    if len > MAX_TICKER_LEN {
        return Err(GuardError::ticker(
            input,
            format!("{} characters exceeds the maximum of {}", len, MAX_TICKER_LEN),
        ));
    }

    if let Some((index, ch)) = normalized
        .chars()
        .enumerate()
        .find(|(_, ch)| !is_ticker_char(*ch))
    {
        return Err(GuardError::ticker(
            input,
            format!("character {:?} at position {} is not allowed", ch, index),
        ));
    }

    Ok(TickerSymbol::new_unchecked(normalized))
}

fn is_ticker_char(ch: char) -> bool {
    ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '.' || ch == '-'
}

/// Per-provider API key format rules.
#[derive(Debug, Clone)]
pub struct ApiKeyPolicy {
    /// Minimum length for providers without an explicit rule.
    pub default_min_length: usize,
    /// Rules keyed by lowercase provider name.
    pub providers: BTreeMap<String, ApiKeyRule>,
}

impl Default for ApiKeyPolicy {
    fn default() -> Self {
        Self::from(&ApiKeysConfig::default())
    }
}

impl From<&ApiKeysConfig> for ApiKeyPolicy {
    fn from(config: &ApiKeysConfig) -> Self {
        Self {
            default_min_length: config.default_min_length,
            providers: config
                .providers
                .iter()
                .map(|(name, rule)| (name.trim().to_lowercase(), rule.clone()))
                .collect(),
        }
    }
}

impl ApiKeyPolicy {
    /// Rule for `provider`, falling back to the default minimum length.
    pub fn rule_for(&self, provider: &str) -> ApiKeyRule {
        self.providers
            .get(&provider.trim().to_lowercase())
            .cloned()
            .unwrap_or(ApiKeyRule {
                min_length: self.default_min_length,
                prefix: None,
            })
    }
}

/// Validate an API key against the provider's policy.
pub fn validate_api_key(
    input: &str,
    provider: &str,
    policy: &ApiKeyPolicy,
) -> Result<ApiKeyCredential, GuardError> {
    if input.trim().is_empty() {
        return Err(GuardError::api_key(provider, "key is empty"));
    }

    if input.chars().any(char::is_whitespace) {
        return Err(GuardError::api_key(provider, "key contains whitespace"));
    }

    // Sample .env files ship with this placeholder
    let placeholder = format!("your_{}_api_key_here", provider.trim().to_lowercase());
    if input.eq_ignore_ascii_case(&placeholder) {
        return Err(GuardError::api_key(
            provider,
            "key is still the sample placeholder",
        ));
    }

    let rule = policy.rule_for(provider);

    let len = input.chars().count();
    if len < rule.min_length {
        return Err(GuardError::api_key(
            provider,
            format!(
                "key is {} characters, minimum is {}",
                len, rule.min_length
            ),
        ));
    }

    if let Some(ref prefix) = rule.prefix {
        if !input.starts_with(prefix.as_str()) {
            return Err(GuardError::api_key(
                provider,
                format!("key must start with '{}'", prefix),
            ));
        }
    }

    Ok(ApiKeyCredential::new(provider, input))
}
