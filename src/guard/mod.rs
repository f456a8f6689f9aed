//! The request guard.
//!
//! Every outbound call to an LLM or data-provider API goes through a
//! [`RequestGuard`]: inputs are validated and sanitized, then the caller's
//! quota is checked. Each decision is reported to the guard's event sinks.

pub mod quota;
pub mod sanitize;
pub mod validation;

pub use quota::QuotaTracker;
pub use sanitize::Sanitizer;
pub use validation::{validate_api_key, validate_ticker, ApiKeyPolicy};

use crate::audit::{EventSink, TracingSink};
use crate::config::Config;
use crate::error::GuardError;
use crate::models::{
    ApiKeyCredential, EventKind, EventOutcome, QuotaDecision, SecurityEvent, TickerSymbol,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Rate limit settings the guard enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub max_requests_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_minute: 60,
        }
    }
}

/// Validation, sanitization and quota gate for outbound calls.
pub struct RequestGuard {
    settings: RateLimitSettings,
    key_policy: ApiKeyPolicy,
    sanitizer: Sanitizer,
    quota: QuotaTracker,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl RequestGuard {
    /// Create a guard. Events go to a [`TracingSink`] until more sinks are added.
    pub fn new(
        settings: RateLimitSettings,
        key_policy: ApiKeyPolicy,
        sanitizer: Sanitizer,
        quota: QuotaTracker,
    ) -> Self {
        Self {
            settings,
            key_policy,
            sanitizer,
            quota,
            sinks: vec![Arc::new(TracingSink)],
        }
    }

    /// Build a guard on the system clock from loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let sanitizer = Sanitizer::new(&config.sanitizer)
            .context("Failed to compile sanitizer denylist")?;

        let settings = RateLimitSettings {
            enabled: config.rate_limit.enabled,
            max_requests_per_minute: config.rate_limit.max_requests_per_minute,
        };

        Ok(Self::new(
            settings,
            ApiKeyPolicy::from(&config.api_keys),
            sanitizer,
            QuotaTracker::new(),
        ))
    }

    /// Add an event sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn settings(&self) -> RateLimitSettings {
        self.settings
    }

    fn emit(&self, caller_id: &str, kind: EventKind, outcome: EventOutcome, detail: String) {
        let event = SecurityEvent::new(caller_id, kind, outcome, detail);
        for sink in &self.sinks {
            sink.record(&event);
        }
    }

    /// Validate a ticker symbol on behalf of `caller_id`.
    pub fn validate_ticker(&self, caller_id: &str, input: &str) -> Result<TickerSymbol, GuardError> {
        let result = validate_ticker(input);
        match result {
            Ok(ref symbol) => self.emit(
                caller_id,
                EventKind::TickerValidation,
                EventOutcome::Allowed,
                format!("ticker {} accepted", symbol),
            ),
            Err(ref e) => self.emit(
                caller_id,
                EventKind::TickerValidation,
                EventOutcome::Rejected,
                e.to_string(),
            ),
        }
        result
    }

    /// Validate an API key on behalf of `caller_id`.
    pub fn validate_api_key(
        &self,
        caller_id: &str,
        input: &str,
        provider: &str,
    ) -> Result<ApiKeyCredential, GuardError> {
        let result = validate_api_key(input, provider, &self.key_policy);
        match result {
            Ok(ref key) => self.emit(
                caller_id,
                EventKind::ApiKeyValidation,
                EventOutcome::Allowed,
                format!("{} key {} accepted", key.provider(), key.fingerprint()),
            ),
            Err(ref e) => self.emit(
                caller_id,
                EventKind::ApiKeyValidation,
                EventOutcome::Rejected,
                e.to_string(),
            ),
        }
        result
    }

    /// Check `caller_id`'s quota against `max_per_minute`.
    ///
    /// An allowed request is recorded against the caller's window. A denial
    /// carries the time until the window admits another request; the guard
    /// never waits or queues.
    pub fn check_quota(&self, caller_id: &str, max_per_minute: u32) -> QuotaDecision {
        if !self.settings.enabled {
            debug!("Rate limiting disabled, allowing {}", caller_id);
            return QuotaDecision::Allowed;
        }

        let decision = self.quota.check(caller_id, max_per_minute);
        match decision {
            QuotaDecision::Allowed => self.emit(
                caller_id,
                EventKind::QuotaCheck,
                EventOutcome::Allowed,
                format!(
                    "{}/{} requests in window",
                    self.quota.recent_requests(caller_id),
                    max_per_minute
                ),
            ),
            QuotaDecision::Denied { .. } => self.emit(
                caller_id,
                EventKind::QuotaCheck,
                EventOutcome::Denied,
                format!(
                    "limit of {} per minute reached, retry in {}s",
                    max_per_minute,
                    decision.retry_after_secs().unwrap_or_default()
                ),
            ),
        }
        decision
    }

    /// [`check_quota`](Self::check_quota) with the configured limit.
    pub fn check_default_quota(&self, caller_id: &str) -> QuotaDecision {
        self.check_quota(caller_id, self.settings.max_requests_per_minute)
    }

    /// Run `call` only if the caller's quota admits it.
    pub fn guarded<T, F>(&self, caller_id: &str, call: F) -> Result<T, GuardError>
    where
        F: FnOnce() -> T,
    {
        let decision = self.check_default_quota(caller_id);
        if decision.is_allowed() {
            return Ok(call());
        }

        Err(GuardError::QuotaExceeded {
            caller_id: caller_id.to_string(),
            retry_after_secs: decision.retry_after_secs().unwrap_or_default(),
        })
    }

    /// Sanitize text before it is embedded in a prompt.
    pub fn sanitize_text(&self, caller_id: &str, input: &str) -> String {
        let sanitized = self.sanitizer.sanitize(input);
        if sanitized != input {
            self.emit(
                caller_id,
                EventKind::InputSanitized,
                EventOutcome::Allowed,
                format!(
                    "removed {} characters from prompt text",
                    input.chars().count().saturating_sub(sanitized.chars().count())
                ),
            );
        }
        sanitized
    }
}
