//! Data models for the request guard.
//!
//! This module contains the validated value types handed to downstream
//! callers, the security event record, and the structures the report
//! is built from.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// A validated, uppercase ticker symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TickerSymbol(String);

impl TickerSymbol {
    /// Wraps an already-validated symbol. Use the guard to construct one.
    pub(crate) fn new_unchecked(symbol: String) -> Self {
        Self(symbol)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TickerSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TickerSymbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// An API key that passed its provider's format policy.
///
/// The secret is never printed; `Debug` and logs use [`fingerprint`].
///
/// [`fingerprint`]: ApiKeyCredential::fingerprint
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyCredential {
    provider: String,
    secret: String,
}

impl ApiKeyCredential {
    pub(crate) fn new(provider: &str, secret: &str) -> Self {
        Self {
            provider: provider.to_string(),
            secret: secret.to_string(),
        }
    }

    /// Provider the key belongs to (e.g. `openai`).
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// The raw key, for the outbound request only.
    #[allow(dead_code)] // Handed to the outbound HTTP layer, which lives outside this crate
    pub fn expose_secret(&self) -> &str {
        &self.secret
    }

    /// Short SHA-256 fingerprint safe to log.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.secret)
    }
}

impl fmt::Debug for ApiKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyCredential")
            .field("provider", &self.provider)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Hash sensitive data down to 16 hex characters for logging.
pub fn fingerprint(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(16);
    hex
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// The request may proceed; it has been recorded against the window.
    Allowed,
    /// The window is full; the oldest entry expires after `retry_after`.
    Denied { retry_after: Duration },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }

    /// Retry-after hint in whole seconds, rounded up. `None` when allowed.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            QuotaDecision::Allowed => None,
            QuotaDecision::Denied { retry_after } => Some(ceil_secs(*retry_after)),
        }
    }
}

/// Round a duration up to whole seconds, never below one.
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

/// What a security event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TickerValidation,
    ApiKeyValidation,
    QuotaCheck,
    InputSanitized,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::TickerValidation => write!(f, "ticker_validation"),
            EventKind::ApiKeyValidation => write!(f, "api_key_validation"),
            EventKind::QuotaCheck => write!(f, "quota_check"),
            EventKind::InputSanitized => write!(f, "input_sanitized"),
        }
    }
}

/// How a guarded operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Allowed,
    Rejected,
    Denied,
}

impl EventOutcome {
    /// Returns an emoji representation of the outcome.
    pub fn emoji(&self) -> &'static str {
        match self {
            EventOutcome::Allowed => "✅",
            EventOutcome::Rejected => "❌",
            EventOutcome::Denied => "⛔",
        }
    }
}

impl fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventOutcome::Allowed => write!(f, "allowed"),
            EventOutcome::Rejected => write!(f, "rejected"),
            EventOutcome::Denied => write!(f, "denied"),
        }
    }
}

/// A single security event emitted by the guard.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub caller_id: String,
    pub kind: EventKind,
    pub outcome: EventOutcome,
    /// Human-readable detail. Never contains secrets.
    pub detail: String,
}

impl SecurityEvent {
    pub fn new(
        caller_id: &str,
        kind: EventKind,
        outcome: EventOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            caller_id: caller_id.to_string(),
            kind,
            outcome,
            detail: detail.into(),
        }
    }
}

/// Counts of security events.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventSummary {
    pub total: usize,
    pub allowed: usize,
    pub rejected: usize,
    pub denied: usize,
    pub by_kind: HashMap<String, usize>,
}

impl EventSummary {
    /// Creates a summary from a list of events.
    pub fn from_events(events: &[SecurityEvent]) -> Self {
        let mut summary = Self {
            total: events.len(),
            ..Self::default()
        };

        for event in events {
            match event.outcome {
                EventOutcome::Allowed => summary.allowed += 1,
                EventOutcome::Rejected => summary.rejected += 1,
                EventOutcome::Denied => summary.denied += 1,
            }

            *summary.by_kind.entry(event.kind.to_string()).or_insert(0) += 1;
        }

        summary
    }
}

/// One quota check made on behalf of a ticker.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    /// 1-indexed request number for the ticker.
    pub attempt: usize,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Whether the caller waited out a denial before this decision.
    pub waited: bool,
}

/// Result of running one ticker through the guard.
#[derive(Debug, Clone, Serialize)]
pub struct TickerCheck {
    /// The ticker as supplied by the user.
    pub input: String,
    /// Normalized symbol, present when validation passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<TickerSymbol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub requests: Vec<RequestOutcome>,
}

impl TickerCheck {
    /// True when the ticker validated and every request was admitted.
    pub fn passed(&self) -> bool {
        self.symbol.is_some() && self.requests.iter().all(|r| r.allowed)
    }

    pub fn denied_count(&self) -> usize {
        self.requests.iter().filter(|r| !r.allowed).count()
    }
}

/// Result of validating the configured API key.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyCheck {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiKeyCheck {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Metadata about a guard run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub caller_id: String,
    pub run_date: DateTime<Utc>,
    pub rate_limiting_enabled: bool,
    pub max_requests_per_minute: u32,
    /// Informational only; the guard does not enforce it.
    pub max_tokens_per_request: u32,
    pub tickers_checked: usize,
    pub duration_seconds: f64,
}

/// The complete report of a guard run.
#[derive(Debug, Clone, Serialize)]
pub struct GuardReport {
    pub metadata: ReportMetadata,
    pub api_key: ApiKeyCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized_prompt: Option<String>,
    pub checks: Vec<TickerCheck>,
    pub summary: EventSummary,
    pub events: Vec<SecurityEvent>,
}

impl GuardReport {
    /// True when the key, a ticker, or a quota check was rejected.
    pub fn has_rejections(&self) -> bool {
        !self.api_key.is_valid() || self.checks.iter().any(|c| !c.passed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, outcome: EventOutcome) -> SecurityEvent {
        SecurityEvent::new("cli", kind, outcome, "test")
    }

    #[test]
    fn test_credential_debug_hides_secret() {
        let key = ApiKeyCredential::new("openai", "sk-supersecretvalue1234567890");
        let debug = format!("{:?}", key);
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("openai"));
        assert!(debug.contains(&key.fingerprint()));
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = fingerprint("abc");
        assert_eq!(a.len(), 16);
        assert_eq!(a, fingerprint("abc"));
        assert_ne!(a, fingerprint("abd"));
        // sha256("abc") begins with ba7816bf8f01cfea
        assert_eq!(a, "ba7816bf8f01cfea");
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let denied = QuotaDecision::Denied {
            retry_after: Duration::from_millis(59_001),
        };
        assert_eq!(denied.retry_after_secs(), Some(60));

        let tiny = QuotaDecision::Denied {
            retry_after: Duration::from_millis(1),
        };
        assert_eq!(tiny.retry_after_secs(), Some(1));

        assert_eq!(QuotaDecision::Allowed.retry_after_secs(), None);
        assert!(QuotaDecision::Allowed.is_allowed());
    }

    #[test]
    fn test_event_summary() {
        let events = vec![
            event(EventKind::QuotaCheck, EventOutcome::Allowed),
            event(EventKind::QuotaCheck, EventOutcome::Denied),
            event(EventKind::TickerValidation, EventOutcome::Rejected),
            event(EventKind::TickerValidation, EventOutcome::Allowed),
        ];

        let summary = EventSummary::from_events(&events);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.allowed, 2);
        assert_eq!(summary.denied, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.by_kind.get("quota_check"), Some(&2));
        assert_eq!(summary.by_kind.get("ticker_validation"), Some(&2));
    }

    #[test]
    fn test_ticker_check_passed() {
        let mut check = TickerCheck {
            input: "aapl".to_string(),
            symbol: Some(TickerSymbol::new_unchecked("AAPL".to_string())),
            error: None,
            requests: vec![RequestOutcome {
                attempt: 1,
                allowed: true,
                retry_after_secs: None,
                waited: false,
            }],
        };
        assert!(check.passed());

        check.requests.push(RequestOutcome {
            attempt: 2,
            allowed: false,
            retry_after_secs: Some(42),
            waited: false,
        });
        assert!(!check.passed());
        assert_eq!(check.denied_count(), 1);
    }

    #[test]
    fn test_ticker_symbol_serializes_as_string() {
        let symbol = TickerSymbol::new_unchecked("BRK.B".to_string());
        assert_eq!(serde_json::to_string(&symbol).unwrap(), "\"BRK.B\"");
    }
}
