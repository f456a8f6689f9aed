//! Guard error types.
//!
//! Every error here is recoverable by the caller: reject the input, ask
//! for a correction, or wait and retry. Infrastructure failures never
//! surface through this type.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors reported by the request guard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// Ticker symbol did not match the allowed pattern.
    #[error("Invalid ticker symbol '{input}': {reason}")]
    InvalidTickerFormat { input: String, reason: String },

    /// API key failed the provider's format policy.
    #[error("Invalid {provider} API key: {reason}")]
    InvalidApiKeyFormat { provider: String, reason: String },

    /// Caller exhausted its request quota for the current window.
    #[error("Rate limit exceeded for caller '{caller_id}', retry in {retry_after_secs}s")]
    QuotaExceeded {
        caller_id: String,
        retry_after_secs: u64,
    },
}

/// Machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTickerFormat,
    InvalidApiKeyFormat,
    QuotaExceeded,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidTickerFormat => write!(f, "InvalidTickerFormat"),
            ErrorKind::InvalidApiKeyFormat => write!(f, "InvalidApiKeyFormat"),
            ErrorKind::QuotaExceeded => write!(f, "QuotaExceeded"),
        }
    }
}

impl GuardError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GuardError::InvalidTickerFormat { .. } => ErrorKind::InvalidTickerFormat,
            GuardError::InvalidApiKeyFormat { .. } => ErrorKind::InvalidApiKeyFormat,
            GuardError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
        }
    }

    pub(crate) fn ticker(input: &str, reason: impl Into<String>) -> Self {
        GuardError::InvalidTickerFormat {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn api_key(provider: &str, reason: impl Into<String>) -> Self {
        GuardError::InvalidApiKeyFormat {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }
}
