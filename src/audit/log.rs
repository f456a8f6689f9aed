//! Event sinks.

use crate::models::{EventOutcome, SecurityEvent};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Receives security events from the guard.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &SecurityEvent);
}

/// Emits each event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &SecurityEvent) {
        match event.outcome {
            EventOutcome::Allowed => info!(
                caller_id = %event.caller_id,
                kind = %event.kind,
                outcome = %event.outcome,
                "Security event: {}",
                event.detail
            ),
            EventOutcome::Rejected | EventOutcome::Denied => warn!(
                caller_id = %event.caller_id,
                kind = %event.kind,
                outcome = %event.outcome,
                "Security event: {}",
                event.detail
            ),
        }
    }
}

/// Shared in-memory event list, used to build the run report.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event recorded so far.
    pub fn snapshot(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl EventSink for EventLog {
    fn record(&self, event: &SecurityEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
