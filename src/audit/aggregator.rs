//! Security event aggregation and statistics.
//!
//! This module provides utilities for summarizing the events a guard run
//! produced, for the report.

use crate::models::{EventKind, EventOutcome, SecurityEvent};
use std::collections::HashMap;

/// Group events by caller identity.
pub fn group_by_caller(events: &[SecurityEvent]) -> HashMap<String, Vec<SecurityEvent>> {
    let mut grouped: HashMap<String, Vec<SecurityEvent>> = HashMap::new();

    for event in events {
        grouped
            .entry(event.caller_id.clone())
            .or_default()
            .push(event.clone());
    }

    grouped
}

/// Fraction of quota checks that were denied, `0.0` when none were made.
pub fn denial_rate(events: &[SecurityEvent]) -> f64 {
    let quota_checks: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::QuotaCheck)
        .collect();

    if quota_checks.is_empty() {
        return 0.0;
    }

    let denied = quota_checks
        .iter()
        .filter(|e| e.outcome == EventOutcome::Denied)
        .count();

    denied as f64 / quota_checks.len() as f64
}

/// Callers with the most quota denials, most denied first.
pub fn most_limited_callers(events: &[SecurityEvent], n: usize) -> Vec<(String, usize)> {
    let mut denials: Vec<(String, usize)> = group_by_caller(events)
        .into_iter()
        .map(|(caller, events)| {
            let count = events
                .iter()
                .filter(|e| e.outcome == EventOutcome::Denied)
                .count();
            (caller, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();

    denials.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    denials.truncate(n);

    denials
}

/// Events that did not end in `Allowed`, oldest first.
pub fn rejections(events: &[SecurityEvent]) -> Vec<&SecurityEvent> {
    events
        .iter()
        .filter(|e| e.outcome != EventOutcome::Allowed)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(caller: &str, kind: EventKind, outcome: EventOutcome) -> SecurityEvent {
        SecurityEvent::new(caller, kind, outcome, "test")
    }

    #[test]
    fn test_group_by_caller() {
        let events = vec![
            event("alice", EventKind::QuotaCheck, EventOutcome::Allowed),
            event("bob", EventKind::QuotaCheck, EventOutcome::Allowed),
            event("alice", EventKind::TickerValidation, EventOutcome::Rejected),
        ];

        let grouped = group_by_caller(&events);
        assert_eq!(grouped.get("alice").map(|v| v.len()), Some(2));
        assert_eq!(grouped.get("bob").map(|v| v.len()), Some(1));
    }

    #[test]
    fn test_denial_rate() {
        assert_eq!(denial_rate(&[]), 0.0);

        let events = vec![
            event("a", EventKind::QuotaCheck, EventOutcome::Allowed),
            event("a", EventKind::QuotaCheck, EventOutcome::Allowed),
            event("a", EventKind::QuotaCheck, EventOutcome::Allowed),
            event("a", EventKind::QuotaCheck, EventOutcome::Denied),
            // Not a quota check, ignored
            event("a", EventKind::TickerValidation, EventOutcome::Rejected),
        ];
        assert!((denial_rate(&events) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_most_limited_callers() {
        let events = vec![
            event("alice", EventKind::QuotaCheck, EventOutcome::Denied),
            event("bob", EventKind::QuotaCheck, EventOutcome::Denied),
            event("bob", EventKind::QuotaCheck, EventOutcome::Denied),
            event("carol", EventKind::QuotaCheck, EventOutcome::Allowed),
        ];

        let limited = most_limited_callers(&events, 5);
        assert_eq!(
            limited,
            vec![("bob".to_string(), 2), ("alice".to_string(), 1)]
        );
        assert_eq!(most_limited_callers(&events, 1).len(), 1);
    }

    #[test]
    fn test_rejections() {
        let events = vec![
            event("a", EventKind::ApiKeyValidation, EventOutcome::Allowed),
            event("a", EventKind::TickerValidation, EventOutcome::Rejected),
            event("a", EventKind::QuotaCheck, EventOutcome::Denied),
        ];

        let rejected = rejections(&events);
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].kind, EventKind::TickerValidation);
    }
}
