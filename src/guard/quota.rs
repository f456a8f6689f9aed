//! Sliding-window request quotas.
//!
//! Each caller identity owns a [`RequestWindow`]: a queue of the instants
//! at which its admitted requests were made. Entries older than the window
//! are evicted on every check, so a window never holds more entries than
//! the largest limit it has been checked against.

use crate::models::QuotaDecision;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Length of the trailing window quotas are counted over.
pub const QUOTA_WINDOW: Duration = Duration::from_secs(60);

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Timestamps of admitted requests for one caller.
#[derive(Debug, Default)]
pub struct RequestWindow {
    timestamps: VecDeque<Instant>,
}

impl RequestWindow {
    /// Drop every timestamp at least `window` old.
    fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit a request at `now` if fewer than `max` fall inside the window.
    fn try_admit(&mut self, now: Instant, window: Duration, max: usize) -> QuotaDecision {
        self.evict(now, window);

        let len = self.timestamps.len();
        if len >= max {
            // Enough entries must expire to leave room for one more
            let blocking = if max == 0 {
                None
            } else {
                self.timestamps.get(len - max)
            };
            let retry_after = match blocking {
                Some(&at) => window.saturating_sub(now.saturating_duration_since(at)),
                None => window,
            };
            return QuotaDecision::Denied { retry_after };
        }

        self.timestamps.push_back(now);
        QuotaDecision::Allowed
    }

    fn len(&self) -> usize {
        self.timestamps.len()
    }
}

/// Per-caller sliding-window quota state.
///
/// The caller map is locked only long enough to look up or create a
/// window. Each window has its own lock, so checks for one caller are
/// serialized without blocking other callers.
pub struct QuotaTracker {
    windows: Mutex<HashMap<String, Arc<Mutex<RequestWindow>>>>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaTracker {
    /// Create a tracker on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a tracker on a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            clock,
            window: QUOTA_WINDOW,
        }
    }

    /// Shorten the window (tests only; production quotas are per minute).
    #[cfg(test)]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    fn window_for(&self, caller_id: &str) -> Arc<Mutex<RequestWindow>> {
        let mut windows = lock(&self.windows);
        if let Some(window) = windows.get(caller_id) {
            return Arc::clone(window);
        }

        debug!("Creating request window for caller {}", caller_id);
        let window = Arc::new(Mutex::new(RequestWindow::default()));
        windows.insert(caller_id.to_string(), Arc::clone(&window));
        window
    }

    /// Check and, when allowed, record a request for `caller_id`.
    pub fn check(&self, caller_id: &str, max_per_minute: u32) -> QuotaDecision {
        let window = self.window_for(caller_id);
        let mut window = lock(&window);
        let now = self.clock.now();
        window.try_admit(now, self.window, max_per_minute as usize)
    }

    /// Number of requests recorded for `caller_id` in the current window.
    pub fn recent_requests(&self, caller_id: &str) -> usize {
        let window = match lock(&self.windows).get(caller_id) {
            Some(window) => Arc::clone(window),
            None => return 0,
        };
        let mut window = lock(&window);
        window.evict(self.clock.now(), self.window);
        window.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Manually advanced clock for tests.
#[cfg(test)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *lock(&self.offset)
    }
}
