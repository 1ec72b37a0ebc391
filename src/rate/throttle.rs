//! Leading-edge throttle.
//!
//! A [`Throttle`] runs its action on the first call and then drops every
//! call until the suppression window has elapsed. Dropped calls are not
//! queued and nothing is reported back to the caller.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::clock::{Clock, TokioClock};

type Action<T> = Box<dyn Fn(T) + Send + Sync>;

/// Rate limiter allowing at most one execution per interval.
///
/// One instance must be shared by every caller that should be limited
/// together; two throttles over the same action limit independently.
pub struct Throttle<T, C: Clock = TokioClock> {
    action: Action<T>,
    interval: Duration,
    clock: C,
    /// End of the current suppression window, `None` when idle
    suppressed_until: Mutex<Option<Instant>>,
}

/// Wrap `action` so it runs at most once per `interval`.
pub fn throttle<T, F>(action: F, interval: Duration) -> Throttle<T>
where
    F: Fn(T) + Send + Sync + 'static,
{
    Throttle::new(interval, action)
}

impl<T> Throttle<T> {
    /// Create a throttle driven by the Tokio clock.
    pub fn new<F>(interval: Duration, action: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::with_clock(interval, TokioClock, action)
    }
}

impl<T, C: Clock> Throttle<T, C> {
    /// Create a throttle reading time from `clock`.
    pub fn with_clock<F>(interval: Duration, clock: C, action: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            action: Box::new(action),
            interval,
            clock,
            suppressed_until: Mutex::new(None),
        }
    }

    /// Run the action now unless a window is open.
    ///
    /// Returns `true` when the action ran and `false` when the call was
    /// dropped. With a zero interval every call runs.
    pub fn invoke(&self, args: T) -> bool {
        let now = self.clock.now();
        {
            let mut until = self
                .suppressed_until
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if matches!(*until, Some(end) if now < end) {
                return false;
            }
            *until = Some(now + self.interval);
        }

        (self.action)(args);
        true
    }

    /// Whether a call made now would be dropped.
    pub fn is_suppressed(&self) -> bool {
        let now = self.clock.now();
        let until = self
            .suppressed_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        matches!(*until, Some(end) if now < end)
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<T, C: Clock> fmt::Debug for Throttle<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("interval", &self.interval)
            .field("suppressed", &self.is_suppressed())
            .finish()
    }
}
