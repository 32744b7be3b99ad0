//! Progress throttling
//!
//! Strategies may report progress far more often than anyone can render it
//! (the simple strategy reports every 64 KiB slice). [`ProgressThrottle`]
//! lets through at most one value per interval and keeps the latest
//! suppressed value so it can be flushed later.

use std::time::Duration;

use tokio::time::Instant;

/// Coalesces progress values of one transfer
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: Option<u64>,
}

impl ProgressThrottle {
    /// Creates a throttle emitting at most once per `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: None,
        }
    }

    /// Offers a value observed at `now`
    ///
    /// Returns the value if it should be published right away; otherwise it
    /// is kept as pending, replacing any older pending value.
    pub fn offer(&mut self, value: u64, now: Instant) -> Option<u64> {
        let due = match self.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last_emit = Some(now);
            self.pending = None;
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// When the pending value becomes due, if there is one
    pub fn deadline(&self) -> Option<Instant> {
        match (self.pending, self.last_emit) {
            (Some(_), Some(last)) => Some(last + self.interval),
            _ => None,
        }
    }

    /// Takes the pending value, marking it emitted at `now`
    pub fn flush(&mut self, now: Instant) -> Option<u64> {
        let value = self.pending.take()?;
        self.last_emit = Some(now);
        Some(value)
    }

    /// Drops the pending value
    pub fn discard(&mut self) {
        self.pending = None;
    }
}
