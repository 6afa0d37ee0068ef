use std::time::Duration;

use tokio::time::Instant;

/// Keepalive timer for a bus connection.
///
/// Pub/sub clients can stop delivering on a dead connection without raising
/// anything, so the receive loop asks this monitor whether a PING is due.
/// Plain timestamp arithmetic, no timer task of its own.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    interval: Duration,
    timeout: Duration,
    last_probe: Instant,
}

impl HealthMonitor {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            timeout: Self::DEFAULT_TIMEOUT,
            last_probe: now,
        }
    }

    /// Deadline for a single probe. A probe still pending at the deadline has failed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `true` once `interval` has fully elapsed since the last probe.
    pub fn should_probe(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_probe) >= self.interval
    }

    pub fn record_probe(&mut self, now: Instant) {
        self.last_probe = now;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn last_probe(&self) -> Instant {
        self.last_probe
    }
}
