use std::time::Duration;
use tokio::time::Instant;

/// Staleness detector for a locked session.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    last_healthy: Instant,
    stale_after: Duration,
}

impl Watchdog {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            last_healthy: Instant::now(),
            stale_after,
        }
    }

    /// Record evidence that the session is healthy (or restart the grace
    /// period after a degrade).
    pub fn mark_healthy(&mut self, now: Instant) {
        self.last_healthy = now;
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_healthy) > self.stale_after
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn goes_stale_only_after_threshold() {
        let mut w = Watchdog::new(Duration::from_secs(60));
        let t0 = Instant::now();
        w.mark_healthy(t0);
        assert!(!w.is_stale(t0 + Duration::from_secs(60)));
        assert!(w.is_stale(t0 + Duration::from_secs(61)));
        w.mark_healthy(t0 + Duration::from_secs(61));
        assert!(!w.is_stale(t0 + Duration::from_secs(90)));
    }
}
