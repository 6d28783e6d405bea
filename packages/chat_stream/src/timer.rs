//! Per-turn elapsed-time clock, latched at the first inbound fragment.

use std::time::Duration;

use tokio::time::Instant;

/// Default recompute cadence while a turn is receiving.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default, Clone)]
pub struct TurnTimer {
    started_at: Option<Instant>,
    elapsed: Duration,
    running: bool,
}

impl TurnTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the start time. Only the first call of a turn has any effect.
    pub fn start(&mut self, now: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
            self.running = true;
        }
    }

    /// Resume ticking from the original start time after a stop.
    pub fn resume(&mut self) {
        if self.started_at.is_some() {
            self.running = true;
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if self.running {
            self.recompute(now);
        }
    }

    /// Final recompute; the value after this is the turn's duration.
    pub fn stop(&mut self, now: Instant) {
        if self.running {
            self.recompute(now);
            self.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    fn recompute(&mut self, now: Instant) {
        if let Some(start) = self.started_at {
            // never decreases, even if ticks arrive out of order
            self.elapsed = self.elapsed.max(now.saturating_duration_since(start));
        }
    }
}
