//! Turn state machine.
//!
//! ```text
//!            submit            fragment            settle
//!   Idle ───────────▶ Sending ──────────▶ Receiving ───────▶ Settled
//!    ▲                                    │    ▲                 │
//!    │                                    └────┘ fragment        │
//!    └──────────────────────── reset ◀───────────────────────────┘
//! ```
//!
//! The transport has no end-of-turn frame, so `Settle` always comes from the
//! consumer. Nothing moves a turn out of `Sending` except a fragment, a settle
//! or a reset.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::accumulator::ResponseAccumulator;
use crate::timer::TurnTimer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    #[default]
    Idle,
    Sending,
    Receiving,
    Settled,
}

impl TurnPhase {
    /// Input and spinner affordances key off this.
    pub fn is_loading(&self) -> bool {
        matches!(self, TurnPhase::Sending | TurnPhase::Receiving)
    }

    pub fn next(self, event: TurnEvent) -> Result<TurnPhase, TransitionError> {
        use TurnEvent::*;
        use TurnPhase::*;

        match (self, event) {
            (_, Submit) => Ok(Sending),
            (_, Fragment) => Ok(Receiving),
            (Sending | Receiving, Settle) => Ok(Settled),
            (Idle | Settled, Settle) => Err(TransitionError { from: self, event }),
            (_, Reset) => Ok(Idle),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnEvent {
    Submit,
    Fragment,
    Settle,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no transition from {from:?} on {event:?}")]
pub struct TransitionError {
    pub from: TurnPhase,
    pub event: TurnEvent,
}

/// One request/response exchange: phase, reply buffer and timer together.
#[derive(Debug, Default, Clone)]
pub struct Turn {
    id: Option<Uuid>,
    phase: TurnPhase,
    reply: ResponseAccumulator,
    timer: TurnTimer,
}

impl Turn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new turn, superseding whatever was in flight.
    pub fn begin(&mut self) -> Uuid {
        let id = Uuid::now_v7();
        *self = Turn {
            id: Some(id),
            phase: TurnPhase::Idle.next_infallible(TurnEvent::Submit),
            ..Turn::default()
        };
        id
    }

    /// Apply one inbound fragment (already normalized to a delta).
    pub fn on_fragment(&mut self, delta: &str, now: Instant) {
        let previous = self.phase;
        self.phase = previous.next_infallible(TurnEvent::Fragment);

        match previous {
            TurnPhase::Idle => {
                // unsolicited reply, e.g. the remainder of a turn abandoned by reset
                self.id.get_or_insert_with(Uuid::now_v7);
                self.timer.start(now);
            }
            TurnPhase::Sending => self.timer.start(now),
            TurnPhase::Settled => self.timer.resume(),
            TurnPhase::Receiving => {}
        }

        self.reply.push(delta);
        self.timer.tick(now);

        if previous != self.phase {
            debug!(turn_id = ?self.id, from = ?previous, to = ?self.phase, "turn phase changed");
        }
    }

    pub fn settle(&mut self, now: Instant) -> Result<(), TransitionError> {
        self.phase = self.phase.next(TurnEvent::Settle)?;
        self.timer.stop(now);
        debug!(
            turn_id = ?self.id,
            elapsed_secs = self.timer.elapsed_seconds(),
            fragments = self.reply.fragment_count(),
            "turn settled"
        );
        Ok(())
    }

    pub fn tick(&mut self, now: Instant) {
        self.timer.tick(now);
    }

    /// Clear reply, timer and phase in one step.
    pub fn reset(&mut self) {
        *self = Turn::default();
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn reply(&self) -> &str {
        self.reply.as_str()
    }

    pub fn is_timing(&self) -> bool {
        self.timer.is_running()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.timer.elapsed_seconds()
    }
}

impl TurnPhase {
    fn next_infallible(self, event: TurnEvent) -> TurnPhase {
        // only Settle can fail
        debug_assert_ne!(event, TurnEvent::Settle);
        self.next(event).unwrap_or(self)
    }
}
