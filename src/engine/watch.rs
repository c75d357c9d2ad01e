//! Location watch subscription state.
//!
//! Models the single allowed watch subscription: idempotent start, explicit
//! stop, and the one-shot timeout guarding the very first fix. The engine
//! task owns the actual timer and asks `timeout_deadline` when to wake up.

use embassy_time::Instant;

use super::types::FIRST_FIX_TIMEOUT;

#[derive(Debug, Default)]
pub struct LocationWatch {
    active: bool,
    first_fix_deadline: Option<Instant>,
}

impl LocationWatch {
    pub fn new() -> Self {
        LocationWatch::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start the subscription. Returns false (and changes nothing) when a
    /// watch is already active.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.first_fix_deadline = Some(now + FIRST_FIX_TIMEOUT);
        true
    }

    /// Stop the subscription and cancel a still-pending first-fix timeout.
    /// Per-building confirmation timers are independent resources and are
    /// not touched here. Idempotent.
    pub fn stop(&mut self) {
        self.active = false;
        self.first_fix_deadline = None;
    }

    /// A fix arrived: the first-fix guard is satisfied.
    pub fn note_fix(&mut self) {
        self.first_fix_deadline = None;
    }

    /// Deadline of the pending first-fix timeout, if any.
    pub fn timeout_deadline(&self) -> Option<Instant> {
        self.first_fix_deadline
    }

    /// One-shot check: true exactly once when the first-fix window has
    /// elapsed without a fix. The watch itself keeps running.
    pub fn take_timeout(&mut self, now: Instant) -> bool {
        match self.first_fix_deadline {
            Some(deadline) if deadline <= now => {
                self.first_fix_deadline = None;
                true
            }
            _ => false,
        }
    }
}
