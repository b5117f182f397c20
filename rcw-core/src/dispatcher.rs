//! Real-time dispatcher.
//!
//! Called once per millisecond tick. Each call sweeps every millisecond
//! elapsed since the previous call, so a tick that arrives late (the
//! event loop was busy with a socket, the OS preempted us) still fires
//! every due action exactly once and in timestamp order.
//!
//! ```text
//!                 Down due / inject(Down)
//!        ┌──────┐ ───────────────────────► ┌───────────┐
//!        │ Idle │                          │ KeyedDown │
//!        └──────┘ ◄─────────────────────── └───────────┘
//!                 Up due / inject(Up) /
//!                 held > SAFETY_TIMEOUT_MS
//! ```

use tracing::{trace, warn};

use crate::keyer::{KeySettings, KeyState};
use crate::schedule::{Action, SCHEDULE_SLOTS, ScheduleBuffer};

/// Longest time the key may stay down without a fresh key-down.
pub const SAFETY_TIMEOUT_MS: u32 = 5_000;

/// Differences above this are read as "now is behind the cursor".
const BACKWARDS_THRESHOLD: u32 = u32::MAX / 2;

/// An action executed by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    /// Millisecond slot the action was scheduled for.
    pub at: u32,
    pub action: Action,
}

// ── Dispatcher ───────────────────────────────────────────────────

#[derive(Debug)]
pub struct Dispatcher {
    /// Last millisecond already swept. `None` until the first tick.
    cursor: Option<u32>,
    key: KeyState,
}

impl Dispatcher {
    pub fn new(settings: KeySettings) -> Self {
        Self {
            cursor: None,
            key: KeyState::new(settings),
        }
    }

    pub fn cursor(&self) -> Option<u32> {
        self.cursor
    }

    pub fn key(&self) -> &KeyState {
        &self.key
    }

    pub(crate) fn key_mut(&mut self) -> &mut KeyState {
        &mut self.key
    }

    /// Run the safety timeout, then execute everything due up to `now`.
    pub fn tick(&mut self, now: u32, schedule: &mut ScheduleBuffer) -> Vec<Fired> {
        self.enforce_timeout(now);

        let start = match self.cursor {
            Some(cursor) => cursor.wrapping_add(1),
            None => now,
        };
        let gap = now.wrapping_sub(start);
        if gap > BACKWARDS_THRESHOLD {
            return Vec::new();
        }

        // One pass over the ring visits every slot; anything past that
        // would only find slots this sweep has already emptied.
        let steps = gap.min(SCHEDULE_SLOTS as u32 - 1);
        let mut fired = Vec::new();
        for offset in 0..=steps {
            let ms = start.wrapping_add(offset);
            if let Some(action) = schedule.take_if_due(ms) {
                trace!("slot {ms}: {action:?}");
                self.execute(action, now);
                fired.push(Fired { at: ms, action });
            }
        }
        self.cursor = Some(now);
        fired
    }

    /// Execute `action` immediately, bypassing the schedule.
    pub fn inject(&mut self, action: Action, now: u32) {
        self.execute(action, now);
    }

    /// Release the key regardless of state.
    pub fn force_key_up(&mut self) {
        self.key.release();
    }

    fn execute(&mut self, action: Action, now: u32) {
        match action {
            Action::Down => self.key.press(now),
            Action::Up => self.key.release(),
        }
    }

    fn enforce_timeout(&mut self, now: u32) {
        let Some(since) = self.key.down_since() else {
            return;
        };
        let held = now.wrapping_sub(since);
        if held > SAFETY_TIMEOUT_MS && held <= BACKWARDS_THRESHOLD {
            warn!("key held for {held} ms without release, forcing key up");
            self.key.release();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
