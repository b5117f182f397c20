//! The keying engine: schedule, dispatcher and key state as one owned
//! value.
//!
//! The event loop owns a single `KeyerEngine` and hands `&mut` borrows to
//! the connection handler (which writes the schedule) and to the tick
//! handler (which sweeps it). Because both run on that one loop, the
//! schedule never sees concurrent access.

use tracing::info;

use crate::dispatcher::{Dispatcher, Fired};
use crate::keyer::{KeySettings, KeyState};
use crate::output::{KeyOutput, LineSelect};
use crate::schedule::{Action, ScheduleBuffer};

#[derive(Debug)]
pub struct KeyerEngine {
    schedule: ScheduleBuffer,
    dispatcher: Dispatcher,
}

impl KeyerEngine {
    pub fn new(settings: KeySettings) -> Self {
        Self {
            schedule: ScheduleBuffer::new(),
            dispatcher: Dispatcher::new(settings),
        }
    }

    // ── Scheduling ───────────────────────────────────────────────

    /// Queue `action` for millisecond `target`.
    pub fn schedule(&mut self, target: u32, action: Action) {
        self.schedule.set(target, action);
    }

    /// Advance the dispatcher to `now`.
    pub fn tick(&mut self, now: u32) -> Vec<Fired> {
        self.dispatcher.tick(now, &mut self.schedule)
    }

    /// Execute `action` right away (diagnostics).
    pub fn inject(&mut self, action: Action, now: u32) {
        self.dispatcher.inject(action, now);
    }

    /// Release the key and forget everything pending.
    ///
    /// Used when the client goes away: nothing it queued may fire later.
    pub fn reset(&mut self) {
        self.dispatcher.force_key_up();
        self.schedule.clear();
    }

    // ── Output configuration ─────────────────────────────────────

    /// Attach a physical output. It is driven to key-up immediately.
    pub fn attach_output(&mut self, output: Box<dyn KeyOutput>) {
        self.dispatcher.key_mut().attach(output);
    }

    pub fn detach_output(&mut self) -> Option<Box<dyn KeyOutput>> {
        self.dispatcher.key_mut().detach()
    }

    pub fn set_line(&mut self, line: LineSelect) {
        let settings = KeySettings {
            line,
            ..self.key().settings()
        };
        info!("key line set to {line}");
        self.dispatcher.key_mut().reconfigure(settings);
    }

    pub fn set_inverted(&mut self, inverted: bool) {
        let settings = KeySettings {
            inverted,
            ..self.key().settings()
        };
        info!("key polarity {}", if inverted { "inverted" } else { "normal" });
        self.dispatcher.key_mut().reconfigure(settings);
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn key(&self) -> &KeyState {
        self.dispatcher.key()
    }

    pub fn schedule_buffer(&self) -> &ScheduleBuffer {
        &self.schedule
    }
}

impl Default for KeyerEngine {
    fn default() -> Self {
        Self::new(KeySettings::default())
    }
}
