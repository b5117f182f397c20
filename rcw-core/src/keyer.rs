//! Key state and the physical line it drives.

use tracing::{debug, info, warn};

use crate::output::{KeyOutput, LineSelect, line_level};

// ── KeyLevel ─────────────────────────────────────────────────────

/// Logical key position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyLevel {
    #[default]
    Up,
    Down,
}

impl KeyLevel {
    pub fn is_down(&self) -> bool {
        matches!(self, KeyLevel::Down)
    }
}

/// How the key line is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeySettings {
    pub line: LineSelect,
    pub inverted: bool,
}

// ── KeyState ─────────────────────────────────────────────────────

/// Current key position plus the output it is mirrored to.
///
/// Without an attached output every transition is still tracked, so the
/// safety timeout keeps working while the serial port is closed.
pub struct KeyState {
    level: KeyLevel,
    down_since: Option<u32>,
    settings: KeySettings,
    output: Option<Box<dyn KeyOutput>>,
}

impl KeyState {
    pub fn new(settings: KeySettings) -> Self {
        Self {
            level: KeyLevel::Up,
            down_since: None,
            settings,
            output: None,
        }
    }

    pub fn level(&self) -> KeyLevel {
        self.level
    }

    /// Millisecond of the last executed key-down, while the key is down.
    pub fn down_since(&self) -> Option<u32> {
        self.down_since
    }

    pub fn settings(&self) -> KeySettings {
        self.settings
    }

    /// Whether a physical output is attached.
    pub fn is_port_open(&self) -> bool {
        self.output.is_some()
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output.as_deref().map(|o| o.name())
    }

    // ── Transitions ──────────────────────────────────────────────

    pub(crate) fn press(&mut self, now: u32) {
        self.level = KeyLevel::Down;
        self.down_since = Some(now);
        self.drive();
    }

    pub(crate) fn release(&mut self) {
        self.level = KeyLevel::Up;
        self.down_since = None;
        self.drive();
    }

    // ── Configuration ────────────────────────────────────────────

    /// Attach an output and drive it to the key-up level.
    pub(crate) fn attach(&mut self, output: Box<dyn KeyOutput>) {
        info!("key output {} attached ({})", output.name(), self.settings.line);
        self.output = Some(output);
        self.release();
    }

    pub(crate) fn detach(&mut self) -> Option<Box<dyn KeyOutput>> {
        let output = self.output.take();
        if let Some(o) = &output {
            info!("key output {} detached", o.name());
        }
        output
    }

    /// Apply new wiring settings and release the key.
    ///
    /// When switching lines the previously used line is parked at its
    /// key-up level first, so it cannot be left keying the radio.
    pub(crate) fn reconfigure(&mut self, settings: KeySettings) {
        if settings.line != self.settings.line {
            self.release();
        }
        self.settings = settings;
        self.release();
    }

    fn drive(&mut self) {
        let KeySettings { line, inverted } = self.settings;
        let level = line_level(self.level.is_down(), inverted);
        let Some(output) = self.output.as_mut() else {
            return;
        };
        debug!("{line} -> {} ({:?})", if level { "high" } else { "low" }, self.level);
        if let Err(e) = output.set_line(line, level) {
            warn!("cannot drive {line} on {}: {e}", output.name());
        }
    }
}

impl std::fmt::Debug for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyState")
            .field("level", &self.level)
            .field("down_since", &self.down_since)
            .field("settings", &self.settings)
            .field("output", &self.output_name())
            .finish()
    }
}
