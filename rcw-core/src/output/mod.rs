//! Physical key output.
//!
//! The transmitter's key input is wired to one modem-control line of a
//! serial port. [`KeyOutput`] is the seam between the keying engine and
//! that hardware; [`SerialOutput`] is the real implementation.
//!
//! ## Line levels
//!
//! ```text
//!               key up      key down
//! normal        high        low
//! inverted      low         high
//! ```
//!
//! Inversion is applied by the engine before [`KeyOutput::set_line`] is
//! called, so implementations only ever see the final level.

mod serial;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::KeyerError;

pub use serial::{SERIAL_BAUD_RATE, SerialOutput};

// ── LineSelect ───────────────────────────────────────────────────

/// Which modem-control line keys the transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSelect {
    /// Request To Send.
    #[default]
    Rts,
    /// Data Terminal Ready.
    Dtr,
}

impl fmt::Display for LineSelect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineSelect::Rts => write!(f, "RTS"),
            LineSelect::Dtr => write!(f, "DTR"),
        }
    }
}

/// Electrical level for a key position.
pub fn line_level(key_down: bool, inverted: bool) -> bool {
    key_down == inverted
}

// ── KeyOutput ────────────────────────────────────────────────────

/// A device that can drive the key line.
pub trait KeyOutput: Send {
    /// Drive `line` to `level`.
    fn set_line(&mut self, line: LineSelect, level: bool) -> Result<(), KeyerError>;

    /// Human-readable device name for logs.
    fn name(&self) -> &str;
}
