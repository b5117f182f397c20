//! Request types of the keying protocol.
//!
//! Tags are matched exactly (case-sensitive). Anything that is not one
//! of the four known tags maps to [`CommandKind::Unknown`] rather than
//! an error, because the protocol answers unknown tags in-band.

use std::fmt;

use bytes::Bytes;

use crate::schedule::Action;

// ── CommandKind ──────────────────────────────────────────────────

/// All request tags understood by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `KD`: press the key at the target time.
    KeyDown,
    /// `KU`: release the key at the target time.
    KeyUp,
    /// `P`: latency probe, answered with `PP`.
    Ping,
    /// `CC`: connection check, answered with the bare timing fields.
    ConnectionCheck,
    /// Any other tag.
    Unknown,
}

impl CommandKind {
    /// Map a wire tag to its kind.
    pub fn from_tag(tag: &[u8]) -> Self {
        match tag {
            b"KD" => CommandKind::KeyDown,
            b"KU" => CommandKind::KeyUp,
            b"P" => CommandKind::Ping,
            b"CC" => CommandKind::ConnectionCheck,
            _ => CommandKind::Unknown,
        }
    }

    /// Text written in front of the timing fields of the acknowledgement.
    ///
    /// `Unknown` additionally appends the raw request bytes after this
    /// prefix; see [`crate::codec::encode_ack`].
    pub fn ack_prefix(&self) -> &'static str {
        match self {
            CommandKind::KeyDown => "KD ",
            CommandKind::KeyUp => "KU ",
            CommandKind::Ping => "PP ",
            CommandKind::ConnectionCheck => "",
            CommandKind::Unknown => "Unknown subcommand received: ",
        }
    }

    /// The scheduled action carried by this kind, if any.
    pub fn action(&self) -> Option<Action> {
        match self {
            CommandKind::KeyDown => Some(Action::Down),
            CommandKind::KeyUp => Some(Action::Up),
            _ => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::KeyDown => write!(f, "KeyDown"),
            CommandKind::KeyUp => write!(f, "KeyUp"),
            CommandKind::Ping => write!(f, "Ping"),
            CommandKind::ConnectionCheck => write!(f, "ConnectionCheck"),
            CommandKind::Unknown => write!(f, "Unknown"),
        }
    }
}

// ── Command ──────────────────────────────────────────────────────

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    origin: u32,
    target: u32,
    raw: Bytes,
}

impl Command {
    pub fn new(kind: CommandKind, origin: u32, target: u32, raw: Bytes) -> Self {
        Self {
            kind,
            origin,
            target,
            raw,
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Client wall-clock timestamp. Opaque to the relay, only echoed.
    pub fn origin(&self) -> u32 {
        self.origin
    }

    /// Millisecond at which the action must execute. Meaningless for
    /// `P` and `CC`, but still echoed.
    pub fn target(&self) -> u32 {
        self.target
    }

    /// The frame exactly as it was received.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} origin={} target={}", self.kind, self.origin, self.target)
    }
}
