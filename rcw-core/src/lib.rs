//! # rcw-core
//!
//! Keying engine for a remote CW (Morse) station: turns timestamped
//! key-down / key-up events from a TCP client into RTS/DTR transitions
//! on a serial port, each at the millisecond the operator intended.
//!
//! This crate contains:
//! - **Protocol**: `Command`, `CommandKind` and the text `KeyerCodec`
//! - **Schedule**: `ScheduleBuffer`, a 1024 ms ring of pending `Action`s
//! - **Dispatcher**: the 1 ms catch-up sweep and the stuck-key timeout
//! - **Output**: the `KeyOutput` seam and the serial-port implementation
//! - **Engine**: `KeyerEngine`, the owned bundle of the three above
//! - **Network**: `KeyerService`, the single-task event loop and session
//! - **Error**: `KeyerError` and `DecodeError`, `thiserror`-based

pub mod clock;
pub mod codec;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod keyer;
pub mod message;
pub mod network;
pub mod output;
pub mod schedule;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Ack, KeyerCodec, decode, encode_ack};
pub use dispatcher::{Dispatcher, Fired, SAFETY_TIMEOUT_MS};
pub use engine::KeyerEngine;
pub use error::{DecodeError, KeyerError};
pub use keyer::{KeyLevel, KeySettings, KeyState};
pub use message::{Command, CommandKind};
pub use network::{
    ControlEvent, DEFAULT_LISTEN_PORT, KeyStatus, KeyerService, ServiceConfig, ServiceHandle,
    Session,
};
pub use output::{KeyOutput, LineSelect, SerialOutput};
pub use schedule::{Action, SCHEDULE_SLOTS, ScheduleBuffer};
