//! Domain-specific error types for the keying relay.
//!
//! Nothing in the core is fatal: every variant here is logged and the
//! service keeps running. Malformed frames never reach this type at
//! all; the codec answers them in-band (see [`DecodeError`]).

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// The canonical error type for the keying relay.
#[derive(Debug, Error)]
pub enum KeyerError {
    // ── Network Errors ───────────────────────────────────────────
    /// The listener could not bind to the requested address.
    #[error("cannot listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Hardware Errors ──────────────────────────────────────────
    /// Opening the serial device or driving one of its control lines
    /// failed.
    #[error("physical I/O error: {0}")]
    PhysicalIo(String),
}

// ── DecodeError ──────────────────────────────────────────────────

/// Failure to scan a request frame as `<TAG> <origin> <target>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer than three tokens, or a timestamp that is not a `u32`.
    ///
    /// The fields that did parse are kept so the in-band reply can echo
    /// them; the rest are `0`.
    #[error("malformed frame: {:?}", String::from_utf8_lossy(.raw))]
    Malformed {
        raw: Bytes,
        origin: u32,
        target: u32,
    },
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for KeyerError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        KeyerError::ChannelClosed
    }
}

impl From<serialport::Error> for KeyerError {
    fn from(e: serialport::Error) -> Self {
        KeyerError::PhysicalIo(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for KeyerError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        KeyerError::Timeout(crate::network::ACK_WRITE_TIMEOUT)
    }
}
