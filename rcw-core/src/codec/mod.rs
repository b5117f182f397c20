//! Text wire codec.
//!
//! ## Wire format
//!
//! Request, one per TCP read:
//! ```text
//! <TAG> <origin> <target>          TAG ∈ { CC, P, KD, KU }
//! ```
//!
//! Acknowledgement:
//! ```text
//! KD <origin> <sent> <target>
//! KU <origin> <sent> <target>
//! PP <origin> <sent> <target>      (for P)
//! <origin> <sent> <target>         (for CC)
//! Unknown subcommand received: <raw request><origin> <sent> <target>
//! ```
//!
//! There is no frame delimiter: whatever a single read returns is one
//! frame, and anything after the target's digits is ignored. The
//! unknown-tag reply glues the raw request directly onto the timing
//! fields; deployed clients match on that exact text.

use std::fmt::Write as _;

use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::error::{DecodeError, KeyerError};
use crate::message::{Command, CommandKind};

// ── Decoding ─────────────────────────────────────────────────────

/// Scan `raw` as `<TAG> <origin> <target>`.
///
/// The tag is the first whitespace-delimited word. Each timestamp is the
/// run of ASCII digits after optional whitespace; scanning stops at the
/// first other byte, so `KD 1 100KU 2 200` reads as `KD 1 100`.
pub fn decode(raw: Bytes) -> Result<Command, DecodeError> {
    let mut rest: &[u8] = &raw;

    let kind = next_word(&mut rest).map(CommandKind::from_tag);
    let origin = kind.and_then(|_| next_u32(&mut rest));
    let target = origin.and_then(|_| next_u32(&mut rest));

    match (kind, origin, target) {
        (Some(kind), Some(origin), Some(target)) => Ok(Command::new(kind, origin, target, raw)),
        (_, origin, _) => Err(DecodeError::Malformed {
            origin: origin.unwrap_or(0),
            target: 0,
            raw,
        }),
    }
}

fn skip_whitespace(s: &[u8]) -> &[u8] {
    let n = s.iter().take_while(|b| b.is_ascii_whitespace()).count();
    &s[n..]
}

fn next_word<'a>(rest: &mut &'a [u8]) -> Option<&'a [u8]> {
    let s = skip_whitespace(*rest);
    let n = s.iter().take_while(|b| !b.is_ascii_whitespace()).count();
    let (word, tail) = s.split_at(n);
    *rest = tail;
    (!word.is_empty()).then_some(word)
}

/// Leading decimal digits as a `u32`; `None` if there are none or the
/// value overflows.
fn next_u32(rest: &mut &[u8]) -> Option<u32> {
    let s = skip_whitespace(*rest);
    let n = s.iter().take_while(|b| b.is_ascii_digit()).count();
    let (digits, tail) = s.split_at(n);
    *rest = tail;
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0u32, |acc, &b| {
        acc.checked_mul(10)?.checked_add(u32::from(b - b'0'))
    })
}

impl DecodeError {
    /// The in-band stand-in for a frame that did not scan: an unknown
    /// command carrying whatever timing fields were readable.
    pub fn into_command(self) -> Command {
        match self {
            DecodeError::Malformed {
                raw,
                origin,
                target,
            } => Command::new(CommandKind::Unknown, origin, target, raw),
        }
    }
}

// ── Encoding ─────────────────────────────────────────────────────

/// Append the acknowledgement for `command` to `dst`.
pub fn encode_ack_into(command: &Command, sent: u32, dst: &mut BytesMut) {
    dst.extend_from_slice(command.kind().ack_prefix().as_bytes());
    if command.kind() == CommandKind::Unknown {
        dst.extend_from_slice(command.raw());
    }
    // Writing to a BytesMut cannot fail.
    let _ = write!(dst, "{} {} {}", command.origin(), sent, command.target());
}

/// The acknowledgement for `command`, stamped with `sent`.
pub fn encode_ack(command: &Command, sent: u32) -> Bytes {
    let mut dst = BytesMut::with_capacity(64 + command.raw().len());
    encode_ack_into(command, sent, &mut dst);
    dst.freeze()
}

/// An acknowledgement queued on a framed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub command: Command,
    pub sent: u32,
}

// ── KeyerCodec ───────────────────────────────────────────────────

/// `tokio_util` adapter: one buffered read in, one [`Command`] out.
///
/// Malformed frames are never a stream error; they come out as
/// [`CommandKind::Unknown`] so the session answers them and carries on.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyerCodec;

impl tokio_util::codec::Decoder for KeyerCodec {
    type Item = Command;
    type Error = KeyerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let raw = src.split().freeze();
        let command = decode(raw).unwrap_or_else(|e| {
            warn!("{e}");
            e.into_command()
        });
        Ok(Some(command))
    }
}

impl tokio_util::codec::Encoder<Ack> for KeyerCodec {
    type Error = KeyerError;

    fn encode(&mut self, item: Ack, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_ack_into(&item.command, item.sent, dst);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
