//! The one connected key client.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::warn;

use super::ACK_WRITE_TIMEOUT;
use crate::codec::{Ack, KeyerCodec};
use crate::error::KeyerError;
use crate::message::Command;

/// A connected client and its framed socket.
///
/// Besides the socket, a session keeps a "down timer": the arrival time
/// of the last `KD` not yet followed by a `KU`. It only feeds the logs;
/// the stuck-key protection lives in the dispatcher and works on
/// executed transitions, not arrivals.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    framed: Framed<TcpStream, KeyerCodec>,
    since: Instant,
    frames: u64,
    down_timer: Option<u32>,
}

impl Session {
    /// Wrap a freshly accepted stream. Nagle is switched off: key
    /// events are tiny and latency-critical.
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("cannot set TCP_NODELAY for {peer}: {e}");
        }
        Self {
            peer,
            framed: Framed::new(stream, KeyerCodec),
            since: Instant::now(),
            frames: 0,
            down_timer: None,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn connected_duration(&self) -> Duration {
        self.since.elapsed()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Next decoded frame. `None` once the client has closed the socket.
    ///
    /// Cancel-safe: partially read bytes stay buffered in the `Framed`.
    pub async fn next_command(&mut self) -> Option<Result<Command, KeyerError>> {
        let next = self.framed.next().await;
        if matches!(next, Some(Ok(_))) {
            self.frames += 1;
        }
        next
    }

    /// Write the acknowledgement, waiting at most [`ACK_WRITE_TIMEOUT`].
    /// Not retried on failure.
    pub async fn acknowledge(&mut self, command: Command, sent: u32) -> Result<(), KeyerError> {
        write_ack(&mut self.framed, Ack { command, sent }).await
    }

    // ── Down timer ───────────────────────────────────────────────

    pub fn arm_down_timer(&mut self, now: u32) {
        self.down_timer = Some(now);
    }

    /// Stop the down timer, returning how long it ran.
    pub fn disarm_down_timer(&mut self, now: u32) -> Option<u32> {
        self.down_timer.take().map(|armed| now.wrapping_sub(armed))
    }
}

/// Encode and flush one ack within [`ACK_WRITE_TIMEOUT`].
///
/// On failure whatever is still in the write buffer is discarded, so a
/// later ack never carries an earlier one along with it. Bytes the
/// socket already took stay sent.
async fn write_ack<T>(framed: &mut Framed<T, KeyerCodec>, ack: Ack) -> Result<(), KeyerError>
where
    T: AsyncWrite + Unpin,
{
    let written = tokio::time::timeout(ACK_WRITE_TIMEOUT, async {
        framed.feed(ack).await?;
        framed.flush().await
    })
    .await;

    let result = match written {
        Ok(result) => result,
        Err(elapsed) => Err(elapsed.into()),
    };
    if result.is_err() {
        framed.write_buffer_mut().clear();
    }
    result
}
