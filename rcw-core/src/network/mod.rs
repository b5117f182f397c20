//! TCP side of the relay: the single client session and the event loop
//! that serializes it with the dispatcher tick.

mod service;
mod session;

use std::time::Duration;

pub use service::{ControlEvent, KeyStatus, KeyerService, ServiceConfig, ServiceHandle};
pub use session::Session;

/// Dispatcher tick period.
pub const TICK_PERIOD: Duration = Duration::from_millis(1);

/// Longest the event loop waits for an acknowledgement to be written.
pub const ACK_WRITE_TIMEOUT: Duration = Duration::from_millis(5);

/// Default TCP port for key clients.
pub const DEFAULT_LISTEN_PORT: u16 = 7373;

const CONTROL_CHANNEL_CAPACITY: usize = 32;
