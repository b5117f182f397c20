//! The relay event loop.
//!
//! One task multiplexes four event sources with `tokio::select!`:
//!
//! ```text
//!   1 ms interval ──► on_tick ──► engine.tick(now)        (sweeper)
//!   listener      ──► on_accept                            (session swap)
//!   session       ──► on_frame ──► engine.schedule(..)     (writer)
//!   control chan  ──► on_control                           (reconfiguration)
//! ```
//!
//! Handlers never overlap and the loop owns the [`KeyerEngine`], so the
//! schedule needs no lock. A slow handler only delays the next tick; the
//! dispatcher's catch-up sweep makes up for it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::session::Session;
use super::{CONTROL_CHANNEL_CAPACITY, DEFAULT_LISTEN_PORT, TICK_PERIOD};
use crate::clock::Clock;
use crate::engine::KeyerEngine;
use crate::error::KeyerError;
use crate::keyer::KeyLevel;
use crate::message::{Command, CommandKind};
use crate::output::{KeyOutput, LineSelect, SerialOutput};
use crate::schedule::Action;

// ── ServiceConfig ────────────────────────────────────────────────

/// Where the service listens for key clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_address: IpAddr,
    pub listen_port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: DEFAULT_LISTEN_PORT,
        }
    }
}

// ── Control & status ─────────────────────────────────────────────

/// Requests handled on the event loop between ticks.
pub enum ControlEvent {
    /// Close the listener and listen on a new port.
    Rebind(u16),
    SetLine(LineSelect),
    SetInverted(bool),
    /// Open a serial device and key through it.
    OpenPort(String),
    /// Attach an already-open output.
    AttachOutput(Box<dyn KeyOutput>),
    ClosePort,
    /// Execute a key transition immediately.
    Inject(Action),
    /// Release the key and stop the loop.
    Shutdown,
}

impl std::fmt::Debug for ControlEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rebind(port) => f.debug_tuple("Rebind").field(port).finish(),
            Self::SetLine(line) => f.debug_tuple("SetLine").field(line).finish(),
            Self::SetInverted(inv) => f.debug_tuple("SetInverted").field(inv).finish(),
            Self::OpenPort(device) => f.debug_tuple("OpenPort").field(device).finish(),
            Self::AttachOutput(output) => f.debug_tuple("AttachOutput").field(&output.name()).finish(),
            Self::ClosePort => write!(f, "ClosePort"),
            Self::Inject(action) => f.debug_tuple("Inject").field(action).finish(),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Snapshot published after every event; what a status display shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyStatus {
    pub key: KeyLevel,
    pub port_open: bool,
    /// Connected client, if any.
    pub peer: Option<SocketAddr>,
    /// Bound listener address, if listening.
    pub listening: Option<SocketAddr>,
}

/// Cloneable handle for steering a running [`KeyerService`].
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    control_tx: mpsc::Sender<ControlEvent>,
    status_rx: watch::Receiver<KeyStatus>,
}

impl ServiceHandle {
    pub async fn send(&self, event: ControlEvent) -> Result<(), KeyerError> {
        self.control_tx.send(event).await?;
        Ok(())
    }

    pub async fn rebind(&self, port: u16) -> Result<(), KeyerError> {
        self.send(ControlEvent::Rebind(port)).await
    }

    pub async fn inject(&self, action: Action) -> Result<(), KeyerError> {
        self.send(ControlEvent::Inject(action)).await
    }

    pub async fn shutdown(&self) -> Result<(), KeyerError> {
        self.send(ControlEvent::Shutdown).await
    }

    /// Latest published status.
    pub fn status(&self) -> KeyStatus {
        self.status_rx.borrow().clone()
    }

    /// A receiver that is notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<KeyStatus> {
        self.status_rx.clone()
    }
}

// ── KeyerService ─────────────────────────────────────────────────

pub struct KeyerService {
    config: ServiceConfig,
    engine: KeyerEngine,
    clock: Arc<dyn Clock>,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    session: Option<Session>,
    control_rx: mpsc::Receiver<ControlEvent>,
    status_tx: watch::Sender<KeyStatus>,
}

impl KeyerService {
    pub fn new(
        config: ServiceConfig,
        engine: KeyerEngine,
        clock: Arc<dyn Clock>,
    ) -> (Self, ServiceHandle) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(KeyStatus::default());
        let service = Self {
            config,
            engine,
            clock,
            listener: None,
            local_addr: None,
            session: None,
            control_rx,
            status_tx,
        };
        (
            service,
            ServiceHandle {
                control_tx,
                status_rx,
            },
        )
    }

    /// Run until [`ControlEvent::Shutdown`] arrives or every
    /// [`ServiceHandle`] is dropped. The key is released on the way out.
    pub async fn run(mut self) {
        self.listen().await;
        self.publish_status();

        let mut ticker = tokio::time::interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick(),
                accepted = accept(self.listener.as_ref()) => self.on_accept(accepted),
                frame = next_frame(self.session.as_mut()) => self.on_frame(frame).await,
                event = self.control_rx.recv() => match event {
                    Some(ControlEvent::Shutdown) | None => break,
                    Some(event) => self.on_control(event).await,
                },
            }
            self.publish_status();
        }

        if let Some(session) = self.session.take() {
            self.end_session(session, "shutting down");
        }
        self.engine.reset();
        self.publish_status();
        info!("keyer service stopped");
    }

    // ── Handlers ─────────────────────────────────────────────────

    fn on_tick(&mut self) {
        let now = self.clock.now_ms();
        for fired in self.engine.tick(now) {
            debug!("key {:?} for {} at {now}", fired.action, fired.at);
        }
    }

    fn on_accept(&mut self, accepted: std::io::Result<(TcpStream, SocketAddr)>) {
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept error: {e}");
                return;
            }
        };
        if let Some(previous) = self.session.take() {
            self.end_session(previous, "replaced by new client");
        }
        info!("key client connected from {peer}");
        self.session = Some(Session::new(stream, peer));
    }

    async fn on_frame(&mut self, frame: Option<Result<Command, KeyerError>>) {
        match frame {
            Some(Ok(command)) => self.on_command(command).await,
            Some(Err(e)) => {
                warn!("read error: {e}");
                if let Some(session) = self.session.take() {
                    self.end_session(session, "read error");
                }
            }
            None => {
                if let Some(session) = self.session.take() {
                    self.end_session(session, "closed by client");
                }
            }
        }
    }

    async fn on_command(&mut self, command: Command) {
        let now = self.clock.now_ms();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        debug!("{} from {}", command, session.peer());

        match command.kind() {
            CommandKind::KeyDown => session.arm_down_timer(now),
            CommandKind::KeyUp => {
                if let Some(held) = session.disarm_down_timer(now) {
                    debug!("client held key {held} ms");
                }
            }
            _ => {}
        }
        if let Some(action) = command.kind().action() {
            let lead = command.target().wrapping_sub(now) as i32;
            if lead < 0 {
                debug!("{action:?} for {} arrived {} ms late", command.target(), -lead);
            }
            self.engine.schedule(command.target(), action);
        }

        let sent = self.clock.now_ms();
        if let Err(e) = session.acknowledge(command, sent).await {
            warn!("cannot acknowledge to {}: {e}", session.peer());
        }
    }

    async fn on_control(&mut self, event: ControlEvent) {
        debug!("control: {event:?}");
        match event {
            ControlEvent::Rebind(port) => {
                self.config.listen_port = port;
                self.listen().await;
            }
            ControlEvent::SetLine(line) => self.engine.set_line(line),
            ControlEvent::SetInverted(inverted) => self.engine.set_inverted(inverted),
            ControlEvent::OpenPort(device) => {
                self.engine.detach_output();
                match SerialOutput::open(&device) {
                    Ok(output) => self.engine.attach_output(Box::new(output)),
                    Err(e) => warn!("cannot open {device}: {e}"),
                }
            }
            ControlEvent::AttachOutput(output) => {
                self.engine.detach_output();
                self.engine.attach_output(output);
            }
            ControlEvent::ClosePort => {
                self.engine.detach_output();
            }
            ControlEvent::Inject(action) => {
                let now = self.clock.now_ms();
                self.engine.inject(action, now);
            }
            ControlEvent::Shutdown => {}
        }
    }

    // ── Helpers ──────────────────────────────────────────────────

    /// Forced key-up and an empty schedule: nothing the departed client
    /// queued may fire.
    fn end_session(&mut self, session: Session, reason: &str) {
        self.engine.reset();
        info!(
            "key client {} disconnected ({reason}) after {:?}, {} frames",
            session.peer(),
            session.connected_duration(),
            session.frames(),
        );
    }

    /// (Re)bind the listener. On failure the service keeps running
    /// without one until the next rebind.
    async fn listen(&mut self) {
        self.listener = None;
        self.local_addr = None;
        let addr = SocketAddr::new(self.config.bind_address, self.config.listen_port);
        match bind(addr).await {
            Ok(listener) => {
                let local = listener.local_addr().unwrap_or(addr);
                info!("listening for key clients on {local}");
                self.listener = Some(listener);
                self.local_addr = Some(local);
            }
            Err(e) => warn!("{e}; not accepting key clients"),
        }
    }

    fn publish_status(&self) {
        let status = KeyStatus {
            key: self.engine.key().level(),
            port_open: self.engine.key().is_port_open(),
            peer: self.session.as_ref().map(Session::peer),
            listening: self.local_addr,
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, KeyerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| KeyerError::Listen { addr, source })
}

async fn accept(listener: Option<&TcpListener>) -> std::io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

async fn next_frame(session: Option<&mut Session>) -> Option<Result<Command, KeyerError>> {
    match session {
        Some(session) => session.next_command().await,
        None => std::future::pending().await,
    }
}
