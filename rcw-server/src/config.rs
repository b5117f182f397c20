//! Configuration for the keying server.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use rcw_core::{ControlEvent, DEFAULT_LISTEN_PORT, KeySettings, LineSelect, ServiceConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Key line settings.
    pub keyer: KeyerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port the key client connects to.
    pub listen_port: u16,
    /// Local address to bind.
    pub bind_address: IpAddr,
}

/// Serial key line configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyerConfig {
    /// Serial device, e.g. "/dev/ttyUSB0" or "COM3".
    pub device: String,
    /// Open `device` at startup.
    pub open_port: bool,
    /// Control line wired to the key input: "rts" or "dtr".
    pub line: LineSelect,
    /// Swap the key-up and key-down line levels.
    pub inverted: bool,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl Default for KeyerConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            open_port: true,
            line: LineSelect::Rts,
            inverted: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig {
            bind_address: self.network.bind_address,
            listen_port: self.network.listen_port,
        }
    }

    pub fn key_settings(&self) -> KeySettings {
        KeySettings {
            line: self.keyer.line,
            inverted: self.keyer.inverted,
        }
    }

    /// Whether a serial device should be opened.
    pub fn wants_port(&self) -> bool {
        self.keyer.open_port && !self.keyer.device.is_empty()
    }

    /// Control events that move a running service from `self` to `next`.
    ///
    /// The listen port and the keyer section are live; a bind address or
    /// logging change needs a restart.
    pub fn changes_to(&self, next: &ServerConfig) -> Vec<ControlEvent> {
        let mut events = Vec::new();
        if self.network.listen_port != next.network.listen_port {
            events.push(ControlEvent::Rebind(next.network.listen_port));
        }
        if self.keyer.line != next.keyer.line {
            events.push(ControlEvent::SetLine(next.keyer.line));
        }
        if self.keyer.inverted != next.keyer.inverted {
            events.push(ControlEvent::SetInverted(next.keyer.inverted));
        }
        if self.wants_port() != next.wants_port() || self.keyer.device != next.keyer.device {
            if next.wants_port() {
                events.push(ControlEvent::OpenPort(next.keyer.device.clone()));
            } else {
                events.push(ControlEvent::ClosePort);
            }
        }
        events
    }
}

// ── Tests ────────────────────────────────────────────────────────
