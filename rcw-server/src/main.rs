//! rcw-server entry point.
//!
//! ```text
//! rcw-server                     Run with rcw-server.toml (or defaults)
//! rcw-server --config <path>     Load a custom config TOML
//! rcw-server --port 7373         Override the listen port
//! rcw-server --device COM3       Override the serial device
//! rcw-server --gen-config        Write default config to stdout
//! ```
//!
//! On Unix, SIGHUP re-reads the config file and applies port and key
//! line changes without dropping the process.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rcw_core::{ControlEvent, KeyerEngine, KeyerService, SystemClock};
use rcw_server::config::ServerConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rcw-server", about = "Remote CW keying server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "rcw-server.toml")]
    config: PathBuf,

    /// TCP port for the key client (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Serial device keying the radio (overrides config).
    #[arg(short, long)]
    device: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.network.listen_port = port;
        }
        if let Some(device) = &self.device {
            config.keyer.device = device.clone();
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerConfig::load(&cli.config);
    cli.apply_overrides(&mut config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("rcw-server v{}", env!("CARGO_PKG_VERSION"));
    info!("listen port: {}", config.network.listen_port);
    info!(
        "key line: {} ({})",
        config.keyer.line,
        if config.keyer.inverted { "inverted" } else { "normal" }
    );

    let engine = KeyerEngine::new(config.key_settings());
    let (service, handle) =
        KeyerService::new(config.to_service_config(), engine, Arc::new(SystemClock::new()));

    if config.wants_port() {
        handle
            .send(ControlEvent::OpenPort(config.keyer.device.clone()))
            .await?;
    } else {
        warn!("no serial device configured; keying is logical only");
    }

    // Ctrl-C handler.
    let stop = handle.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, releasing key and shutting down");
        stop.shutdown().await.ok();
    });

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(cli, config, handle.clone()));

    service.run().await;
    Ok(())
}

/// Re-read the config on every SIGHUP and forward what changed.
#[cfg(unix)]
async fn reload_on_hangup(cli: Cli, mut current: ServerConfig, handle: rcw_core::ServiceHandle) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!("cannot install SIGHUP handler: {e}");
            return;
        }
    };
    while hangup.recv().await.is_some() {
        let mut next = ServerConfig::load(&cli.config);
        cli.apply_overrides(&mut next);
        let events = current.changes_to(&next);
        info!("config reloaded, {} change(s)", events.len());
        for event in events {
            if handle.send(event).await.is_err() {
                return;
            }
        }
        current = next;
    }
}
