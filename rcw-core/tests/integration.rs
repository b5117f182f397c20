//! Integration tests: the real event loop over localhost TCP, driven by
//! a hand-set clock and a recording key output.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rcw_core::{
    Action, Clock, KeyOutput, KeySettings, KeyStatus, KeyerEngine, KeyerError, KeyerService,
    LineSelect, ManualClock, ServiceConfig, ServiceHandle, SystemClock,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// ── Helpers ──────────────────────────────────────────────────────

type Writes = Arc<Mutex<Vec<(LineSelect, bool)>>>;

/// Key output that remembers every level it was driven to.
struct Recorder {
    writes: Writes,
}

impl KeyOutput for Recorder {
    fn set_line(&mut self, line: LineSelect, level: bool) -> Result<(), KeyerError> {
        self.writes.lock().unwrap().push((line, level));
        Ok(())
    }

    fn name(&self) -> &str {
        "recorder"
    }
}

/// Line level of the last write, `true` meaning key up (normal polarity).
fn last_level(writes: &Writes) -> Option<bool> {
    writes.lock().unwrap().last().map(|(_, level)| *level)
}

fn key_down_writes(writes: &Writes) -> usize {
    writes.lock().unwrap().iter().filter(|(_, level)| !level).count()
}

struct Relay {
    handle: ServiceHandle,
    addr: SocketAddr,
    writes: Writes,
}

/// Start a service on an OS-assigned localhost port.
async fn start(clock: Arc<dyn Clock>) -> Relay {
    let writes = Writes::default();
    let mut engine = KeyerEngine::new(KeySettings::default());
    engine.attach_output(Box::new(Recorder {
        writes: writes.clone(),
    }));

    let config = ServiceConfig {
        bind_address: Ipv4Addr::LOCALHOST.into(),
        listen_port: 0,
    };
    let (service, handle) = KeyerService::new(config, engine, clock);
    tokio::spawn(service.run());

    let status = wait_for(&handle, |s| s.listening.is_some()).await;
    Relay {
        handle,
        addr: status.listening.unwrap(),
        writes,
    }
}

async fn wait_for(handle: &ServiceHandle, pred: impl FnMut(&KeyStatus) -> bool) -> KeyStatus {
    let mut rx = handle.subscribe();
    let status = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timeout waiting for status")
        .expect("service stopped");
    status.clone()
}

/// Send one frame and return the acknowledgement text.
async fn exchange(stream: &mut TcpStream, frame: &str) -> String {
    stream.write_all(frame.as_bytes()).await.unwrap();
    let mut buf = [0u8; 256];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("timeout waiting for ack")
        .unwrap();
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

// ── Protocol round trips ─────────────────────────────────────────

#[tokio::test]
async fn key_down_round_trip() {
    let relay = start(Arc::new(SystemClock::new())).await;
    let mut client = TcpStream::connect(relay.addr).await.unwrap();

    let ack = exchange(&mut client, "KD 1000 1050").await;
    assert!(ack.starts_with("KD 1000 "), "{ack}");
    assert!(ack.ends_with(" 1050"), "{ack}");

    let fields: Vec<&str> = ack.split(' ').collect();
    assert_eq!(fields.len(), 4);
    let sent: u32 = fields[2].parse().unwrap();
    assert!(sent >= 1000);
}

#[tokio::test]
async fn unknown_command_is_answered_in_band() {
    let relay = start(Arc::new(SystemClock::new())).await;
    let mut client = TcpStream::connect(relay.addr).await.unwrap();

    let ack = exchange(&mut client, "ZZ 1 2").await;
    assert!(ack.starts_with("Unknown subcommand received: ZZ 1 2"), "{ack}");

    // The session survives and keeps answering.
    let ack = exchange(&mut client, "P 7 0").await;
    assert!(ack.starts_with("PP 7 "), "{ack}");
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let clock = Arc::new(ManualClock::new(500));
    let relay = start(clock).await;
    let mut client = TcpStream::connect(relay.addr).await.unwrap();

    let ack = exchange(&mut client, "KD").await;
    assert_eq!(ack, "Unknown subcommand received: KD0 500 0");

    let ack = exchange(&mut client, "CC 3 0").await;
    assert_eq!(ack, "3 500 0");
}

// ── Scheduling through the service ───────────────────────────────

#[tokio::test]
async fn key_events_fire_at_their_target_time() {
    let clock = Arc::new(ManualClock::new(10_000));
    let relay = start(clock.clone()).await;
    let mut client = TcpStream::connect(relay.addr).await.unwrap();

    exchange(&mut client, "KD 1 10100").await;
    exchange(&mut client, "KU 2 10200").await;
    assert!(!relay.handle.status().key.is_down());

    clock.set(10_100);
    wait_for(&relay.handle, |s| s.key.is_down()).await;
    assert_eq!(last_level(&relay.writes), Some(false));

    clock.set(10_200);
    wait_for(&relay.handle, |s| !s.key.is_down()).await;
    assert_eq!(last_level(&relay.writes), Some(true));
}

#[tokio::test]
async fn stuck_key_is_released_after_timeout() {
    let clock = Arc::new(ManualClock::new(20_000));
    let relay = start(clock.clone()).await;
    let mut client = TcpStream::connect(relay.addr).await.unwrap();

    exchange(&mut client, "KD 1 20010").await;
    clock.set(20_010);
    wait_for(&relay.handle, |s| s.key.is_down()).await;

    clock.set(24_000);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(relay.handle.status().key.is_down());

    clock.set(25_011);
    wait_for(&relay.handle, |s| !s.key.is_down()).await;
    assert_eq!(last_level(&relay.writes), Some(true));
}

// ── Session lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn disconnect_releases_key_and_drops_pending() {
    let clock = Arc::new(ManualClock::new(30_000));
    let relay = start(clock.clone()).await;
    let mut client = TcpStream::connect(relay.addr).await.unwrap();

    exchange(&mut client, "KD 1 30010").await;
    clock.set(30_010);
    wait_for(&relay.handle, |s| s.key.is_down()).await;

    exchange(&mut client, "KU 2 30500").await;
    exchange(&mut client, "KD 3 30600").await;
    drop(client);

    let status = wait_for(&relay.handle, |s| s.peer.is_none() && !s.key.is_down()).await;
    assert!(status.listening.is_some());
    assert_eq!(last_level(&relay.writes), Some(true));

    let downs = key_down_writes(&relay.writes);
    clock.set(31_000);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(key_down_writes(&relay.writes), downs);
    assert!(!relay.handle.status().key.is_down());
}

#[tokio::test]
async fn new_client_replaces_old_one() {
    let clock = Arc::new(ManualClock::new(40_000));
    let relay = start(clock.clone()).await;

    let mut first = TcpStream::connect(relay.addr).await.unwrap();
    exchange(&mut first, "KD 1 40500").await;
    let first_peer = first.local_addr().unwrap();
    wait_for(&relay.handle, |s| s.peer == Some(first_peer)).await;

    let mut second = TcpStream::connect(relay.addr).await.unwrap();
    let ack = exchange(&mut second, "P 9 0").await;
    assert!(ack.starts_with("PP 9 "));
    let second_peer = second.local_addr().unwrap();
    wait_for(&relay.handle, |s| s.peer == Some(second_peer)).await;

    // The first client's pending key-down went with it.
    clock.set(40_600);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!relay.handle.status().key.is_down());
    assert_eq!(key_down_writes(&relay.writes), 0);
}

// ── Control channel ──────────────────────────────────────────────

#[tokio::test]
async fn rebind_moves_the_listener() {
    let relay = start(Arc::new(ManualClock::new(0))).await;

    let port = {
        let probe = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        probe.local_addr().unwrap().port()
    };
    assert_ne!(port, relay.addr.port());

    relay.handle.rebind(port).await.unwrap();
    let status = wait_for(&relay.handle, |s| {
        s.listening.is_some_and(|addr| addr.port() == port)
    })
    .await;

    let mut client = TcpStream::connect(status.listening.unwrap()).await.unwrap();
    let ack = exchange(&mut client, "CC 1 2").await;
    assert_eq!(ack, "1 0 2");
}

#[tokio::test]
async fn injected_key_down_is_immediate() {
    let relay = start(Arc::new(ManualClock::new(50_000))).await;

    relay.handle.inject(Action::Down).await.unwrap();
    wait_for(&relay.handle, |s| s.key.is_down()).await;
    assert_eq!(last_level(&relay.writes), Some(false));

    relay.handle.inject(Action::Up).await.unwrap();
    wait_for(&relay.handle, |s| !s.key.is_down()).await;
}

#[tokio::test]
async fn shutdown_releases_key() {
    let relay = start(Arc::new(ManualClock::new(60_000))).await;
    relay.handle.inject(Action::Down).await.unwrap();
    wait_for(&relay.handle, |s| s.key.is_down()).await;

    let mut status = relay.handle.subscribe();
    relay.handle.shutdown().await.unwrap();
    // The status sender is dropped once the loop exits.
    while status.changed().await.is_ok() {}
    assert!(!status.borrow().key.is_down());
    assert_eq!(last_level(&relay.writes), Some(true));
}
