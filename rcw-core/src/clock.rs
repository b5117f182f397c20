//! Millisecond time sources.
//!
//! Clients compute their target timestamps from the same clock the
//! relay reports in its acknowledgements: Unix epoch milliseconds folded
//! into a `u32` by `% 4_294_967_295`. Keep that modulus; a client that
//! syncs against the acknowledgement's `sent` field relies on it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Modulus applied to epoch milliseconds.
pub const CLOCK_MODULUS: u64 = 4_294_967_295;

/// Abstraction over time sources.
/// Implementations: [`SystemClock`] (production), [`ManualClock`] (testing).
pub trait Clock: Send + Sync {
    /// Current time in milliseconds on the relay's wrapped timeline.
    fn now_ms(&self) -> u32;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        (ms % CLOCK_MODULUS) as u32
    }
}

/// Hand-driven clock for deterministic tests.
///
/// Shareable across tasks; the relay's event loop only reads it.
#[derive(Debug, Default)]
pub struct ManualClock {
    current_ms: AtomicU32,
}

impl ManualClock {
    pub fn new(start_ms: u32) -> Self {
        Self {
            current_ms: AtomicU32::new(start_ms),
        }
    }

    pub fn set(&self, ms: u32) {
        self.current_ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u32) {
        self.current_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.current_ms.load(Ordering::SeqCst)
    }
}
