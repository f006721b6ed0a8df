//! Health counters for pacing engines

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::types::MediaKind;

/// Counters published by one pacing engine
///
/// All fields use atomic operations so the engine can update them while the
/// supervisor reads a summary.
pub struct PacingHealth {
    kind: MediaKind,

    /// Units successfully delivered to the sink
    units_sent: AtomicU64,

    /// Payload bytes delivered to the sink
    bytes_sent: AtomicU64,

    /// Number of times the container was reopened after end-of-stream
    reopens: AtomicU64,

    /// Unix microseconds of the last delivered unit, 0 before the first one
    last_unit_time: AtomicU64,
}

fn now_micros() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

impl PacingHealth {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            units_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            reopens: AtomicU64::new(0),
            last_unit_time: AtomicU64::new(0),
        }
    }

    pub fn record_unit(&self, size: usize) {
        self.last_unit_time.store(now_micros(), Ordering::Relaxed);
        self.units_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_reopen(&self) {
        self.reopens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn units_sent(&self) -> u64 {
        self.units_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn reopens(&self) -> u64 {
        self.reopens.load(Ordering::Relaxed)
    }

    /// Time since the last delivered unit, `None` before the first one
    pub fn since_last_unit(&self) -> Option<Duration> {
        match self.last_unit_time.load(Ordering::Relaxed) {
            0 => None,
            last => Some(Duration::from_micros(now_micros().saturating_sub(last))),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: units={} bytes={} reopens={} last_unit={}",
            self.kind,
            self.units_sent(),
            self.bytes_sent(),
            self.reopens(),
            match self.since_last_unit() {
                Some(d) => format!("{}ms ago", d.as_millis()),
                None => "never".to_string(),
            }
        )
    }
}
