//! Inbound data channel message handling
//!
//! Each message is parsed, stamped with the local receive time, published to
//! the gauges and queued for the log writer. A bad message never stops the
//! handler.

use log::{debug, error, warn};
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::metrics::LatencyMetrics;
use super::record::LatencyRecord;
use crate::pipeline::clock::unix_millis;

/// What happens to a new record when the log queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Wait for the writer to make room, stalling the message callback
    Block,
    /// Discard the incoming record and count it
    DropNewest,
}

impl std::str::FromStr for QueuePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(QueuePolicy::Block),
            "drop-newest" | "drop" => Ok(QueuePolicy::DropNewest),
            other => Err(format!("unknown queue policy `{other}` (block/drop-newest)")),
        }
    }
}

/// Outcome of handling one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Queued,
    /// Queue full under [`QueuePolicy::DropNewest`]
    Dropped,
    /// Payload was not a valid latency record
    Malformed,
    /// The writer side is gone or the handler was closed
    Closed,
}

pub struct TelemetryHandler {
    metrics: LatencyMetrics,
    sender: RwLock<Option<mpsc::Sender<LatencyRecord>>>,
    policy: QueuePolicy,
    clock: fn() -> i64,
}

impl TelemetryHandler {
    pub fn new(
        metrics: LatencyMetrics,
        sender: mpsc::Sender<LatencyRecord>,
        policy: QueuePolicy,
    ) -> Self {
        Self {
            metrics,
            sender: RwLock::new(Some(sender)),
            policy,
            clock: unix_millis,
        }
    }

    /// Replaces the wall clock used to stamp records
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &LatencyMetrics {
        &self.metrics
    }

    pub async fn on_message(&self, data: &[u8]) -> Disposition {
        let mut record = match LatencyRecord::from_json(data) {
            Ok(record) => record,
            Err(e) => {
                warn!("Error unmarshalling data channel message: {}", e);
                self.metrics.record_malformed();
                return Disposition::Malformed;
            }
        };

        record.stamp((self.clock)());
        self.metrics.observe(&record);
        debug!(
            "frame {}: end-to-end {}ms",
            record.frame_id, record.latency_end_to_end
        );

        let Some(sender) = self.sender.read().await.clone() else {
            return Disposition::Closed;
        };

        match self.policy {
            QueuePolicy::Block => match sender.send(record).await {
                Ok(()) => Disposition::Queued,
                Err(_) => {
                    error!("latency log queue is closed");
                    Disposition::Closed
                }
            },
            QueuePolicy::DropNewest => match sender.try_send(record) {
                Ok(()) => Disposition::Queued,
                Err(TrySendError::Full(record)) => {
                    self.metrics.record_dropped();
                    warn!(
                        "latency log queue full, dropped frame {} ({} so far)",
                        record.frame_id,
                        self.metrics.dropped()
                    );
                    Disposition::Dropped
                }
                Err(TrySendError::Closed(_)) => {
                    error!("latency log queue is closed");
                    Disposition::Closed
                }
            },
        }
    }

    /// Releases the queue so the writer can drain and exit.
    ///
    /// Handlers blocked in [`QueuePolicy::Block`] keep their own sender until
    /// their send completes.
    pub async fn close(&self) {
        self.sender.write().await.take();
    }
}
