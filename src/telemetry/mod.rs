//! Data channel latency telemetry
//!
//! ```text
//! on_message → TelemetryHandler → gauges
//!                    ↓ bounded queue
//!               LogWriter → CSV file
//! ```

pub mod handler;
pub mod metrics;
pub mod record;
pub mod writer;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use handler::{Disposition, QueuePolicy, TelemetryHandler};
pub use metrics::LatencyMetrics;
pub use record::LatencyRecord;
pub use writer::LogWriter;

/// Handler plus the writer task draining its queue
pub struct TelemetryPipeline {
    pub handler: Arc<TelemetryHandler>,
    pub writer: JoinHandle<Result<u64>>,
}

impl TelemetryPipeline {
    /// Opens the log file and starts the writer
    pub fn start(
        metrics: LatencyMetrics,
        log_path: &Path,
        capacity: usize,
        policy: QueuePolicy,
    ) -> Result<Self> {
        let writer = LogWriter::create(log_path)?;
        let (tx, rx) = mpsc::channel(capacity);
        Ok(Self {
            handler: Arc::new(TelemetryHandler::new(metrics, tx, policy)),
            writer: writer.spawn(rx),
        })
    }
}
