//! Prometheus gauges for data channel latency
//!
//! The registry is owned by a [`LatencyMetrics`] instance instead of the
//! process-wide default one, so handlers and tests get their own set.

use log::warn;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use super::record::LatencyRecord;

const NAMESPACE: &str = "webrtc";

/// A single-series gauge: `webrtc_{field}{field="Label"}`
#[derive(Clone)]
struct LabeledGauge {
    vec: IntGaugeVec,
    gauge: IntGauge,
}

impl LabeledGauge {
    fn new(field: &str, label: &str, help: &str) -> Result<Self, prometheus::Error> {
        let vec = IntGaugeVec::new(Opts::new(field, help).namespace(NAMESPACE), &[field])?;
        let gauge = vec.get_metric_with_label_values(&[label])?;
        Ok(Self { vec, gauge })
    }
}

#[derive(Clone)]
pub struct LatencyMetrics {
    frame_id: LabeledGauge,
    sent_client2: LabeledGauge,
    sent_sfu2: LabeledGauge,
    sent_sfu1: LabeledGauge,
    sent_client1: LabeledGauge,
    latency_end_to_end: LabeledGauge,
    latency_client2_to_sfu2: LabeledGauge,
    latency_sfu2_to_sfu1: LabeledGauge,
    latency_sfu1_to_client1: LabeledGauge,

    /// Records discarded because the log queue was full
    dropped: IntCounter,
    /// Messages that failed to deserialize
    malformed: IntCounter,

    registry: Registry,
}

impl LatencyMetrics {
    /// Creates the gauges and registers them on a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let metrics = Self {
            frame_id: LabeledGauge::new(
                "frame_id",
                "FrameID",
                "The ID of the frame being processed",
            )?,
            sent_client2: LabeledGauge::new(
                "message_sent_time_client2",
                "MessageSentTimeClient2",
                "The time when the message was sent from client 2",
            )?,
            sent_sfu2: LabeledGauge::new(
                "message_sent_time_sfu2",
                "MessageSentTimeSfu2",
                "The time when the message was sent from SFU 2",
            )?,
            sent_sfu1: LabeledGauge::new(
                "message_sent_time_sfu1",
                "MessageSentTimeSfu1",
                "The time when the message was sent from SFU 1",
            )?,
            sent_client1: LabeledGauge::new(
                "message_sent_time_client1",
                "MessageSentTimeClient1",
                "The time when the message was received by client 1",
            )?,
            latency_end_to_end: LabeledGauge::new(
                "latency_end_to_end",
                "LatencyEndToEnd",
                "End-to-end latency of the message",
            )?,
            latency_client2_to_sfu2: LabeledGauge::new(
                "latency_client2_to_sfu2",
                "LatencyClient2ToSfu2",
                "Latency from client 2 to SFU 2",
            )?,
            latency_sfu2_to_sfu1: LabeledGauge::new(
                "latency_sfu2_to_sfu1",
                "LatencySfu2ToSfu1",
                "Latency from SFU 2 to SFU 1",
            )?,
            latency_sfu1_to_client1: LabeledGauge::new(
                "latency_sfu1_to_client1",
                "LatencySfu1ToClient1",
                "Latency from SFU 1 to client 1",
            )?,
            dropped: IntCounter::with_opts(
                Opts::new("telemetry_dropped_total", "Latency records dropped on a full log queue")
                    .namespace(NAMESPACE),
            )?,
            malformed: IntCounter::with_opts(
                Opts::new("telemetry_malformed_total", "Data channel messages that failed to parse")
                    .namespace(NAMESPACE),
            )?,
            registry: Registry::new(),
        };

        for collector in metrics.collectors() {
            metrics.registry.register(collector)?;
        }
        Ok(metrics)
    }

    fn gauges(&self) -> [&LabeledGauge; 9] {
        [
            &self.frame_id,
            &self.sent_client2,
            &self.sent_sfu2,
            &self.sent_sfu1,
            &self.sent_client1,
            &self.latency_end_to_end,
            &self.latency_client2_to_sfu2,
            &self.latency_sfu2_to_sfu1,
            &self.latency_sfu1_to_client1,
        ]
    }

    fn collectors(&self) -> Vec<Box<dyn Collector>> {
        let mut out: Vec<Box<dyn Collector>> = self
            .gauges()
            .into_iter()
            .map(|g| Box::new(g.vec.clone()) as Box<dyn Collector>)
            .collect();
        out.push(Box::new(self.dropped.clone()));
        out.push(Box::new(self.malformed.clone()));
        out
    }

    /// Overwrites every gauge from a stamped record
    pub fn observe(&self, record: &LatencyRecord) {
        let hops = record.hop_latencies();
        self.frame_id.gauge.set(record.frame_id);
        self.sent_client2.gauge.set(record.sent_client2);
        self.sent_sfu2.gauge.set(record.sent_sfu2);
        self.sent_sfu1.gauge.set(record.sent_sfu1);
        self.sent_client1.gauge.set(record.sent_client1);
        self.latency_end_to_end.gauge.set(hops.end_to_end);
        self.latency_client2_to_sfu2.gauge.set(hops.client2_to_sfu2);
        self.latency_sfu2_to_sfu1.gauge.set(hops.sfu2_to_sfu1);
        self.latency_sfu1_to_client1.gauge.set(hops.sfu1_to_client1);
    }

    pub fn record_dropped(&self) {
        self.dropped.inc();
    }

    pub fn record_malformed(&self) {
        self.malformed.inc();
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.get()
    }

    pub fn end_to_end(&self) -> i64 {
        self.latency_end_to_end.gauge.get()
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!("failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Unregisters every metric; later renders are empty.
    pub fn shutdown(&self) {
        for collector in self.collectors() {
            // a second shutdown finds nothing to remove
            let _ = self.registry.unregister(collector);
        }
    }
}
