//! Media sinks: where paced units are delivered

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::types::TimedUnit;

/// Destination of a pacing engine
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Deliver one unit with its intended playout duration
    async fn write(&self, unit: TimedUnit) -> Result<()>;

    /// Read and discard inbound feedback until the stream closes.
    ///
    /// A read failure is the normal end of the stream and yields `Ok(())`.
    async fn drain_feedback(&self) -> Result<()>;
}

/// Sink writing samples to a local WebRTC track
pub struct TrackSink {
    track: Arc<TrackLocalStaticSample>,
    sender: Arc<RTCRtpSender>,
}

impl TrackSink {
    pub fn new(track: Arc<TrackLocalStaticSample>, sender: Arc<RTCRtpSender>) -> Self {
        Self { track, sender }
    }
}

#[async_trait]
impl MediaSink for TrackSink {
    async fn write(&self, unit: TimedUnit) -> Result<()> {
        self.track
            .write_sample(&Sample {
                data: unit.data,
                duration: unit.duration,
                ..Default::default()
            })
            .await
            .with_context(|| format!("failed to write sample to track {}", self.track.id()))
    }

    async fn drain_feedback(&self) -> Result<()> {
        let mut rtcp_buf = vec![0u8; 1500];
        while self.sender.read(&mut rtcp_buf).await.is_ok() {}
        Ok(())
    }
}
