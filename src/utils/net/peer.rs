use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use webrtc::api::API;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::track::track_local::TrackLocal;

use super::signaling;
use super::webrtc_common::{create_peer_connection, create_track};
use crate::pipeline::sink::TrackSink;
use crate::pipeline::{ConnectivitySignal, MediaKind};
use crate::telemetry::TelemetryHandler;

pub const DATA_CHANNEL_LABEL: &str = "data";

/// The single peer connection of a run.
///
/// ICE reaching `Connected` fires the connectivity signal. The peer connection
/// going `Failed` or `Closed` fires `ended` so the process can wind down.
pub struct PeerSession {
    connection: Arc<RTCPeerConnection>,
    http: reqwest::Client,
}

impl PeerSession {
    pub async fn new(
        api: &API,
        ice_servers: &[String],
        connected: ConnectivitySignal,
        ended: CancellationToken,
    ) -> Result<Self> {
        let connection = create_peer_connection(api, ice_servers).await?;

        connection.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            info!("ICE Connection State has changed: {}", state);
            if state == RTCIceConnectionState::Connected {
                connected.fire();
            }
            Box::pin(async {})
        }));

        connection.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            info!("Peer Connection State has changed: {}", state);
            match state {
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                    info!("Peer Connection has gone to {}, exiting", state);
                    ended.cancel();
                }
                _ => {}
            }
            Box::pin(async {})
        }));

        Ok(Self {
            connection,
            http: reqwest::Client::new(),
        })
    }

    /// Opens the outbound data channel and routes every message to `handler`
    pub async fn open_data_channel(
        &self,
        handler: Arc<TelemetryHandler>,
    ) -> Result<Arc<RTCDataChannel>> {
        let channel = self
            .connection
            .create_data_channel(DATA_CHANNEL_LABEL, None)
            .await
            .context("failed to create data channel")?;

        let label = channel.label().to_owned();
        channel.on_open(Box::new(move || {
            info!("Data channel '{}' open", label);
            Box::pin(async {})
        }));

        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let disposition = handler.on_message(&msg.data).await;
                debug!("data channel message ({} bytes): {:?}", msg.data.len(), disposition);
            })
        }));

        Ok(channel)
    }

    /// Adds a send-only sample track and returns the sink feeding it
    pub async fn add_track(&self, kind: MediaKind, mime_type: &str) -> Result<TrackSink> {
        let track = create_track(kind, mime_type);
        let sender = self
            .connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .with_context(|| format!("failed to add {kind} track ({mime_type})"))?;
        info!("Added {} track with {}", kind, mime_type);
        Ok(TrackSink::new(track, sender))
    }

    /// Creates the offer, waits for ICE gathering and applies the remote answer
    pub async fn negotiate(&self, endpoint: &str) -> Result<()> {
        let offer = self
            .connection
            .create_offer(None)
            .await
            .context("failed to create offer")?;

        // Only one signaling message is exchanged, so candidates must be in the offer
        let mut gather_complete = self.connection.gathering_complete_promise().await;
        self.connection
            .set_local_description(offer)
            .await
            .context("failed to set local description")?;
        let _ = gather_complete.recv().await;

        let local = self
            .connection
            .local_description()
            .await
            .ok_or_else(|| anyhow!("local description missing after gathering"))?;

        let answer = signaling::exchange(&self.http, endpoint, &local).await?;
        self.connection
            .set_remote_description(answer)
            .await
            .context("failed to set remote description")?;
        Ok(())
    }

    pub async fn close(&self) {
        if let Err(e) = self.connection.close().await {
            warn!("Failed to close peer connection: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
    use crate::telemetry::{LatencyMetrics, QueuePolicy};
    use crate::utils::net::webrtc_common::create_webrtc_api;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn session(ended: CancellationToken) -> PeerSession {
        let api = create_webrtc_api().unwrap();
        PeerSession::new(&api, &[], ConnectivitySignal::new(), ended)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_tracks_and_channel_are_added() {
        let session = session(CancellationToken::new()).await;
        session.add_track(MediaKind::Video, MIME_TYPE_VP8).await.unwrap();
        session.add_track(MediaKind::Audio, MIME_TYPE_OPUS).await.unwrap();

        let (tx, _rx) = mpsc::channel(1);
        let handler = Arc::new(TelemetryHandler::new(LatencyMetrics::new().unwrap(), tx, QueuePolicy::DropNewest));
        let channel = session.open_data_channel(handler).await.unwrap();
        assert_eq!(channel.label(), DATA_CHANNEL_LABEL);

        assert_eq!(session.connection.get_transceivers().await.len(), 2);
        session.close().await;
    }

    #[tokio::test]
    async fn test_close_ends_the_session() {
        let ended = CancellationToken::new();
        let session = session(ended.clone()).await;
        session.close().await;
        tokio::time::timeout(Duration::from_secs(1), ended.cancelled())
            .await
            .expect("closed state not reported");
    }
}
