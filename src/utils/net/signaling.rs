//! One-shot HTTP offer/answer exchange
//!
//! The local description is serialized to JSON, base64 encoded and POSTed to
//! the offer endpoint. The response body carries the remote description in the
//! same envelope.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, info};
use reqwest::header::CONTENT_TYPE;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

pub fn encode(desc: &RTCSessionDescription) -> Result<String> {
    let json = serde_json::to_vec(desc).context("failed to serialize session description")?;
    Ok(STANDARD.encode(json))
}

pub fn decode(text: &str) -> Result<RTCSessionDescription> {
    let json = STANDARD
        .decode(text.trim())
        .context("session description is not valid base64")?;
    serde_json::from_slice(&json).context("session description is not valid JSON")
}

/// Sends the offer and returns the answer the endpoint replied with
pub async fn exchange(
    client: &reqwest::Client,
    endpoint: &str,
    offer: &RTCSessionDescription,
) -> Result<RTCSessionDescription> {
    info!("Posting offer to {}", endpoint);
    let body = client
        .post(endpoint)
        .header(CONTENT_TYPE, "application/json; charset=utf-8")
        .body(encode(offer)?)
        .send()
        .await
        .with_context(|| format!("failed to reach {endpoint}"))?
        .error_for_status()
        .with_context(|| format!("{endpoint} rejected the offer"))?
        .text()
        .await
        .context("failed to read answer")?;
    debug!("answer envelope: {} bytes", body.len());
    decode(&body)
}
