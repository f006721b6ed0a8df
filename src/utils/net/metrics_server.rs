//! Prometheus scrape endpoint

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::telemetry::LatencyMetrics;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn router(metrics: LatencyMetrics) -> Router {
    Router::new().route("/metrics", get(scrape)).with_state(metrics)
}

async fn scrape(State(metrics): State<LatencyMetrics>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, TEXT_FORMAT)], metrics.render())
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics endpoint on {addr}"))
}

/// Serves `/metrics` until `cancel` fires
pub async fn serve(
    listener: TcpListener,
    metrics: LatencyMetrics,
    cancel: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Serving metrics on http://{}/metrics", addr);
    }
    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("metrics endpoint failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::LatencyRecord;

    #[tokio::test]
    async fn test_scrape_returns_gauges() {
        let metrics = LatencyMetrics::new().unwrap();
        let mut record = LatencyRecord {
            frame_id: 7,
            sent_client2: 10,
            ..Default::default()
        };
        record.stamp(25);
        metrics.observe(&record);

        let listener = bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, metrics, cancel.clone()));

        let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
        assert!(response.status().is_success());
        let body = response.text().await.unwrap();
        assert!(body.contains(r#"webrtc_frame_id{frame_id="FrameID"} 7"#), "{body}");
        assert!(body.contains(r#"webrtc_latency_end_to_end{latency_end_to_end="LatencyEndToEnd"} 15"#));

        cancel.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let listener = bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, LatencyMetrics::new().unwrap(), cancel.clone()));

        let response = reqwest::get(format!("http://{addr}/other")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

        cancel.cancel();
        server.await.unwrap().unwrap();
    }
}
