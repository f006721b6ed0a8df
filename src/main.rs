use crate::config::Config;
use crate::pipeline::sender::PacingStage;
use crate::pipeline::source::{IvfOpener, OggOpener, probe_video_codec};
use crate::pipeline::{ConnectivitySignal, MediaKind, PacingHealth, PipelineCoordinator, StageExit};
use crate::telemetry::{LatencyMetrics, TelemetryPipeline};
use crate::utils::net::PeerSession;
use crate::utils::net::metrics_server;
use crate::utils::net::webrtc_common::create_webrtc_api;
use anyhow::{Context, Result, anyhow, bail};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use std::{panic, process};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use webrtc::api::media_engine::MIME_TYPE_OPUS;

pub mod config;
pub mod pipeline;
pub mod telemetry;
pub mod utils;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

fn main() {
    tracing_subscriber::fmt::init();

    let conf = match Config::from_args() {
        Ok(conf) => conf,
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    };

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    let code = match runtime.block_on(run(conf)) {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    process::exit(code);
}

async fn run(conf: Config) -> Result<()> {
    let shutdown = CancellationToken::new();

    // first signal stops gracefully, a second one exits at once
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            if shutdown.is_cancelled() {
                process::exit(130);
            }
            info!("Interrupted, shutting down");
            shutdown.cancel();
        })
        .context("Error setting Ctrl-C handler")?;
    }

    let metrics = LatencyMetrics::new().context("failed to register latency metrics")?;
    let listener = metrics_server::bind(conf.metrics_addr).await?;
    let metrics_task = tokio::spawn(metrics_server::serve(
        listener,
        metrics.clone(),
        shutdown.clone(),
    ));

    let TelemetryPipeline { handler, mut writer } = TelemetryPipeline::start(
        metrics.clone(),
        &conf.log_path,
        conf.queue_capacity,
        conf.queue_policy,
    )?;
    info!("Logging data channel messages to {}", conf.log_path.display());

    let api = create_webrtc_api()?;
    let connected = ConnectivitySignal::new();
    let session =
        PeerSession::new(&api, &conf.ice_servers, connected.clone(), shutdown.clone()).await?;
    session.open_data_channel(Arc::clone(&handler)).await?;

    let mut coordinator = PipelineCoordinator::new(shutdown.clone());
    let mut health = Vec::new();

    if conf.has_video() {
        let codec = probe_video_codec(&conf.video_path)?;
        let mime_type = codec
            .mime_type()
            .ok_or_else(|| anyhow!("unsupported video codec {codec}"))?;
        let sink = session.add_track(MediaKind::Video, mime_type).await?;
        let stage = PacingStage::new(
            MediaKind::Video,
            Arc::new(IvfOpener {
                path: conf.video_path.clone(),
            }),
            Arc::new(sink),
            connected.clone(),
            conf.video_eos,
            shutdown.clone(),
        );
        health.push(stage.health());
        coordinator.add_stage(Box::new(stage));
    }

    if conf.has_audio() {
        let sink = session.add_track(MediaKind::Audio, MIME_TYPE_OPUS).await?;
        let stage = PacingStage::new(
            MediaKind::Audio,
            Arc::new(OggOpener {
                path: conf.audio_path.clone(),
            }),
            Arc::new(sink),
            connected.clone(),
            conf.audio_eos,
            shutdown.clone(),
        );
        health.push(stage.health());
        coordinator.add_stage(Box::new(stage));
    }

    if coordinator.is_empty() {
        bail!("nothing to send");
    }
    tokio::spawn(log_health(health, shutdown.clone()));

    tokio::select! {
        res = session.negotiate(&conf.offer_endpoint) => res?,
        _ = shutdown.cancelled() => info!("Stopped before negotiation completed"),
    }

    let stages = tokio::select! {
        res = coordinator.run() => res,
        res = &mut writer => {
            shutdown.cancel();
            session.close().await;
            return Err(writer_failure(res));
        }
    };

    shutdown.cancel();
    session.close().await;
    handler.close().await;

    let rows = writer.await.context("latency log writer panicked")??;
    info!(
        "Wrote {} latency rows ({} dropped, {} malformed)",
        rows,
        metrics.dropped(),
        metrics.malformed()
    );

    match metrics_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{:#}", e),
        Err(e) => warn!("metrics endpoint task failed: {}", e),
    }
    metrics.shutdown();

    match stages? {
        StageExit::Finished => info!("Playback finished"),
        StageExit::Cancelled => info!("Playback stopped"),
    }
    Ok(())
}

/// The writer only returns early when it can no longer log
fn writer_failure(res: Result<Result<u64>, JoinError>) -> anyhow::Error {
    match res {
        Ok(Ok(rows)) => anyhow!("latency log writer stopped after {rows} rows"),
        Ok(Err(e)) => e,
        Err(e) => anyhow!("latency log writer panicked: {e}"),
    }
}

async fn log_health(health: Vec<Arc<PacingHealth>>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(HEALTH_LOG_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for h in &health {
                    info!("{}", h.summary());
                }
            }
        }
    }
    for h in &health {
        info!("{}", h.summary());
    }
}
