//! Pacing stage for the sender pipeline
//!
//! Reads units from a container at the cadence given by its timing metadata
//! and hands each one to a media sink, looping or stopping at end-of-stream.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pipeline::PipelineStage;
use crate::pipeline::clock::{FRAME_DURATION, pacing_interval, page_duration};
use crate::pipeline::health::PacingHealth;
use crate::pipeline::signal::ConnectivitySignal;
use crate::pipeline::sink::MediaSink;
use crate::pipeline::source::{FrameSource, SourceOpener, SourceUnit};
use crate::pipeline::stage::StageExit;
use crate::pipeline::types::{EosPolicy, MediaKind, StreamTiming, TimedUnit};

/// Pacing stage: one per media kind
pub struct PacingStage {
    kind: MediaKind,
    opener: Arc<dyn SourceOpener>,
    sink: Arc<dyn MediaSink>,
    connected: ConnectivitySignal,
    eos_policy: EosPolicy,
    cancel: CancellationToken,
    health: Arc<PacingHealth>,
}

impl PacingStage {
    pub fn new(
        kind: MediaKind,
        opener: Arc<dyn SourceOpener>,
        sink: Arc<dyn MediaSink>,
        connected: ConnectivitySignal,
        eos_policy: EosPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            kind,
            opener,
            sink,
            connected,
            eos_policy,
            cancel,
            health: Arc::new(PacingHealth::new(kind)),
        }
    }

    pub fn health(&self) -> Arc<PacingHealth> {
        Arc::clone(&self.health)
    }

    fn open(&self) -> Result<Box<dyn FrameSource>> {
        self.opener
            .open()
            .with_context(|| format!("{}: cannot open {}", self.kind, self.opener.describe()))
    }

    /// Drains sink feedback until the sink closes or `scope` is cancelled.
    fn spawn_feedback_drain(&self, scope: CancellationToken) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let kind = self.kind;
        tokio::spawn(async move {
            tokio::select! {
                res = sink.drain_feedback() => {
                    if let Err(e) = res {
                        debug!("{}: feedback drain ended: {:#}", kind, e);
                    }
                }
                _ = scope.cancelled() => {}
            }
        })
    }

    async fn pace(&self, scope: &CancellationToken) -> Result<StageExit> {
        let mut source = self.open()?;

        tokio::select! {
            biased;
            _ = scope.cancelled() => return Ok(StageExit::Cancelled),
            _ = self.connected.wait() => {}
        }
        info!("{}: connected, pacing {}", self.kind, self.opener.describe());

        loop {
            let timing = source.timing();
            let interval = pacing_interval(timing)
                .with_context(|| format!("{}: bad stream timing {:?}", self.kind, timing))?;
            let mut ticker = tokio::time::interval(interval);
            let mut last_granule = 0u64;
            let mut sent = 0u64;
            debug!("{}: interval {:?}", self.kind, interval);

            loop {
                tokio::select! {
                    biased;
                    _ = scope.cancelled() => return Ok(StageExit::Cancelled),
                    _ = ticker.tick() => {}
                }

                let next = source
                    .next_unit()
                    .with_context(|| format!("{}: read failed", self.kind))?;
                let Some(unit) = next else {
                    break;
                };
                let size = unit.data.len();
                let duration = unit_duration(timing, &unit, &mut last_granule);
                self.sink
                    .write(TimedUnit {
                        data: unit.data,
                        duration,
                    })
                    .await?;
                self.health.record_unit(size);
                sent += 1;
            }

            match self.eos_policy {
                EosPolicy::Exit => {
                    info!("{}: all units parsed and sent", self.kind);
                    return Ok(StageExit::Finished);
                }
                EosPolicy::Loop if sent == 0 => {
                    bail!("{}: {} holds no units to loop", self.kind, self.opener.describe());
                }
                EosPolicy::Loop => {
                    info!("{}: reached end of stream, restarting...", self.kind);
                    drop(source);
                    source = self.open()?;
                    self.health.record_reopen();
                }
            }
        }
    }
}

/// Intended playout duration of a unit.
///
/// Frames get the fixed [`FRAME_DURATION`]; pages the granule delta since the
/// previous page, with `last_granule` advanced on every page.
fn unit_duration(timing: StreamTiming, unit: &SourceUnit, last_granule: &mut u64) -> Duration {
    match timing {
        StreamTiming::TimeBase { .. } => FRAME_DURATION,
        StreamTiming::SampleRate(rate) => {
            let granule = unit.granule_position.unwrap_or(*last_granule);
            let duration = page_duration(granule, *last_granule, rate);
            *last_granule = granule;
            duration
        }
    }
}

#[async_trait]
impl PipelineStage for PacingStage {
    async fn run(&mut self) -> Result<StageExit> {
        let scope = self.cancel.child_token();
        let feedback = self.spawn_feedback_drain(scope.clone());

        let res = self.pace(&scope).await;

        scope.cancel();
        let _ = feedback.await;
        info!("{}", self.health.summary());
        res
    }

    fn name(&self) -> &'static str {
        match self.kind {
            MediaKind::Video => "VideoPacingStage",
            MediaKind::Audio => "AudioPacingStage",
        }
    }
}
