//! Pipeline stage trait and coordinator
//!
//! Defines the interface for pipeline stages and provides a coordinator
//! that runs them concurrently under a shared cancellation token.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{error, info};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How a stage finished when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExit {
    /// The stage ran out of work and asks the process to shut down
    Finished,
    /// The stage stopped because its cancellation token fired
    Cancelled,
}

/// Trait for pipeline stages that process media data
#[async_trait]
pub trait PipelineStage: Send {
    /// Run the stage until it finishes, is cancelled or fails
    async fn run(&mut self) -> Result<StageExit>;

    /// Get the name of this stage for logging
    fn name(&self) -> &'static str;

    /// Gracefully shutdown the stage
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Pipeline coordinator that manages stage lifecycle
///
/// Stages run on their own tasks. The first failure or the first
/// [`StageExit::Finished`] cancels every other stage.
pub struct PipelineCoordinator {
    stages: Vec<Box<dyn PipelineStage>>,
    cancel: CancellationToken,
}

impl PipelineCoordinator {
    /// Create a new pipeline coordinator bound to `cancel`
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            stages: Vec::new(),
            cancel,
        }
    }

    /// Add a stage to the pipeline
    pub fn add_stage(&mut self, stage: Box<dyn PipelineStage>) {
        self.stages.push(stage);
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run all stages, returning once the pipeline as a whole is done
    pub async fn run(self) -> Result<StageExit> {
        let mut tasks = JoinSet::new();
        for mut stage in self.stages {
            tasks.spawn(async move {
                let name = stage.name();
                let res = stage.run().await;
                if let Err(e) = stage.shutdown().await {
                    error!("{}: shutdown failed: {:#}", name, e);
                }
                (name, res)
            });
        }

        let mut outcome = StageExit::Cancelled;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(StageExit::Finished))) => {
                    info!("{}: finished", name);
                    outcome = StageExit::Finished;
                    self.cancel.cancel();
                }
                Ok((name, Ok(StageExit::Cancelled))) => {
                    info!("{}: stopped", name);
                }
                Ok((name, Err(e))) => {
                    self.cancel.cancel();
                    tasks.abort_all();
                    return Err(e.context(format!("{name} failed")));
                }
                Err(e) => {
                    self.cancel.cancel();
                    tasks.abort_all();
                    return Err(anyhow!("pipeline stage panicked: {e}"));
                }
            }
        }
        Ok(outcome)
    }
}
