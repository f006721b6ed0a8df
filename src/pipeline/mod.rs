//! Pipeline abstraction layer
//!
//! This module provides the media side of the application:
//! - Sources: IVF/Ogg containers read from disk
//! - Pacing: one stage per media kind emitting units on a timer
//! - Sinks: local WebRTC tracks receiving the paced units
//!
//! # Architecture
//!
//! - Each stage runs in its own async task
//! - Stages implement the `PipelineStage` trait
//! - The coordinator runs stages under one cancellation token
//! - `ConnectivitySignal` holds every pacing stage until the transport is up

pub mod clock;
pub mod health;
pub mod sender;
pub mod signal;
pub mod sink;
pub mod source;
pub mod stage;
pub mod types;

pub use health::PacingHealth;
pub use signal::ConnectivitySignal;
pub use stage::{PipelineCoordinator, PipelineStage, StageExit};
pub use types::{EosPolicy, MediaKind, TimedUnit};
