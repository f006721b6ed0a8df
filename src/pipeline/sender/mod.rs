//! Sender pipeline components
//!
//! One pacing stage per media kind reads a stored container and writes its
//! units to a local track at the container's own cadence:
//! ```text
//! Container → PacingStage → MediaSink → Network
//! ```

pub mod pacing_stage;

pub use pacing_stage::PacingStage;
