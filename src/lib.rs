//! Tap-tempo estimation.
//!
//! [`TempoEstimator`] turns a stream of tap timestamps into a smoothed BPM
//! estimate. [`TapSession`] runs one on its own thread and fires the
//! inactivity timeout for you.

pub mod config;
pub mod error;
pub mod estimator;
pub mod input;
#[cfg(feature = "midi")]
pub mod midi;
pub mod session;

pub use config::{AppConfig, MidiConfig, TempoConfig};
pub use error::{Error, Result};
pub use estimator::{Estimate, TapOutcome, TempoEstimator, Timestamp, TrackingState};
pub use session::{ResetReason, SessionHandle, Snapshot, TapSession, TempoEvent};
