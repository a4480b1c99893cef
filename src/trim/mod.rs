//! Trim control over the device's UDP command channel
//!
//! [`TrimClient`] owns the socket and the in-memory trim offsets. Everything
//! that wants to move trim goes through the [`TrimActuator`] trait so the
//! binding engine does not care whether it talks to the real device.

pub mod client;

pub use client::{TrimClient, TrimSettings};

use crate::protocol::{AxisId, ProtocolError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrimError {
    #[error("no reply from device within {after:?}")]
    Timeout { after: Duration },

    #[error("device reply could not be decoded: {0}")]
    MalformedResponse(#[from] ProtocolError),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations the trim functions are built from
///
/// All methods block for at most one read timeout per round trip.
pub trait TrimActuator: Send + Sync {
    fn read_axis_position(&self, axis: AxisId) -> Result<f32, TrimError>;

    fn apply_trim(&self, axis: AxisId, value: f32) -> Result<(), TrimError>;

    /// Reads the current position and makes it the new trim offset.
    ///
    /// Two round trips. If the second one fails the stored offset already
    /// holds the new position while the device keeps its previous trim.
    fn set_trim_to_current_position(&self, axis: AxisId) -> Result<f32, TrimError>;

    fn release_trim(&self, axis: AxisId) -> Result<(), TrimError>;

    /// Adds `delta` to the stored offset and applies the result.
    fn nudge_trim(&self, axis: AxisId, delta: f32) -> Result<f32, TrimError>;

    fn current_trim_offset(&self, axis: AxisId) -> f32;
}
