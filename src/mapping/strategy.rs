//! What each trim function does to the actuator

use super::binding::TrimFunction;
use crate::protocol::AxisId;
use crate::trim::{TrimActuator, TrimError};

/// Parameters shared by every action
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionContext {
    pub axis: AxisId,
    /// Offset change of one left/right nudge
    pub step: f32,
}

pub trait TrimAction {
    /// Performs the action and returns the resulting trim offset.
    fn apply(&self, trim: &dyn TrimActuator, context: &ActionContext) -> Result<f32, TrimError>;
}

impl TrimAction for TrimFunction {
    fn apply(&self, trim: &dyn TrimActuator, context: &ActionContext) -> Result<f32, TrimError> {
        match self {
            TrimFunction::Set => trim.set_trim_to_current_position(context.axis),
            TrimFunction::Release => trim.release_trim(context.axis).map(|()| 0.0),
            TrimFunction::Left => trim.nudge_trim(context.axis, -context.step),
            TrimFunction::Right => trim.nudge_trim(context.axis, context.step),
        }
    }
}
