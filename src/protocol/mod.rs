//! Wire protocol of the control loading device
//!
//! Commands are fixed-layout little-endian datagrams. A request is always a
//! sequence of `u32` words (opcode, axis bitmask, subcommand) optionally
//! followed by an `f32` argument. The device answers every request; the only
//! reply we interpret is the position response.
//!
//! ```text
//! GetPosition  [0xD0][axis][0x11]           12 bytes
//! SetTrim      [0xCE][axis][0x90][f32 trim] 16 bytes
//! Response     [u16 len][u8 status][u16 node][f32 position]...  >= 9 bytes
//! ```

pub mod codec;

pub use codec::{
    decode_get_position, decode_position_response, decode_set_trim, encode_get_position,
    encode_set_trim, GetPositionRequest, PositionResponse, ProtocolError, SetTrimRequest,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Controllable axes of the device, one bit each
///
/// The discriminants are protocol constants and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum AxisId {
    Elevator = 0x1,
    Aileron = 0x2,
    Rudder = 0x4,
    Collective = 0x8,
    BrakesLeft = 0x10,
    BrakesRight = 0x20,
    TrimElevator = 0x40,
    TrimAileron = 0x80,
    TrimRudder = 0x100,
    Throttle1 = 0x200,
    Throttle2 = 0x400,
    Throttle3 = 0x800,
    Throttle4 = 0x1000,
    SpeedBrake = 0x2000,
    NoseWheel = 0x4000,
    Seatshaker = 0x8000,
}

impl AxisId {
    pub const ALL: [AxisId; 16] = [
        AxisId::Elevator,
        AxisId::Aileron,
        AxisId::Rudder,
        AxisId::Collective,
        AxisId::BrakesLeft,
        AxisId::BrakesRight,
        AxisId::TrimElevator,
        AxisId::TrimAileron,
        AxisId::TrimRudder,
        AxisId::Throttle1,
        AxisId::Throttle2,
        AxisId::Throttle3,
        AxisId::Throttle4,
        AxisId::SpeedBrake,
        AxisId::NoseWheel,
        AxisId::Seatshaker,
    ];

    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Exact single-axis match; combined masks yield `None`
    pub fn from_bits(bits: u32) -> Option<AxisId> {
        Self::ALL.into_iter().find(|axis| axis.bits() == bits)
    }
}

impl From<AxisId> for u32 {
    fn from(axis: AxisId) -> Self {
        axis.bits()
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
