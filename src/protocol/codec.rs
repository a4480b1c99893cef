//! Pure encoders and decoders for the device datagrams

use super::AxisId;
use thiserror::Error;

pub const OPCODE_GET_POSITION: u32 = 0xD0;
pub const SUBCOMMAND_GET_POSITION: u32 = 0x11;
pub const OPCODE_SET_TRIM: u32 = 0xCE;
pub const SUBCOMMAND_SET_TRIM: u32 = 0x90;

pub const GET_POSITION_LEN: usize = 12;
pub const SET_TRIM_LEN: usize = 16;
/// Header (u16 + u8 + u16) plus one f32
pub const POSITION_RESPONSE_LEN: usize = 9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("malformed response: expected at least {expected} bytes, got {actual}")]
    MalformedResponse { expected: usize, actual: usize },

    #[error("malformed request: expected {expected} bytes, got {actual}")]
    RequestLength { expected: usize, actual: usize },

    #[error("unexpected opcode {opcode:#x} / subcommand {subcommand:#x}")]
    UnexpectedCommand { opcode: u32, subcommand: u32 },

    #[error("axis mask {0:#x} does not name exactly one axis")]
    UnknownAxis(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetPositionRequest {
    pub axis: AxisId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetTrimRequest {
    pub axis: AxisId,
    pub trim: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionResponse {
    pub length: u16,
    pub status: u8,
    pub node_id: u16,
    pub position: f32,
}

pub fn encode_get_position(request: GetPositionRequest) -> [u8; GET_POSITION_LEN] {
    let mut out = [0u8; GET_POSITION_LEN];
    out[0..4].copy_from_slice(&OPCODE_GET_POSITION.to_le_bytes());
    out[4..8].copy_from_slice(&request.axis.bits().to_le_bytes());
    out[8..12].copy_from_slice(&SUBCOMMAND_GET_POSITION.to_le_bytes());
    out
}

pub fn encode_set_trim(request: SetTrimRequest) -> [u8; SET_TRIM_LEN] {
    let mut out = [0u8; SET_TRIM_LEN];
    out[0..4].copy_from_slice(&OPCODE_SET_TRIM.to_le_bytes());
    out[4..8].copy_from_slice(&request.axis.bits().to_le_bytes());
    out[8..12].copy_from_slice(&SUBCOMMAND_SET_TRIM.to_le_bytes());
    out[12..16].copy_from_slice(&request.trim.to_le_bytes());
    out
}

/// Decodes the position reply. Only the first nine bytes are interpreted.
pub fn decode_position_response(data: &[u8]) -> Result<PositionResponse, ProtocolError> {
    let bytes: [u8; POSITION_RESPONSE_LEN] = data
        .get(..POSITION_RESPONSE_LEN)
        .and_then(|head| head.try_into().ok())
        .ok_or(ProtocolError::MalformedResponse {
            expected: POSITION_RESPONSE_LEN,
            actual: data.len(),
        })?;

    Ok(PositionResponse {
        length: u16::from_le_bytes([bytes[0], bytes[1]]),
        status: bytes[2],
        node_id: u16::from_le_bytes([bytes[3], bytes[4]]),
        position: f32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
    })
}

pub fn decode_get_position(data: &[u8]) -> Result<GetPositionRequest, ProtocolError> {
    let words = read_words::<GET_POSITION_LEN>(data)?;
    check_command(words[0], words[2], OPCODE_GET_POSITION, SUBCOMMAND_GET_POSITION)?;
    let axis = AxisId::from_bits(words[1]).ok_or(ProtocolError::UnknownAxis(words[1]))?;
    Ok(GetPositionRequest { axis })
}

pub fn decode_set_trim(data: &[u8]) -> Result<SetTrimRequest, ProtocolError> {
    let words = read_words::<SET_TRIM_LEN>(data)?;
    check_command(words[0], words[2], OPCODE_SET_TRIM, SUBCOMMAND_SET_TRIM)?;
    let axis = AxisId::from_bits(words[1]).ok_or(ProtocolError::UnknownAxis(words[1]))?;
    Ok(SetTrimRequest {
        axis,
        trim: f32::from_bits(words[3]),
    })
}

// Requests are matched by exact length, unlike responses.
fn read_words<const N: usize>(data: &[u8]) -> Result<Vec<u32>, ProtocolError> {
    if data.len() != N {
        return Err(ProtocolError::RequestLength {
            expected: N,
            actual: data.len(),
        });
    }
    Ok(data
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn check_command(
    opcode: u32,
    subcommand: u32,
    expected_opcode: u32,
    expected_subcommand: u32,
) -> Result<(), ProtocolError> {
    if opcode == expected_opcode && subcommand == expected_subcommand {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedCommand { opcode, subcommand })
    }
}
