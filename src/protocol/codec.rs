//! Coordinate wire codec
//!
//! Three representations of the same coordinate event:
//!
//! ```text
//! inbound  (4 bytes)  [ coordinate BE (4) ]
//! internal (u64)      [ sender LE (2) | coordinate BE (4) | reserved (2) ]  read as BE u64
//! outbound (6 bytes)  [ sender LE (2) | coordinate BE (4) ]
//! ```
//!
//! The sender id is little-endian while the coordinate is big-endian. Browser
//! clients read the outbound frame as a `Uint16Array`, so this byte order is
//! part of the wire contract and must not be normalized.

use crate::error::ProtocolError;

/// Size of an inbound coordinate payload
pub const INBOUND_FRAME_LEN: usize = 4;

/// Size of an outbound frame
pub const OUTBOUND_FRAME_LEN: usize = 6;

/// Sender id and coordinate packed into one scalar
///
/// Travels through the delivery channels without allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportValue(u64);

impl TransportValue {
    /// Pack a sender id and coordinate
    pub fn new(sender: u16, coordinate: u32) -> Self {
        encode_transport(sender, coordinate)
    }

    /// Wrap a raw packed value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw packed value
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Sender id carried in the value
    pub fn sender(self) -> u16 {
        let bytes = self.0.to_be_bytes();
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    /// Coordinate carried in the value
    pub fn coordinate(self) -> u32 {
        let bytes = self.0.to_be_bytes();
        u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]])
    }

    /// Encode as an outbound frame
    pub fn to_outbound(self) -> [u8; OUTBOUND_FRAME_LEN] {
        encode_outbound(self)
    }
}

/// Decode an inbound payload into a coordinate
///
/// The payload must be exactly [`INBOUND_FRAME_LEN`] bytes.
pub fn decode_inbound(payload: &[u8]) -> Result<u32, ProtocolError> {
    let bytes: [u8; INBOUND_FRAME_LEN] =
        payload
            .try_into()
            .map_err(|_| ProtocolError::MalformedFrame {
                expected: INBOUND_FRAME_LEN,
                actual: payload.len(),
            })?;

    Ok(u32::from_be_bytes(bytes))
}

/// Pack a sender id and coordinate into a transport value
pub fn encode_transport(sender: u16, coordinate: u32) -> TransportValue {
    let mut bytes = [0u8; 8];
    bytes[..2].copy_from_slice(&sender.to_le_bytes());
    bytes[2..6].copy_from_slice(&coordinate.to_be_bytes());
    // bytes[6..8] reserved, left zero

    TransportValue(u64::from_be_bytes(bytes))
}

/// Serialize a transport value as an outbound frame
///
/// Drops the two reserved bytes.
pub fn encode_outbound(value: TransportValue) -> [u8; OUTBOUND_FRAME_LEN] {
    let bytes = value.0.to_be_bytes();
    let mut frame = [0u8; OUTBOUND_FRAME_LEN];
    frame.copy_from_slice(&bytes[..OUTBOUND_FRAME_LEN]);
    frame
}

/// Parse an outbound frame into `(sender, coordinate)`
pub fn decode_outbound(frame: &[u8]) -> Result<(u16, u32), ProtocolError> {
    if frame.len() != OUTBOUND_FRAME_LEN {
        return Err(ProtocolError::MalformedFrame {
            expected: OUTBOUND_FRAME_LEN,
            actual: frame.len(),
        });
    }

    let sender = u16::from_le_bytes([frame[0], frame[1]]);
    let coordinate = u32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]]);
    Ok((sender, coordinate))
}
