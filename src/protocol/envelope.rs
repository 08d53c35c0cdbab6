//! Transport-level message envelope
//!
//! Wire layout (big-endian, 11-byte header):
//!
//! ```text
//! [0]      kind        (1 = point-to-point, 2 = broadcast)
//! [1]      sender      module id
//! [2]      destination module id
//! [3..5]   sequence    u16, per-sender monotonic
//! [5]      flags       bit 0 = durable
//! [6]      tag
//! [7..11]  payload_len u32
//! [11..]   payload
//! ```
//!
//! `validate` is independent of `decode` and must pass before any field
//! of an untrusted buffer is trusted.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::protocol::{ModuleId, Tag};

const HEADER_LEN: usize = 11;
const FLAG_DURABLE: u8 = 0x01;

const KIND_OFFSET: usize = 0;
const SENDER_OFFSET: usize = 1;
const DESTINATION_OFFSET: usize = 2;
const SEQUENCE_OFFSET: usize = 3;
const FLAGS_OFFSET: usize = 5;
const TAG_OFFSET: usize = 6;
const PAYLOAD_LEN_OFFSET: usize = 7;

/// Delivery shape of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Addressed to a single module
    PointToPoint,
    /// Fabric-wide delivery (encoded but not implemented)
    Broadcast,
}

impl MessageKind {
    fn as_byte(self) -> u8 {
        match self {
            MessageKind::PointToPoint => 1,
            MessageKind::Broadcast => 2,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(MessageKind::PointToPoint),
            2 => Some(MessageKind::Broadcast),
            _ => None,
        }
    }
}

/// A decoded module-to-module message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: MessageKind,
    pub sender: ModuleId,
    pub destination: ModuleId,
    pub sequence: u16,
    pub durable: bool,
    pub tag: Tag,
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Serialize into the wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];
        buf[KIND_OFFSET] = self.kind.as_byte();
        buf[SENDER_OFFSET] = self.sender;
        buf[DESTINATION_OFFSET] = self.destination;
        BigEndian::write_u16(&mut buf[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 2], self.sequence);
        buf[FLAGS_OFFSET] = if self.durable { FLAG_DURABLE } else { 0 };
        buf[TAG_OFFSET] = self.tag;
        BigEndian::write_u32(
            &mut buf[PAYLOAD_LEN_OFFSET..PAYLOAD_LEN_OFFSET + 4],
            self.payload.len() as u32,
        );
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Structural validation of an untrusted buffer.
    ///
    /// Checks the header is complete, the kind byte is known, and the
    /// declared payload length equals the bytes actually present.
    pub fn validate(buf: &[u8]) -> Result<()> {
        if buf.len() < HEADER_LEN {
            return Err(Error::malformed(
                "envelope",
                format!("{} bytes is shorter than the {} byte header", buf.len(), HEADER_LEN),
            ));
        }
        if MessageKind::from_byte(buf[KIND_OFFSET]).is_none() {
            return Err(Error::malformed(
                "envelope",
                format!("unknown message kind {}", buf[KIND_OFFSET]),
            ));
        }
        let declared = BigEndian::read_u32(&buf[PAYLOAD_LEN_OFFSET..PAYLOAD_LEN_OFFSET + 4]) as usize;
        let present = buf.len() - HEADER_LEN;
        if declared != present {
            return Err(Error::malformed(
                "envelope",
                format!("declared payload of {} bytes but {} present", declared, present),
            ));
        }
        Ok(())
    }

    /// Deserialize a buffer that has already passed [`Envelope::validate`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::validate(buf)?;
        Ok(Self {
            // Kind byte checked by validate
            kind: MessageKind::from_byte(buf[KIND_OFFSET]).unwrap(),
            sender: buf[SENDER_OFFSET],
            destination: buf[DESTINATION_OFFSET],
            sequence: BigEndian::read_u16(&buf[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 2]),
            durable: buf[FLAGS_OFFSET] & FLAG_DURABLE != 0,
            tag: buf[TAG_OFFSET],
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }

}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
