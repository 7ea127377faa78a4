//! Voicelink datagram format
//!
//! Every datagram is a 2-byte big-endian sequence number followed by one
//! encoded audio frame. There is no further framing; the transport preserves
//! datagram boundaries.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Length of the sequence-number header in bytes
pub const SEQ_HEADER_LEN: usize = 2;

/// Largest datagram voicelink will send or accept
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// One voicelink datagram: sequence number plus encoded payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePacket {
    /// Cyclic 16-bit sequence number identifying emission order
    pub sequence: u16,
    /// Encoded audio payload
    pub payload: Bytes,
}

impl FramePacket {
    /// Create a packet from a sequence number and encoded payload
    pub fn new(sequence: u16, payload: Bytes) -> Self {
        Self { sequence, payload }
    }

    /// Parse a received datagram
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < SEQ_HEADER_LEN {
            return Err(Error::InvalidPacket(format!(
                "datagram too short: {} bytes",
                data.len()
            )));
        }
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(Error::InvalidPacket(format!(
                "datagram too large: {} bytes",
                data.len()
            )));
        }

        let sequence = u16::from_be_bytes([data[0], data[1]]);
        let payload = Bytes::copy_from_slice(&data[SEQ_HEADER_LEN..]);

        Ok(Self { sequence, payload })
    }

    /// Serialize into a datagram ready for the socket
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SEQ_HEADER_LEN + self.payload.len());
        buf.put_u16(self.sequence);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Total on-wire size in bytes
    pub fn size(&self) -> usize {
        SEQ_HEADER_LEN + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_then_parse() {
        let packet = FramePacket::new(0x1234, Bytes::from_static(b"\x01\x02\x03"));
        let wire = packet.serialize();

        assert_eq!(wire.len(), 5);
        assert_eq!(&wire[..2], &[0x12, 0x34]);

        let parsed = FramePacket::parse(&wire).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn empty_payload_is_valid() {
        let parsed = FramePacket::parse(&[0xff, 0xff]).unwrap();
        assert_eq!(parsed.sequence, 65535);
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn short_datagram_is_rejected() {
        assert!(FramePacket::parse(&[]).is_err());
        assert!(FramePacket::parse(&[0x01]).is_err());
    }

    #[test]
    fn oversized_datagram_is_rejected() {
        let data = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        assert!(FramePacket::parse(&data).is_err());
    }
}
