//! Fixed header for the WEFT wire protocol
//!
//! Fixed header is 40 bytes:
//! - Bytes 0-1: Magic ("WF")
//! - Byte 2: Wire version
//! - Byte 3: Frame kind
//! - Bytes 4-35: Space key
//! - Bytes 36-39: Payload length (LE)

use weft_core::{SpaceKey, WeftError, WeftResult, KEY_LEN};

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 40;

/// Magic bytes identifying a WEFT frame.
pub const WIRE_MAGIC: [u8; 2] = *b"WF";

/// Current wire protocol version.
pub const WIRE_VERSION: u8 = 1;

/// Upper bound on a frame payload; a peer announcing more is malformed.
pub const MAX_FRAME_PAYLOAD: usize = 1 << 20;

/// Frame kind discriminants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Handshake = 0x01,
    HandshakeAck = 0x02,
    TimeframeExchange = 0x10,
    MessageBatch = 0x20,
    Close = 0x30,
}

impl FrameKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(FrameKind::Handshake),
            0x02 => Some(FrameKind::HandshakeAck),
            0x10 => Some(FrameKind::TimeframeExchange),
            0x20 => Some(FrameKind::MessageBatch),
            0x30 => Some(FrameKind::Close),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Parsed fixed header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub kind: FrameKind,
    pub space: SpaceKey,
    pub payload_len: u32,
}

impl FrameHeader {
    pub fn new(kind: FrameKind, space: SpaceKey, payload_len: u32) -> Self {
        FrameHeader {
            version: WIRE_VERSION,
            kind,
            space,
            payload_len,
        }
    }

    /// Parse a header from the first `HEADER_SIZE` bytes of `buf`.
    pub fn parse(buf: &[u8]) -> WeftResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(WeftError::BufferTooShort {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }
        if buf[0..2] != WIRE_MAGIC {
            return Err(WeftError::InvalidWireFormat("bad magic".into()));
        }
        let version = buf[2];
        if version != WIRE_VERSION {
            return Err(WeftError::UnsupportedVersion(version));
        }
        let kind = FrameKind::from_byte(buf[3]).ok_or(WeftError::UnknownFrameKind(buf[3]))?;
        let space = SpaceKey::from_slice(&buf[4..4 + KEY_LEN])
            .ok_or_else(|| WeftError::InvalidWireFormat("bad space key".into()))?;
        let payload_len = u32::from_le_bytes(buf[36..40].try_into().unwrap());
        if payload_len as usize > MAX_FRAME_PAYLOAD {
            return Err(WeftError::InvalidWireFormat(format!(
                "payload too large: {payload_len}"
            )));
        }
        Ok(FrameHeader {
            version,
            kind,
            space,
            payload_len,
        })
    }

    /// Serialize the header into the first `HEADER_SIZE` bytes of `buf`.
    pub fn serialize(&self, buf: &mut [u8]) -> WeftResult<()> {
        if buf.len() < HEADER_SIZE {
            return Err(WeftError::BufferTooShort {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }
        buf[0..2].copy_from_slice(&WIRE_MAGIC);
        buf[2] = self.version;
        buf[3] = self.kind.to_byte();
        buf[4..4 + KEY_LEN].copy_from_slice(self.space.as_bytes());
        buf[36..40].copy_from_slice(&self.payload_len.to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader::new(FrameKind::MessageBatch, SpaceKey::new([5; 32]), 1234);
        let mut buf = [0u8; HEADER_SIZE];
        header.serialize(&mut buf).unwrap();
        assert_eq!(FrameHeader::parse(&buf).unwrap(), header);
    }

    #[test]
    fn test_header_bad_magic() {
        let header = FrameHeader::new(FrameKind::Close, SpaceKey::new([1; 32]), 0);
        let mut buf = [0u8; HEADER_SIZE];
        header.serialize(&mut buf).unwrap();
        buf[0] = b'X';
        assert!(FrameHeader::parse(&buf).is_err());
    }

    #[test]
    fn test_header_unknown_kind() {
        let header = FrameHeader::new(FrameKind::Handshake, SpaceKey::new([1; 32]), 0);
        let mut buf = [0u8; HEADER_SIZE];
        header.serialize(&mut buf).unwrap();
        buf[3] = 0x7F;
        assert!(matches!(
            FrameHeader::parse(&buf),
            Err(WeftError::UnknownFrameKind(0x7F))
        ));
    }

    #[test]
    fn test_header_version_gate() {
        let header = FrameHeader::new(FrameKind::Handshake, SpaceKey::new([1; 32]), 0);
        let mut buf = [0u8; HEADER_SIZE];
        header.serialize(&mut buf).unwrap();
        buf[2] = WIRE_VERSION + 1;
        assert!(matches!(
            FrameHeader::parse(&buf),
            Err(WeftError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_header_payload_bound() {
        let header = FrameHeader::new(
            FrameKind::MessageBatch,
            SpaceKey::new([1; 32]),
            (MAX_FRAME_PAYLOAD + 1) as u32,
        );
        let mut buf = [0u8; HEADER_SIZE];
        header.serialize(&mut buf).unwrap();
        assert!(FrameHeader::parse(&buf).is_err());
    }
}
