//! Frame bodies for the WEFT wire protocol

use weft_core::{
    DeviceKey, FeedKey, IdentityKey, Message, SpaceKey, Timeframe, WeftError, WeftResult, KEY_LEN,
};

use crate::{FrameHeader, FrameKind, HEADER_SIZE, MAX_FRAME_PAYLOAD};

/// Length of an invitation secret on the wire.
pub const SECRET_LEN: usize = 32;

/// Invitation-authenticated handshake: the single-use secret plus the
/// guest's keys, which the inviter needs to issue admission credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvitationAuth {
    pub secret: [u8; SECRET_LEN],
    pub identity: IdentityKey,
    pub device: DeviceKey,
    pub feed: FeedKey,
}

/// A complete wire frame: space-scoped header plus kind-specific body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub space: SpaceKey,
    pub body: FrameBody,
}

/// Kind-specific frame contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameBody {
    /// Opens a session. Carries invitation auth when the sender is not
    /// yet in the trust graph.
    Handshake { auth: Option<InvitationAuth> },
    /// Accepts or rejects a handshake.
    HandshakeAck { accepted: bool, reason: String },
    /// Advertises replication progress.
    TimeframeExchange { timeframe: Timeframe },
    /// A contiguous run of messages from one feed, ascending seq.
    MessageBatch {
        feed: FeedKey,
        messages: Vec<Message>,
    },
    /// Orderly teardown.
    Close { reason: String },
}

impl FrameBody {
    pub fn kind(&self) -> FrameKind {
        match self {
            FrameBody::Handshake { .. } => FrameKind::Handshake,
            FrameBody::HandshakeAck { .. } => FrameKind::HandshakeAck,
            FrameBody::TimeframeExchange { .. } => FrameKind::TimeframeExchange,
            FrameBody::MessageBatch { .. } => FrameKind::MessageBatch,
            FrameBody::Close { .. } => FrameKind::Close,
        }
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            FrameBody::Handshake { auth } => match auth {
                Some(auth) => {
                    buf.push(1);
                    buf.extend_from_slice(&auth.secret);
                    buf.extend_from_slice(auth.identity.as_bytes());
                    buf.extend_from_slice(auth.device.as_bytes());
                    buf.extend_from_slice(auth.feed.as_bytes());
                }
                None => buf.push(0),
            },
            FrameBody::HandshakeAck { accepted, reason } => {
                buf.push(u8::from(*accepted));
                buf.extend_from_slice(&(reason.len() as u16).to_le_bytes());
                buf.extend_from_slice(reason.as_bytes());
            }
            FrameBody::TimeframeExchange { timeframe } => {
                let entries = timeframe.to_entries();
                buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
                for (feed, count) in entries {
                    buf.extend_from_slice(feed.as_bytes());
                    buf.extend_from_slice(&count.to_le_bytes());
                }
            }
            FrameBody::MessageBatch { feed, messages } => {
                buf.extend_from_slice(feed.as_bytes());
                buf.extend_from_slice(&(messages.len() as u16).to_le_bytes());
                for message in messages {
                    buf.extend_from_slice(&message.encode());
                }
            }
            FrameBody::Close { reason } => {
                buf.extend_from_slice(&(reason.len() as u16).to_le_bytes());
                buf.extend_from_slice(reason.as_bytes());
            }
        }
        buf
    }

    fn decode_payload(kind: FrameKind, buf: &[u8]) -> WeftResult<Self> {
        match kind {
            FrameKind::Handshake => {
                if buf.is_empty() {
                    return Err(WeftError::BufferTooShort {
                        expected: 1,
                        actual: 0,
                    });
                }
                let auth = match buf[0] {
                    0 => None,
                    1 => {
                        let expected = 1 + SECRET_LEN + 3 * KEY_LEN;
                        if buf.len() < expected {
                            return Err(WeftError::BufferTooShort {
                                expected,
                                actual: buf.len(),
                            });
                        }
                        let secret: [u8; SECRET_LEN] =
                            buf[1..1 + SECRET_LEN].try_into().unwrap();
                        let mut offset = 1 + SECRET_LEN;
                        let identity = IdentityKey::from_slice(&buf[offset..offset + KEY_LEN])
                            .ok_or_else(|| {
                                WeftError::InvalidWireFormat("bad identity key".into())
                            })?;
                        offset += KEY_LEN;
                        let device = DeviceKey::from_slice(&buf[offset..offset + KEY_LEN])
                            .ok_or_else(|| WeftError::InvalidWireFormat("bad device key".into()))?;
                        offset += KEY_LEN;
                        let feed = FeedKey::from_slice(&buf[offset..offset + KEY_LEN])
                            .ok_or_else(|| WeftError::InvalidWireFormat("bad feed key".into()))?;
                        Some(InvitationAuth {
                            secret,
                            identity,
                            device,
                            feed,
                        })
                    }
                    b => {
                        return Err(WeftError::InvalidWireFormat(format!(
                            "bad auth flag {b:#04x}"
                        )))
                    }
                };
                Ok(FrameBody::Handshake { auth })
            }
            FrameKind::HandshakeAck => {
                if buf.len() < 3 {
                    return Err(WeftError::BufferTooShort {
                        expected: 3,
                        actual: buf.len(),
                    });
                }
                let accepted = buf[0] != 0;
                let len = u16::from_le_bytes([buf[1], buf[2]]) as usize;
                let reason = buf
                    .get(3..3 + len)
                    .ok_or(WeftError::BufferTooShort {
                        expected: 3 + len,
                        actual: buf.len(),
                    })
                    .and_then(|bytes| {
                        String::from_utf8(bytes.to_vec())
                            .map_err(|_| WeftError::InvalidWireFormat("bad utf8 reason".into()))
                    })?;
                Ok(FrameBody::HandshakeAck { accepted, reason })
            }
            FrameKind::TimeframeExchange => {
                if buf.len() < 4 {
                    return Err(WeftError::BufferTooShort {
                        expected: 4,
                        actual: buf.len(),
                    });
                }
                let count = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
                let entry_size = KEY_LEN + 8;
                let expected = 4 + count * entry_size;
                if buf.len() < expected {
                    return Err(WeftError::BufferTooShort {
                        expected,
                        actual: buf.len(),
                    });
                }
                let mut entries = Vec::with_capacity(count);
                let mut offset = 4;
                for _ in 0..count {
                    let feed = FeedKey::from_slice(&buf[offset..offset + KEY_LEN])
                        .ok_or_else(|| WeftError::InvalidWireFormat("bad feed key".into()))?;
                    let count = u64::from_le_bytes(
                        buf[offset + KEY_LEN..offset + entry_size].try_into().unwrap(),
                    );
                    entries.push((feed, count));
                    offset += entry_size;
                }
                Ok(FrameBody::TimeframeExchange {
                    timeframe: Timeframe::from_entries(entries),
                })
            }
            FrameKind::MessageBatch => {
                if buf.len() < KEY_LEN + 2 {
                    return Err(WeftError::BufferTooShort {
                        expected: KEY_LEN + 2,
                        actual: buf.len(),
                    });
                }
                let feed = FeedKey::from_slice(&buf[0..KEY_LEN])
                    .ok_or_else(|| WeftError::InvalidWireFormat("bad feed key".into()))?;
                let count = u16::from_le_bytes([buf[KEY_LEN], buf[KEY_LEN + 1]]) as usize;
                let mut offset = KEY_LEN + 2;
                let mut messages = Vec::with_capacity(count);
                for _ in 0..count {
                    let (message, used) = Message::decode(&buf[offset..])?;
                    if message.feed != feed {
                        return Err(WeftError::InvalidWireFormat(
                            "batch message from foreign feed".into(),
                        ));
                    }
                    messages.push(message);
                    offset += used;
                }
                if offset != buf.len() {
                    return Err(WeftError::InvalidWireFormat(
                        "trailing bytes after batch".into(),
                    ));
                }
                Ok(FrameBody::MessageBatch { feed, messages })
            }
            FrameKind::Close => {
                if buf.len() < 2 {
                    return Err(WeftError::BufferTooShort {
                        expected: 2,
                        actual: buf.len(),
                    });
                }
                let len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
                let reason = buf
                    .get(2..2 + len)
                    .ok_or(WeftError::BufferTooShort {
                        expected: 2 + len,
                        actual: buf.len(),
                    })
                    .and_then(|bytes| {
                        String::from_utf8(bytes.to_vec())
                            .map_err(|_| WeftError::InvalidWireFormat("bad utf8 reason".into()))
                    })?;
                Ok(FrameBody::Close { reason })
            }
        }
    }
}

impl Frame {
    pub fn new(space: SpaceKey, body: FrameBody) -> Self {
        Frame { space, body }
    }

    /// Serialize header + body to bytes.
    pub fn serialize(&self) -> WeftResult<Vec<u8>> {
        let payload = self.body.encode_payload();
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(WeftError::InvalidWireFormat(format!(
                "frame too large: {}",
                payload.len()
            )));
        }
        let header = FrameHeader::new(self.body.kind(), self.space, payload.len() as u32);
        let mut buf = vec![0u8; HEADER_SIZE + payload.len()];
        header.serialize(&mut buf)?;
        buf[HEADER_SIZE..].copy_from_slice(&payload);
        Ok(buf)
    }

    /// Parse one complete frame from `buf`, returning it and the bytes
    /// consumed.
    pub fn parse(buf: &[u8]) -> WeftResult<(Self, usize)> {
        let header = FrameHeader::parse(buf)?;
        let total = HEADER_SIZE + header.payload_len as usize;
        if buf.len() < total {
            return Err(WeftError::BufferTooShort {
                expected: total,
                actual: buf.len(),
            });
        }
        let body = FrameBody::decode_payload(header.kind, &buf[HEADER_SIZE..total])?;
        Ok((
            Frame {
                space: header.space,
                body,
            },
            total,
        ))
    }

    /// Decode a body from an already-read header and payload, as a
    /// streaming reader does.
    pub fn from_parts(header: FrameHeader, payload: &[u8]) -> WeftResult<Self> {
        if payload.len() != header.payload_len as usize {
            return Err(WeftError::InvalidWireFormat(
                "payload length mismatch".into(),
            ));
        }
        let body = FrameBody::decode_payload(header.kind, payload)?;
        Ok(Frame {
            space: header.space,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;
    use weft_core::{Payload, SIGNATURE_LEN};

    fn space() -> SpaceKey {
        SpaceKey::new([3; 32])
    }

    fn roundtrip(frame: Frame) {
        let bytes = frame.serialize().unwrap();
        let (parsed, used) = Frame::parse(&bytes).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn test_handshake_roundtrip() {
        roundtrip(Frame::new(space(), FrameBody::Handshake { auth: None }));
        roundtrip(Frame::new(
            space(),
            FrameBody::Handshake {
                auth: Some(InvitationAuth {
                    secret: [0xAA; SECRET_LEN],
                    identity: IdentityKey::new([1; 32]),
                    device: DeviceKey::new([2; 32]),
                    feed: FeedKey::new([3; 32]),
                }),
            },
        ));
    }

    #[test]
    fn test_handshake_ack_roundtrip() {
        roundtrip(Frame::new(
            space(),
            FrameBody::HandshakeAck {
                accepted: false,
                reason: "unknown space".into(),
            },
        ));
    }

    #[test]
    fn test_timeframe_roundtrip() {
        let mut timeframe = Timeframe::new();
        timeframe.set(FeedKey::new([1; 32]), 7);
        timeframe.set(FeedKey::new([2; 32]), 1);
        roundtrip(Frame::new(
            space(),
            FrameBody::TimeframeExchange { timeframe },
        ));
    }

    #[test]
    fn test_message_batch_roundtrip() {
        let feed = FeedKey::new([9; 32]);
        let messages = (0..3)
            .map(|seq| Message {
                feed,
                seq,
                payload: Payload::Data(Bytes::from(vec![seq as u8; 10])),
                signature: [seq as u8; SIGNATURE_LEN],
            })
            .collect();
        roundtrip(Frame::new(space(), FrameBody::MessageBatch { feed, messages }));
    }

    #[test]
    fn test_batch_rejects_foreign_feed() {
        let feed = FeedKey::new([9; 32]);
        let stray = Message {
            feed: FeedKey::new([8; 32]),
            seq: 0,
            payload: Payload::Data(Bytes::from_static(b"x")),
            signature: [0; SIGNATURE_LEN],
        };
        let frame = Frame::new(
            space(),
            FrameBody::MessageBatch {
                feed,
                messages: vec![stray],
            },
        );
        let bytes = frame.serialize().unwrap();
        assert!(Frame::parse(&bytes).is_err());
    }

    #[test]
    fn test_close_roundtrip() {
        roundtrip(Frame::new(
            space(),
            FrameBody::Close {
                reason: "bye".into(),
            },
        ));
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = Frame::parse(&bytes);
        }

        #[test]
        fn prop_close_reason_roundtrip(reason in ".{0,64}") {
            let frame = Frame::new(space(), FrameBody::Close { reason });
            let bytes = frame.serialize().unwrap();
            let (parsed, _) = Frame::parse(&bytes).unwrap();
            prop_assert_eq!(parsed, frame);
        }
    }
}
