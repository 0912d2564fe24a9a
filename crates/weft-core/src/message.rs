//! Feed messages, payloads and credentials
//!
//! A message is one entry of a single-writer feed: `(feed, seq, payload)`
//! plus an Ed25519 signature over exactly those three fields. Payloads
//! are either credentials (trust-graph mutations) or opaque data
//! mutations owned by the external merge layer.

use bytes::Bytes;

use crate::{FeedKey, IdentityKey, PrincipalKey, WeftError, WeftResult, KEY_LEN};

/// Ed25519 signature length.
pub const SIGNATURE_LEN: usize = 64;

/// One signed entry of a feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub feed: FeedKey,
    pub seq: u64,
    pub payload: Payload,
    pub signature: [u8; SIGNATURE_LEN],
}

/// Message payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// A trust-graph assertion.
    Credential(Credential),
    /// An opaque data mutation for the external consumer.
    Data(Bytes),
}

/// A signed assertion establishing or revoking trust.
///
/// `proof` is the issuer's signature over `(issuer, subject)` and binds
/// the assertion to the issuer key, independent of which feed carries
/// the credential. Without it, any feed writer could forge credentials
/// in another principal's name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub issuer: PrincipalKey,
    pub subject: Subject,
    pub proof: [u8; SIGNATURE_LEN],
}

/// The principal a credential is about, and what is asserted of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subject {
    pub id: PrincipalKey,
    pub assertion: Assertion,
}

/// Closed set of credential assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Assertion {
    /// Declares a new identity root; self-signed (issuer == subject).
    IdentityGenesis,
    /// Admits a device key under an existing identity.
    DeviceAdmit { identity: IdentityKey },
    /// Admits an identity as a member, optionally scoped to feeds it
    /// may write (empty scope = unrestricted).
    SpaceMember { feed_scope: Vec<FeedKey> },
    /// Authorizes a feed to write space data for an admitted member.
    FeedAdmit { member: IdentityKey },
    /// Revokes a member. Forward-only; nothing is rewritten.
    SpaceMemberRevoke,
}

impl Assertion {
    #[inline]
    pub fn tag(&self) -> u8 {
        match self {
            Assertion::IdentityGenesis => 0x01,
            Assertion::DeviceAdmit { .. } => 0x02,
            Assertion::SpaceMember { .. } => 0x03,
            Assertion::FeedAdmit { .. } => 0x04,
            Assertion::SpaceMemberRevoke => 0x05,
        }
    }
}

fn need(buf: &[u8], expected: usize) -> WeftResult<()> {
    if buf.len() < expected {
        return Err(WeftError::BufferTooShort {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn take_key(buf: &[u8], offset: usize) -> WeftResult<[u8; KEY_LEN]> {
    need(buf, offset + KEY_LEN)?;
    Ok(buf[offset..offset + KEY_LEN].try_into().unwrap())
}

fn encode_principal(buf: &mut Vec<u8>, principal: &PrincipalKey) {
    buf.push(principal.tag());
    buf.extend_from_slice(principal.key_bytes());
}

fn decode_principal(buf: &[u8], offset: usize) -> WeftResult<(PrincipalKey, usize)> {
    need(buf, offset + 1 + KEY_LEN)?;
    let tag = buf[offset];
    let bytes = take_key(buf, offset + 1)?;
    let principal = PrincipalKey::from_tag(tag, bytes)
        .ok_or_else(|| WeftError::InvalidWireFormat(format!("bad principal tag {tag:#04x}")))?;
    Ok((principal, offset + 1 + KEY_LEN))
}

impl Assertion {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag());
        match self {
            Assertion::IdentityGenesis | Assertion::SpaceMemberRevoke => {}
            Assertion::DeviceAdmit { identity } => {
                buf.extend_from_slice(identity.as_bytes());
            }
            Assertion::SpaceMember { feed_scope } => {
                buf.extend_from_slice(&(feed_scope.len() as u16).to_le_bytes());
                for feed in feed_scope {
                    buf.extend_from_slice(feed.as_bytes());
                }
            }
            Assertion::FeedAdmit { member } => {
                buf.extend_from_slice(member.as_bytes());
            }
        }
    }

    pub fn decode(buf: &[u8], offset: usize) -> WeftResult<(Self, usize)> {
        need(buf, offset + 1)?;
        let tag = buf[offset];
        let offset = offset + 1;
        match tag {
            0x01 => Ok((Assertion::IdentityGenesis, offset)),
            0x02 => {
                let identity = IdentityKey::new(take_key(buf, offset)?);
                Ok((Assertion::DeviceAdmit { identity }, offset + KEY_LEN))
            }
            0x03 => {
                need(buf, offset + 2)?;
                let count = u16::from_le_bytes([buf[offset], buf[offset + 1]]) as usize;
                let mut offset = offset + 2;
                let mut feed_scope = Vec::with_capacity(count);
                for _ in 0..count {
                    feed_scope.push(FeedKey::new(take_key(buf, offset)?));
                    offset += KEY_LEN;
                }
                Ok((Assertion::SpaceMember { feed_scope }, offset))
            }
            0x04 => {
                let member = IdentityKey::new(take_key(buf, offset)?);
                Ok((Assertion::FeedAdmit { member }, offset + KEY_LEN))
            }
            0x05 => Ok((Assertion::SpaceMemberRevoke, offset)),
            _ => Err(WeftError::UnknownAssertionTag(tag)),
        }
    }
}

impl Credential {
    /// Build an unsigned credential; the issuer's proof is filled in by
    /// whoever holds the issuer key.
    pub fn new(
        issuer: impl Into<PrincipalKey>,
        id: impl Into<PrincipalKey>,
        assertion: Assertion,
    ) -> Self {
        Credential {
            issuer: issuer.into(),
            subject: Subject {
                id: id.into(),
                assertion,
            },
            proof: [0u8; SIGNATURE_LEN],
        }
    }

    /// The exact bytes the issuer's proof signature covers.
    pub fn proof_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_principal(&mut buf, &self.issuer);
        encode_principal(&mut buf, &self.subject.id);
        self.subject.assertion.encode(&mut buf);
        buf
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        encode_principal(buf, &self.issuer);
        encode_principal(buf, &self.subject.id);
        self.subject.assertion.encode(buf);
        buf.extend_from_slice(&self.proof);
    }

    pub fn decode(buf: &[u8], offset: usize) -> WeftResult<(Self, usize)> {
        let (issuer, offset) = decode_principal(buf, offset)?;
        let (id, offset) = decode_principal(buf, offset)?;
        let (assertion, offset) = Assertion::decode(buf, offset)?;
        need(buf, offset + SIGNATURE_LEN)?;
        let proof: [u8; SIGNATURE_LEN] = buf[offset..offset + SIGNATURE_LEN].try_into().unwrap();
        Ok((
            Credential {
                issuer,
                subject: Subject { id, assertion },
                proof,
            },
            offset + SIGNATURE_LEN,
        ))
    }
}

impl Payload {
    #[inline]
    pub fn tag(&self) -> u8 {
        match self {
            Payload::Credential(_) => 0x01,
            Payload::Data(_) => 0x02,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(self.tag());
        match self {
            Payload::Credential(credential) => credential.encode(&mut buf),
            Payload::Data(data) => {
                buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
                buf.extend_from_slice(data);
            }
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> WeftResult<Self> {
        need(buf, 1)?;
        match buf[0] {
            0x01 => {
                let (credential, offset) = Credential::decode(buf, 1)?;
                if offset != buf.len() {
                    return Err(WeftError::InvalidWireFormat(
                        "trailing bytes after credential".into(),
                    ));
                }
                Ok(Payload::Credential(credential))
            }
            0x02 => {
                need(buf, 5)?;
                let len = u32::from_le_bytes(buf[1..5].try_into().unwrap()) as usize;
                need(buf, 5 + len)?;
                if buf.len() != 5 + len {
                    return Err(WeftError::InvalidWireFormat(
                        "trailing bytes after data payload".into(),
                    ));
                }
                Ok(Payload::Data(Bytes::copy_from_slice(&buf[5..5 + len])))
            }
            tag => Err(WeftError::UnknownPayloadTag(tag)),
        }
    }
}

impl Message {
    /// The exact bytes a feed signature covers: `(feed, seq, payload)`.
    pub fn signable_bytes(feed: &FeedKey, seq: u64, payload: &Payload) -> Vec<u8> {
        let encoded = payload.encode();
        let mut buf = Vec::with_capacity(KEY_LEN + 8 + encoded.len());
        buf.extend_from_slice(feed.as_bytes());
        buf.extend_from_slice(&seq.to_le_bytes());
        buf.extend_from_slice(&encoded);
        buf
    }

    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload.encode();
        let mut buf = Vec::with_capacity(KEY_LEN + 8 + 4 + payload.len() + SIGNATURE_LEN);
        buf.extend_from_slice(self.feed.as_bytes());
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&self.signature);
        buf
    }

    /// Decode one message, returning it and the bytes consumed.
    pub fn decode(buf: &[u8]) -> WeftResult<(Self, usize)> {
        need(buf, KEY_LEN + 8 + 4)?;
        let feed = FeedKey::new(take_key(buf, 0)?);
        let seq = u64::from_le_bytes(buf[KEY_LEN..KEY_LEN + 8].try_into().unwrap());
        let payload_len =
            u32::from_le_bytes(buf[KEY_LEN + 8..KEY_LEN + 12].try_into().unwrap()) as usize;
        let payload_start = KEY_LEN + 12;
        let total = payload_start + payload_len + SIGNATURE_LEN;
        need(buf, total)?;
        let payload = Payload::decode(&buf[payload_start..payload_start + payload_len])?;
        let signature: [u8; SIGNATURE_LEN] = buf
            [payload_start + payload_len..total]
            .try_into()
            .unwrap();
        Ok((
            Message {
                feed,
                seq,
                payload,
                signature,
            },
            total,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceKey;

    fn sample_credential() -> Credential {
        Credential::new(
            IdentityKey::new([1; 32]),
            DeviceKey::new([2; 32]),
            Assertion::DeviceAdmit {
                identity: IdentityKey::new([1; 32]),
            },
        )
    }

    #[test]
    fn test_credential_roundtrip() {
        let credential = sample_credential();
        let mut buf = Vec::new();
        credential.encode(&mut buf);
        let (decoded, used) = Credential::decode(&buf, 0).unwrap();
        assert_eq!(decoded, credential);
        assert_eq!(used, buf.len());
    }

    #[test]
    fn test_space_member_scope_roundtrip() {
        let credential = Credential::new(
            IdentityKey::new([1; 32]),
            IdentityKey::new([3; 32]),
            Assertion::SpaceMember {
                feed_scope: vec![FeedKey::new([4; 32]), FeedKey::new([5; 32])],
            },
        );
        let mut buf = Vec::new();
        credential.encode(&mut buf);
        let (decoded, _) = Credential::decode(&buf, 0).unwrap();
        assert_eq!(decoded, credential);
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = Message {
            feed: FeedKey::new([7; 32]),
            seq: 42,
            payload: Payload::Data(Bytes::from_static(b"hello weft")),
            signature: [9; SIGNATURE_LEN],
        };
        let buf = msg.encode();
        let (decoded, used) = Message::decode(&buf).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(used, buf.len());
    }

    #[test]
    fn test_message_decode_truncated() {
        let msg = Message {
            feed: FeedKey::new([7; 32]),
            seq: 1,
            payload: Payload::Credential(sample_credential()),
            signature: [0; SIGNATURE_LEN],
        };
        let buf = msg.encode();
        assert!(Message::decode(&buf[..buf.len() - 1]).is_err());
    }

    #[test]
    fn test_payload_unknown_tag() {
        assert!(matches!(
            Payload::decode(&[0x7F, 0, 0]),
            Err(WeftError::UnknownPayloadTag(0x7F))
        ));
    }

    #[test]
    fn test_signable_bytes_bind_all_fields() {
        let payload = Payload::Data(Bytes::from_static(b"x"));
        let a = Message::signable_bytes(&FeedKey::new([1; 32]), 0, &payload);
        let b = Message::signable_bytes(&FeedKey::new([2; 32]), 0, &payload);
        let c = Message::signable_bytes(&FeedKey::new([1; 32]), 1, &payload);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
