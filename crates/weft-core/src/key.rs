//! Key identifiers for the WEFT protocol
//!
//! All keys are 32-byte Ed25519 public keys. Equality is byte-exact and
//! keys never expire. Distinct roles get distinct newtypes so a feed key
//! cannot be passed where an identity key is expected.

use std::fmt;

/// Length of every public key, in bytes.
pub const KEY_LEN: usize = 32;

/// Public key of a single-writer feed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FeedKey(pub [u8; KEY_LEN]);

/// Public key identifying a space (its genesis key).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SpaceKey(pub [u8; KEY_LEN]);

/// Public key of an identity root.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IdentityKey(pub [u8; KEY_LEN]);

/// Public key of a device acting on behalf of an identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeviceKey(pub [u8; KEY_LEN]);

macro_rules! key_common {
    ($name:ident, $tag:literal) => {
        impl $name {
            pub const ZERO: $name = $name([0u8; KEY_LEN]);

            #[inline]
            pub fn new(bytes: [u8; KEY_LEN]) -> Self {
                $name(bytes)
            }

            #[inline]
            pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
                &self.0
            }

            #[inline]
            pub fn to_bytes(self) -> [u8; KEY_LEN] {
                self.0
            }

            pub fn from_slice(slice: &[u8]) -> Option<Self> {
                let bytes: [u8; KEY_LEN] = slice.try_into().ok()?;
                Some($name(bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "("))?;
                for b in &self.0[..4] {
                    write!(f, "{:02x}", b)?;
                }
                write!(f, "..)")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for b in &self.0 {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    };
}

key_common!(FeedKey, "Feed");
key_common!(SpaceKey, "Space");
key_common!(IdentityKey, "Identity");
key_common!(DeviceKey, "Device");

/// Any principal that can appear in the trust graph.
///
/// The trust graph is an arena-style table keyed by principal; the tag
/// distinguishes roles that happen to share key bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum PrincipalKey {
    Identity(IdentityKey),
    Device(DeviceKey),
    Feed(FeedKey),
}

impl PrincipalKey {
    /// Wire tag for this principal role.
    #[inline]
    pub fn tag(&self) -> u8 {
        match self {
            PrincipalKey::Identity(_) => 0x01,
            PrincipalKey::Device(_) => 0x02,
            PrincipalKey::Feed(_) => 0x03,
        }
    }

    #[inline]
    pub fn key_bytes(&self) -> &[u8; KEY_LEN] {
        match self {
            PrincipalKey::Identity(k) => &k.0,
            PrincipalKey::Device(k) => &k.0,
            PrincipalKey::Feed(k) => &k.0,
        }
    }

    pub fn from_tag(tag: u8, bytes: [u8; KEY_LEN]) -> Option<Self> {
        match tag {
            0x01 => Some(PrincipalKey::Identity(IdentityKey(bytes))),
            0x02 => Some(PrincipalKey::Device(DeviceKey(bytes))),
            0x03 => Some(PrincipalKey::Feed(FeedKey(bytes))),
            _ => None,
        }
    }
}

impl From<IdentityKey> for PrincipalKey {
    fn from(k: IdentityKey) -> Self {
        PrincipalKey::Identity(k)
    }
}

impl From<DeviceKey> for PrincipalKey {
    fn from(k: DeviceKey) -> Self {
        PrincipalKey::Device(k)
    }
}

impl From<FeedKey> for PrincipalKey {
    fn from(k: FeedKey) -> Self {
        PrincipalKey::Feed(k)
    }
}

impl fmt::Display for PrincipalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalKey::Identity(k) => write!(f, "identity:{k}"),
            PrincipalKey::Device(k) => write!(f, "device:{k}"),
            PrincipalKey::Feed(k) => write!(f, "feed:{k}"),
        }
    }
}
