//! Single-use invitations
//!
//! An invitation is an ephemeral `{swarm_key, secret}` pair handed to a
//! guest out-of-band. The inviter's registry stores only a digest of the
//! secret; redemption consumes the entry so a replayed handshake is
//! rejected with `InvitationReplayed` rather than silently re-admitting.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use weft_core::{SpaceKey, WeftError, WeftResult, KEY_LEN};
use weft_crypto::secret_digest;

/// Length of an invitation secret.
pub const INVITATION_SECRET_LEN: usize = 32;

/// An out-of-band invitation token.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Invitation {
    /// The key to rendezvous on: the space key.
    pub swarm_key: SpaceKey,
    /// Single-use shared secret authenticating the guest.
    pub secret: [u8; INVITATION_SECRET_LEN],
}

impl Invitation {
    /// Encode as a URL-safe token for out-of-band transmission.
    pub fn encode(&self) -> String {
        let mut raw = [0u8; KEY_LEN + INVITATION_SECRET_LEN];
        raw[..KEY_LEN].copy_from_slice(self.swarm_key.as_bytes());
        raw[KEY_LEN..].copy_from_slice(&self.secret);
        URL_SAFE_NO_PAD.encode(raw)
    }

    pub fn decode(token: &str) -> WeftResult<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| WeftError::InvalidInvitation)?;
        if raw.len() != KEY_LEN + INVITATION_SECRET_LEN {
            return Err(WeftError::InvalidInvitation);
        }
        let swarm_key = SpaceKey::from_slice(&raw[..KEY_LEN]).ok_or(WeftError::InvalidInvitation)?;
        let secret: [u8; INVITATION_SECRET_LEN] = raw[KEY_LEN..]
            .try_into()
            .map_err(|_| WeftError::InvalidInvitation)?;
        Ok(Invitation { swarm_key, secret })
    }
}

impl std::fmt::Debug for Invitation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the secret.
        f.debug_struct("Invitation")
            .field("swarm_key", &self.swarm_key)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InvitationStatus {
    Pending,
    Redeemed,
}

/// Inviter-side registry of outstanding invitations.
#[derive(Default)]
pub struct InvitationRegistry {
    issued: HashMap<[u8; 32], InvitationStatus>,
}

impl InvitationRegistry {
    pub fn new() -> Self {
        InvitationRegistry::default()
    }

    /// Register a freshly issued secret.
    pub fn register(&mut self, secret: &[u8; INVITATION_SECRET_LEN]) {
        self.issued
            .insert(secret_digest(secret), InvitationStatus::Pending);
    }

    /// Consume an invitation. Exactly one redemption succeeds.
    pub fn redeem(&mut self, secret: &[u8; INVITATION_SECRET_LEN]) -> WeftResult<()> {
        let digest = secret_digest(secret);
        match self.issued.get_mut(&digest) {
            None => Err(WeftError::InvitationExpired),
            Some(status @ InvitationStatus::Pending) => {
                *status = InvitationStatus::Redeemed;
                Ok(())
            }
            Some(InvitationStatus::Redeemed) => Err(WeftError::InvitationReplayed),
        }
    }

    pub fn pending(&self) -> usize {
        self.issued
            .values()
            .filter(|s| **s == InvitationStatus::Pending)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_crypto::generate_secret;

    #[test]
    fn test_invitation_token_roundtrip() {
        let invitation = Invitation {
            swarm_key: SpaceKey::new([7; 32]),
            secret: generate_secret(),
        };
        let token = invitation.encode();
        // URL-safe: no padding, no '+', no '/'.
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert_eq!(Invitation::decode(&token).unwrap(), invitation);
    }

    #[test]
    fn test_invitation_decode_garbage() {
        assert!(Invitation::decode("not!!base64").is_err());
        assert!(Invitation::decode("c2hvcnQ").is_err());
    }

    #[test]
    fn test_registry_single_use() {
        let mut registry = InvitationRegistry::new();
        let secret = generate_secret();
        registry.register(&secret);

        registry.redeem(&secret).unwrap();
        assert!(matches!(
            registry.redeem(&secret),
            Err(WeftError::InvitationReplayed)
        ));
        assert!(matches!(
            registry.redeem(&generate_secret()),
            Err(WeftError::InvitationExpired)
        ));
    }
}
