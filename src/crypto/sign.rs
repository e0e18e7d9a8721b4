/// Ed25519 signing for anchor records and entry commits.
///
/// Both the anchor record signature key and the entry-credit key are
/// plain Ed25519 keys; they differ only in how they are written down.
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use super::sensitive::SecretSeed;
use crate::error::{AnchorError, Result};

/// Ed25519 private key used to sign anchor records.
pub struct SigKey {
    signing_key: SigningKey,
}

impl SigKey {
    pub fn from_seed(seed: &SecretSeed) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed.as_bytes()),
        }
    }

    /// Parse a hex private key: either a 32-byte seed or a 64-byte
    /// seed-plus-public-key blob. In the 64-byte form the public half
    /// must match the seed.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim())
            .map_err(|e| AnchorError::Config(format!("signature key is not hex: {e}")))?;
        let seed = SecretSeed::from_key_bytes(&raw).ok_or_else(|| {
            AnchorError::Config(format!(
                "signature key must be 32 or 64 bytes, got {}",
                raw.len()
            ))
        })?;
        let key = Self::from_seed(&seed);

        if raw.len() == 64 && key.public_key_bytes()[..] != raw[32..] {
            return Err(AnchorError::Config(
                "signature key public half does not match its seed".into(),
            ));
        }

        Ok(key)
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for SigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigKey")
            .field("public", &hex::encode(self.public_key_bytes()))
            .finish()
    }
}

/// Verify a detached signature against a raw 32-byte public key.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> Result<()> {
    let vk = VerifyingKey::from_bytes(public_key)
        .map_err(|e| AnchorError::Signing(format!("invalid public key: {e}")))?;
    vk.verify(message, &Signature::from_bytes(signature))
        .map_err(|e| AnchorError::Signing(format!("signature does not verify: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let key = SigKey::from_seed(&SecretSeed::new([3u8; 32]));
        let sig = key.sign(b"directory block 12345");
        assert!(verify(&key.public_key_bytes(), b"directory block 12345", &sig).is_ok());
    }

    #[test]
    fn test_wrong_message_fails() {
        let key = SigKey::from_seed(&SecretSeed::new([3u8; 32]));
        let sig = key.sign(b"original");
        assert!(verify(&key.public_key_bytes(), b"tampered", &sig).is_err());
    }

    #[test]
    fn test_from_hex_seed_and_expanded() {
        let seed_hex = hex::encode([9u8; 32]);
        let short = SigKey::from_hex(&seed_hex).unwrap();

        let expanded = format!("{seed_hex}{}", hex::encode(short.public_key_bytes()));
        let long = SigKey::from_hex(&expanded).unwrap();

        assert_eq!(short.public_key_bytes(), long.public_key_bytes());
    }

    #[test]
    fn test_from_hex_rejects_mismatched_public_half() {
        let bad = format!("{}{}", hex::encode([9u8; 32]), hex::encode([0u8; 32]));
        assert!(matches!(SigKey::from_hex(&bad), Err(AnchorError::Config(_))));
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(SigKey::from_hex("not hex").is_err());
        assert!(SigKey::from_hex("abcd").is_err());
    }
}
