/// Entry-credit keys.
///
/// An EC key pays for entry commits. The secret is written as a
/// base58check string with a two-byte prefix that renders as `Es...`;
/// the public address uses a prefix that renders as `EC...`.
use bitcoin::base58;

use crate::crypto::sensitive::SecretSeed;
use crate::crypto::sign::SigKey;
use crate::error::{AnchorError, Result};

const EC_SECRET_PREFIX: [u8; 2] = [0x5d, 0xb6];
const EC_PUBLIC_PREFIX: [u8; 2] = [0x59, 0x2a];

/// An entry-credit key pair.
#[derive(Debug)]
pub struct EcAddress {
    key: SigKey,
}

impl EcAddress {
    /// Parse an `Es...` secret.
    pub fn from_secret(secret: &str) -> Result<Self> {
        let raw = base58::decode_check(secret.trim())
            .map_err(|e| AnchorError::Config(format!("EC secret is not base58check: {e}")))?;

        if raw.len() != 34 || raw[..2] != EC_SECRET_PREFIX {
            return Err(AnchorError::Config(
                "EC secret has the wrong prefix or length".into(),
            ));
        }

        let seed = SecretSeed::from_key_bytes(&raw[2..]).ok_or_else(|| {
            AnchorError::Config("EC secret has the wrong key length".into())
        })?;

        Ok(Self {
            key: SigKey::from_seed(&seed),
        })
    }

    pub fn from_seed(seed: &SecretSeed) -> Self {
        Self {
            key: SigKey::from_seed(seed),
        }
    }

    /// Encode a seed as an `Es...` secret.
    pub fn encode_secret(seed: &SecretSeed) -> String {
        let mut raw = Vec::with_capacity(34);
        raw.extend_from_slice(&EC_SECRET_PREFIX);
        raw.extend_from_slice(seed.as_bytes());
        base58::encode_check(&raw)
    }

    /// The public `EC...` address.
    pub fn public_address(&self) -> String {
        let mut raw = Vec::with_capacity(34);
        raw.extend_from_slice(&EC_PUBLIC_PREFIX);
        raw.extend_from_slice(&self.pub_bytes());
        base58::encode_check(&raw)
    }

    pub fn pub_bytes(&self) -> [u8; 32] {
        self.key.public_key_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.key.sign(message)
    }
}
