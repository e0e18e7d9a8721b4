/// Secret key seeds that are zeroized on drop.
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 32-byte Ed25519 seed. Never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretSeed([u8; 32]);

impl SecretSeed {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Take the first 32 bytes of `slice`. Accepts a bare seed or a
    /// 64-byte seed-plus-public-key blob.
    pub fn from_key_bytes(slice: &[u8]) -> Option<Self> {
        if slice.len() != 32 && slice.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&slice[..32]);
        Some(Self(bytes))
    }
}

impl std::fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretSeed(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_key_bytes_lengths() {
        assert!(SecretSeed::from_key_bytes(&[1u8; 32]).is_some());
        assert!(SecretSeed::from_key_bytes(&[1u8; 64]).is_some());
        assert!(SecretSeed::from_key_bytes(&[1u8; 16]).is_none());
        assert!(SecretSeed::from_key_bytes(&[1u8; 33]).is_none());
    }

    #[test]
    fn test_expanded_key_keeps_seed_half() {
        let mut blob = [0xAAu8; 64];
        blob[32..].fill(0xBB);
        let seed = SecretSeed::from_key_bytes(&blob).unwrap();
        assert_eq!(seed.as_bytes(), &[0xAA; 32]);
    }

    #[test]
    fn test_debug_hides_bytes() {
        let seed = SecretSeed::new([0x42; 32]);
        assert_eq!(format!("{seed:?}"), "SecretSeed(..)");
    }
}
