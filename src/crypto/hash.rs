/// SHA-2 hashing utilities.
///
/// Factom hashes entries as `SHA256(SHA512(data) || data)`; everything else
/// in the anchoring path uses plain SHA-256.
use sha2::{Digest, Sha256, Sha512};

/// SHA-256 of arbitrary data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Factom entry hash: `SHA256(SHA512(data) || data)`.
pub fn entry_hash(data: &[u8]) -> [u8; 32] {
    let wide = Sha512::digest(data);
    let mut hasher = Sha256::new();
    hasher.update(wide);
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_entry_hash_differs_from_sha256() {
        let data = b"entry bytes";
        assert_ne!(entry_hash(data), sha256(data));
        assert_eq!(entry_hash(data), entry_hash(data));
    }

    #[test]
    fn test_entry_hash_composition() {
        let data = b"factom";
        let mut input = Sha512::digest(data).to_vec();
        input.extend_from_slice(data);
        assert_eq!(entry_hash(data), sha256(&input));
    }
}
