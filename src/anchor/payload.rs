/// On-chain payload encoding for directory block anchors.
///
/// Layout: `'F' 'a' | height (6 bytes, big-endian) | hash`.
///
/// The two-byte marker lets chain scanners pick anchor payloads out of
/// arbitrary OP_RETURN outputs and calldata. Heights are truncated to
/// 48 bits to keep the payload well under the 80-byte OP_RETURN limit.
use crate::error::{AnchorError, Result};

/// Marker prepended to every anchor payload.
pub const PAYLOAD_MARKER: [u8; 2] = [b'F', b'a'];

/// Marker plus the 6 height bytes.
pub const PAYLOAD_HEADER_LEN: usize = 8;

const HEIGHT_MASK: u64 = 0xFFFF_FFFF_FFFF;

/// Encode a directory block height and hash into an anchor payload.
pub fn prepend_block_height(height: u32, hash: &[u8]) -> Result<Vec<u8>> {
    encode_height_hash(u64::from(height), hash)
}

/// Encode a 64-bit height. Fails if any bit above bit 47 is set.
pub fn encode_height_hash(height: u64, hash: &[u8]) -> Result<Vec<u8>> {
    if height & HEIGHT_MASK != height {
        return Err(AnchorError::InvalidHeight(height));
    }

    let mut out = Vec::with_capacity(PAYLOAD_HEADER_LEN + hash.len());
    out.extend_from_slice(&PAYLOAD_MARKER);
    out.extend_from_slice(&height.to_be_bytes()[2..]);
    out.extend_from_slice(hash);
    Ok(out)
}

/// Split an anchor payload back into its height and hash.
pub fn decode_height_hash(payload: &[u8]) -> Result<(u64, &[u8])> {
    if payload.len() < PAYLOAD_HEADER_LEN {
        return Err(AnchorError::Serialization(format!(
            "anchor payload too short: {} bytes",
            payload.len()
        )));
    }
    if payload[..2] != PAYLOAD_MARKER {
        return Err(AnchorError::Serialization(
            "anchor payload marker missing".into(),
        ));
    }

    let mut wide = [0u8; 8];
    wide[2..].copy_from_slice(&payload[2..PAYLOAD_HEADER_LEN]);
    Ok((u64::from_be_bytes(wide), &payload[PAYLOAD_HEADER_LEN..]))
}
