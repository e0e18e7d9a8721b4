/// Factom entries: the unit of content written to a chain.
///
/// Binary layout:
///
/// ```text
/// version(1) | chain_id(32) | ext_ids_len(2, BE) | ext_ids | content
/// ext_id := len(2, BE) | bytes
/// ```
use crate::crypto::hash;
use crate::error::{AnchorError, Result};

/// Fixed header: version byte, chain id, ext-id length prefix.
pub const ENTRY_HEADER_LEN: usize = 35;

/// Largest payload (ext ids plus content) one commit can pay for.
pub const MAX_ENTRY_PAYLOAD: usize = 10 * 1024;

const ENTRY_VERSION: u8 = 0;

/// A Factom entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub chain_id: [u8; 32],
    pub ext_ids: Vec<Vec<u8>>,
    pub content: Vec<u8>,
}

impl Entry {
    pub fn new(chain_id: [u8; 32], ext_ids: Vec<Vec<u8>>, content: Vec<u8>) -> Self {
        Self {
            chain_id,
            ext_ids,
            content,
        }
    }

    pub fn chain_id_hex(&self) -> String {
        hex::encode(self.chain_id)
    }

    /// Serialize the entry in Factom's binary format.
    pub fn marshal_binary(&self) -> Result<Vec<u8>> {
        let ext_ids = self.marshal_ext_ids()?;
        let ext_len = u16::try_from(ext_ids.len()).map_err(|_| {
            AnchorError::Composition(format!("external ids too long: {} bytes", ext_ids.len()))
        })?;

        let mut buf = Vec::with_capacity(ENTRY_HEADER_LEN + ext_ids.len() + self.content.len());
        buf.push(ENTRY_VERSION);
        buf.extend_from_slice(&self.chain_id);
        buf.extend_from_slice(&ext_len.to_be_bytes());
        buf.extend_from_slice(&ext_ids);
        buf.extend_from_slice(&self.content);
        Ok(buf)
    }

    fn marshal_ext_ids(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for ext_id in &self.ext_ids {
            let len = u16::try_from(ext_id.len()).map_err(|_| {
                AnchorError::Composition(format!("external id too long: {} bytes", ext_id.len()))
            })?;
            buf.extend_from_slice(&len.to_be_bytes());
            buf.extend_from_slice(ext_id);
        }
        Ok(buf)
    }

    /// Entry hash: `SHA256(SHA512(bin) || bin)`.
    pub fn hash(&self) -> Result<[u8; 32]> {
        Ok(hash::entry_hash(&self.marshal_binary()?))
    }

    /// Entry credits needed to commit this entry: one per started KiB of
    /// payload, at least one.
    pub fn cost(&self) -> Result<u8> {
        let payload = self.marshal_binary()?.len() - ENTRY_HEADER_LEN;
        if payload > MAX_ENTRY_PAYLOAD {
            return Err(AnchorError::Composition(format!(
                "entry payload is {payload} bytes, limit is {MAX_ENTRY_PAYLOAD}"
            )));
        }
        Ok(payload.div_ceil(1024).max(1) as u8)
    }
}

/// Build the entry for an anchor record: the detached signature is the
/// single external id, the raw record is the content.
pub fn new_anchor_entry(chain_id: [u8; 32], signature: &[u8], content: Vec<u8>) -> Entry {
    Entry::new(chain_id, vec![signature.to_vec()], content)
}
