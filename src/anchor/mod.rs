/// Directory block anchoring into external blockchains.
///
/// Each finalized directory block is written to one external chain, picked
/// at startup:
/// - Bitcoin: OP_RETURN output
/// - Ethereum: calldata in a self-send transaction
///
/// Both embed the same payload (`payload::prepend_block_height`). Once the
/// transaction confirms, the backend writes a signed `AnchorRecord` back
/// to the Factom anchor chain.
pub mod bitcoin;
pub mod ethereum;
pub mod payload;
pub mod record;
pub mod service;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A directory block waiting to be anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryBlockAnchorInfo {
    pub db_height: u32,
    /// Directory block key Merkle root. Hex in JSON.
    #[serde(with = "hex32")]
    pub key_mr: [u8; 32],
}

/// Receipt returned after a directory block has been anchored and its
/// record written to the anchor chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorReceipt {
    /// Which blockchain ("bitcoin" or "ethereum").
    pub chain: String,
    /// Transaction hash/ID on the blockchain.
    pub tx_id: String,
    /// Height of the block that confirmed the transaction.
    pub block_height: u64,
    pub block_hash: String,
    /// Directory block that was anchored.
    pub db_height: u32,
}

/// Signal that one placement failed. Counted by the dispatch loop; the
/// fields are only logged.
#[derive(Debug, Clone)]
pub struct AnchorFailure {
    pub chain: String,
    pub db_height: u32,
}

/// A backend that can anchor a directory block.
#[async_trait]
pub trait PlaceAnchor: Send + Sync {
    /// Name of the blockchain (e.g., "Bitcoin", "Ethereum").
    fn chain_name(&self) -> &str;

    /// Embed the block in the chain and write the anchor record.
    async fn place_anchor(&self, info: &DirectoryBlockAnchorInfo) -> Result<AnchorReceipt>;
}

mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut out)
            .map_err(serde::de::Error::custom)?;
        Ok(out)
    }
}
