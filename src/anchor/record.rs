/// Chain-agnostic anchor records.
///
/// An anchor record ties a directory block (height + KeyMR) to the
/// external transaction that carries it. The record is JSON-serialized,
/// signed with the anchor signature key, and written to the Factom
/// anchor chain with the signature as the entry's only external id.
use serde::{Deserialize, Serialize};

use super::DirectoryBlockAnchorInfo;
use crate::crypto::sign::SigKey;
use crate::error::{AnchorError, Result};

/// Version 2 records carry their signature in the entry's external ids.
pub const ANCHOR_RECORD_VERSION: u32 = 2;

/// Where a directory block landed on Bitcoin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinStruct {
    #[serde(rename = "Address")]
    pub address: String,
    /// Transaction id, in the usual reversed display order.
    #[serde(rename = "TXID")]
    pub txid: String,
    #[serde(rename = "BlockHeight")]
    pub block_height: i32,
    #[serde(rename = "BlockHash")]
    pub block_hash: String,
    /// Position of the transaction within the block.
    #[serde(rename = "Offset")]
    pub offset: i32,
}

/// Where a directory block landed on Ethereum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthereumStruct {
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "TXID")]
    pub txid: String,
    #[serde(rename = "BlockHeight")]
    pub block_height: i64,
    #[serde(rename = "BlockHash")]
    pub block_hash: String,
    #[serde(rename = "Offset")]
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    #[serde(rename = "AnchorRecordVer")]
    pub version: u32,
    #[serde(rename = "DBHeight")]
    pub db_height: u32,
    /// Directory block KeyMR, lowercase hex.
    #[serde(rename = "KeyMR")]
    pub key_mr: String,
    #[serde(rename = "RecordHeight")]
    pub record_height: u32,
    #[serde(rename = "Bitcoin", default, skip_serializing_if = "Option::is_none")]
    pub bitcoin: Option<BitcoinStruct>,
    #[serde(rename = "Ethereum", default, skip_serializing_if = "Option::is_none")]
    pub ethereum: Option<EthereumStruct>,
}

impl AnchorRecord {
    fn for_block(info: &DirectoryBlockAnchorInfo) -> Self {
        Self {
            version: ANCHOR_RECORD_VERSION,
            db_height: info.db_height,
            key_mr: hex::encode(info.key_mr),
            record_height: info.db_height,
            bitcoin: None,
            ethereum: None,
        }
    }

    pub fn bitcoin(info: &DirectoryBlockAnchorInfo, tx: BitcoinStruct) -> Self {
        Self {
            bitcoin: Some(tx),
            ..Self::for_block(info)
        }
    }

    pub fn ethereum(info: &DirectoryBlockAnchorInfo, tx: EthereumStruct) -> Self {
        Self {
            ethereum: Some(tx),
            ..Self::for_block(info)
        }
    }

    /// Stamp the current record version, serialize to JSON and sign the
    /// exact bytes returned.
    pub fn marshal_and_sign(&self, key: &SigKey) -> Result<(Vec<u8>, [u8; 64])> {
        let stamped = AnchorRecord {
            version: ANCHOR_RECORD_VERSION,
            ..self.clone()
        };
        let raw = serde_json::to_vec(&stamped)
            .map_err(|e| AnchorError::Signing(format!("anchor record marshal failed: {e}")))?;
        let sig = key.sign(&raw);
        Ok((raw, sig))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sensitive::SecretSeed;
    use crate::crypto::sign;

    fn info() -> DirectoryBlockAnchorInfo {
        DirectoryBlockAnchorInfo {
            db_height: 1234,
            key_mr: [0xAB; 32],
        }
    }

    fn btc_tx() -> BitcoinStruct {
        BitcoinStruct {
            address: "1HLoD9E4SDFFPDiYfNYnkBLQ85Y51J3Zb1".into(),
            txid: "9b0fc92260312ce44e74ef369f5c66bbb85848f2eddd5a7a1cde251e54ccfdd5".into(),
            block_height: 345_678,
            block_hash: "00000000000000000cc14eacfc7057300aea87bed6fee904fd8e1c1f3dc008d4".into(),
            offset: 87,
        }
    }

    #[test]
    fn test_json_field_names() {
        let record = AnchorRecord::bitcoin(&info(), btc_tx());
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();

        assert_eq!(json["AnchorRecordVer"], 2);
        assert_eq!(json["DBHeight"], 1234);
        assert_eq!(json["RecordHeight"], 1234);
        assert_eq!(json["KeyMR"], hex::encode([0xAB; 32]));
        assert_eq!(json["Bitcoin"]["TXID"], btc_tx().txid);
        assert_eq!(json["Bitcoin"]["Offset"], 87);
        assert!(json.get("Ethereum").is_none());
    }

    #[test]
    fn test_ethereum_record_omits_bitcoin() {
        let record = AnchorRecord::ethereum(
            &info(),
            EthereumStruct {
                address: "0xabc".into(),
                txid: "0xdef".into(),
                block_height: 19_000_000,
                block_hash: "0x01".into(),
                offset: 3,
            },
        );
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert!(json.get("Bitcoin").is_none());
        assert_eq!(json["Ethereum"]["BlockHeight"], 19_000_000);
    }

    #[test]
    fn test_marshal_and_sign_verifies() {
        let key = SigKey::from_seed(&SecretSeed::new([0x77; 32]));
        let record = AnchorRecord::bitcoin(&info(), btc_tx());

        let (raw, sig) = record.marshal_and_sign(&key).unwrap();
        assert!(sign::verify(&key.public_key_bytes(), &raw, &sig).is_ok());

        let parsed: AnchorRecord = serde_json::from_slice(&raw).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_marshal_stamps_current_version() {
        let key = SigKey::from_seed(&SecretSeed::new([0x78; 32]));
        let mut record = AnchorRecord::bitcoin(&info(), btc_tx());
        record.version = 1;

        let (raw, _) = record.marshal_and_sign(&key).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["AnchorRecordVer"], 2);
    }
}
