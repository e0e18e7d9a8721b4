/// Composition of the `commit-entry` and `reveal-entry` JSON-RPC calls.
///
/// Commit message layout (signed over the first 40 bytes):
///
/// ```text
/// version(1) | millis(6, BE) | entry_hash(32) | ec_cost(1) | ec_pubkey(32) | sig(64)
/// ```
///
/// The reveal carries the full entry binary so the server can check it
/// against the hash it already holds from the commit.
use serde::{Deserialize, Serialize};

use super::ec::EcAddress;
use super::entry::Entry;
use crate::crypto::sign;
use crate::error::{AnchorError, Result};

pub const COMMIT_METHOD: &str = "commit-entry";
pub const REVEAL_METHOD: &str = "reveal-entry";

/// Version, timestamp, entry hash, cost.
pub const COMMIT_SIGNED_LEN: usize = 40;
pub const COMMIT_MESSAGE_LEN: usize = COMMIT_SIGNED_LEN + 32 + 64;

const COMMIT_VERSION: u8 = 0;

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest<P> {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: P,
}

impl<P> JsonRpcRequest<P> {
    pub fn new(method: &str, id: u64, params: P) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitParams {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealParams {
    pub entry: String,
}

/// JSON-RPC 2.0 response envelope. Every field is optional so that a
/// partially formed response still parses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Option<String>,
    pub id: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Current time as a 6-byte big-endian millisecond timestamp.
pub fn milli_time() -> [u8; 6] {
    millis_to_bytes(chrono::Utc::now().timestamp_millis())
}

fn millis_to_bytes(millis: i64) -> [u8; 6] {
    let mut out = [0u8; 6];
    out.copy_from_slice(&millis.to_be_bytes()[2..]);
    out
}

/// Compose a `commit-entry` request for `entry`, paid and signed by `ec`.
pub fn compose_entry_commit(
    entry: &Entry,
    ec: &EcAddress,
    id: u64,
) -> Result<JsonRpcRequest<CommitParams>> {
    let message = commit_message(entry, ec, milli_time())?;
    Ok(JsonRpcRequest::new(
        COMMIT_METHOD,
        id,
        CommitParams {
            message: hex::encode(message),
        },
    ))
}

fn commit_message(entry: &Entry, ec: &EcAddress, millis: [u8; 6]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(COMMIT_MESSAGE_LEN);
    buf.push(COMMIT_VERSION);
    buf.extend_from_slice(&millis);
    buf.extend_from_slice(&entry.hash()?);
    buf.push(entry.cost()?);

    let sig = ec.sign(&buf);
    buf.extend_from_slice(&ec.pub_bytes());
    buf.extend_from_slice(&sig);
    Ok(buf)
}

/// Compose a `reveal-entry` request carrying the entry binary.
pub fn compose_entry_reveal(entry: &Entry, id: u64) -> Result<JsonRpcRequest<RevealParams>> {
    Ok(JsonRpcRequest::new(
        REVEAL_METHOD,
        id,
        RevealParams {
            entry: hex::encode(entry.marshal_binary()?),
        },
    ))
}

/// A decoded commit message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    pub millis: u64,
    pub entry_hash: [u8; 32],
    pub cost: u8,
    pub ec_pubkey: [u8; 32],
    pub signature: [u8; 64],
}

impl CommitMessage {
    /// Decode a hex commit message and check its signature.
    pub fn from_hex(message: &str) -> Result<Self> {
        let raw = hex::decode(message)
            .map_err(|e| AnchorError::Serialization(format!("commit message is not hex: {e}")))?;
        if raw.len() != COMMIT_MESSAGE_LEN {
            return Err(AnchorError::Serialization(format!(
                "commit message is {} bytes, expected {COMMIT_MESSAGE_LEN}",
                raw.len()
            )));
        }

        let mut wide = [0u8; 8];
        wide[2..].copy_from_slice(&raw[1..7]);
        let mut entry_hash = [0u8; 32];
        entry_hash.copy_from_slice(&raw[7..39]);
        let mut ec_pubkey = [0u8; 32];
        ec_pubkey.copy_from_slice(&raw[40..72]);
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&raw[72..]);

        sign::verify(&ec_pubkey, &raw[..COMMIT_SIGNED_LEN], &signature)?;

        Ok(Self {
            millis: u64::from_be_bytes(wide),
            entry_hash,
            cost: raw[39],
            ec_pubkey,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sensitive::SecretSeed;
    use crate::factom::entry::new_anchor_entry;

    fn ec() -> EcAddress {
        EcAddress::from_seed(&SecretSeed::new([0x61; 32]))
    }

    #[test]
    fn test_millis_truncated_to_six_bytes() {
        assert_eq!(
            millis_to_bytes(0x0000_0102_0304_0506),
            [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]
        );
    }

    #[test]
    fn test_commit_message_decodes_and_verifies() {
        let entry = new_anchor_entry([0x0A; 32], &[0xEE; 64], b"{}".to_vec());
        let req = compose_entry_commit(&entry, &ec(), 7).unwrap();

        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.method, COMMIT_METHOD);
        assert_eq!(req.id, 7);

        let msg = CommitMessage::from_hex(&req.params.message).unwrap();
        assert_eq!(msg.entry_hash, entry.hash().unwrap());
        assert_eq!(msg.cost, 1);
        assert_eq!(msg.ec_pubkey, ec().pub_bytes());
        assert!(msg.millis > 0);
    }

    #[test]
    fn test_tampered_commit_rejected() {
        let entry = new_anchor_entry([0x0A; 32], &[0xEE; 64], b"{}".to_vec());
        let req = compose_entry_commit(&entry, &ec(), 1).unwrap();

        let mut raw = hex::decode(&req.params.message).unwrap();
        raw[10] ^= 0xFF;
        assert!(CommitMessage::from_hex(&hex::encode(raw)).is_err());
    }

    #[test]
    fn test_reveal_carries_entry_binary() {
        let entry = new_anchor_entry([0x0B; 32], &[1, 2], b"content".to_vec());
        let req = compose_entry_reveal(&entry, 3).unwrap();

        assert_eq!(req.method, REVEAL_METHOD);
        assert_eq!(
            hex::decode(&req.params.entry).unwrap(),
            entry.marshal_binary().unwrap()
        );
    }

    #[test]
    fn test_request_json_shape() {
        let entry = new_anchor_entry([0x0C; 32], &[1], vec![]);
        let req = compose_entry_reveal(&entry, 9).unwrap();
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 9);
        assert_eq!(json["method"], "reveal-entry");
        assert!(json["params"]["entry"].is_string());
    }

    #[test]
    fn test_oversized_entry_cannot_commit() {
        let entry = new_anchor_entry([0x0D; 32], &[1], vec![0u8; 20_000]);
        assert!(matches!(
            compose_entry_commit(&entry, &ec(), 1),
            Err(AnchorError::Composition(_))
        ));
    }

    #[test]
    fn test_response_parses_partial_bodies() {
        let ok: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":0,"result":{"message":"Entry Commit Success"}}"#,
        )
        .unwrap();
        assert!(ok.error.is_none());

        let err: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":0,"error":{"code":-32011,"message":"Repeated Commit"}}"#,
        )
        .unwrap();
        assert_eq!(err.error.unwrap().code, -32011);
    }
}
