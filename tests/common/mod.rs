#![allow(dead_code)]

use std::time::Duration;

use factom_anchor::anchor::record::AnchorRecord;
use factom_anchor::crypto::sensitive::SecretSeed;
use factom_anchor::crypto::sign::SigKey;
use factom_anchor::factom::compose::{CommitMessage, JsonRpcRequest};
use factom_anchor::factom::ec::EcAddress;
use factom_anchor::factom::{FactomClient, FactomConfig};
use serde_json::Value;
use wiremock::MockServer;

pub const CHAIN_ID: [u8; 32] = [0xDF; 32];
pub const EC_SEED: [u8; 32] = [0x0E; 32];
pub const SIG_SEED: [u8; 32] = [0x51; 32];

pub fn factom_config(server: &str) -> FactomConfig {
    FactomConfig {
        server: server.to_string(),
        anchor_chain_id: CHAIN_ID,
        reveal_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        basic_auth: None,
    }
}

pub fn factom_client(config: FactomConfig) -> FactomClient {
    FactomClient::new(
        config,
        EcAddress::from_seed(&SecretSeed::new(EC_SEED)),
        SigKey::from_seed(&SecretSeed::new(SIG_SEED)),
    )
    .unwrap()
}

pub fn sig_public_key() -> [u8; 32] {
    SigKey::from_seed(&SecretSeed::new(SIG_SEED)).public_key_bytes()
}

/// JSON bodies of every request the mock factomd received, in order.
pub async fn factomd_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

/// A decoded commit/reveal pair.
pub struct Submission {
    pub commit: CommitMessage,
    pub entry_bin: Vec<u8>,
}

impl Submission {
    pub fn from_bodies(commit: &Value, reveal: &Value) -> Self {
        assert_eq!(commit["method"], "commit-entry");
        assert_eq!(reveal["method"], "reveal-entry");

        let commit_req: JsonRpcRequest<Value> = serde_json::from_value(commit.clone()).unwrap();
        let message = commit_req.params["message"].as_str().unwrap();
        let entry_hex = reveal["params"]["entry"].as_str().unwrap();

        Self {
            commit: CommitMessage::from_hex(message).unwrap(),
            entry_bin: hex::decode(entry_hex).unwrap(),
        }
    }

    /// Split the revealed entry binary into (chain id, ext ids, content).
    pub fn entry_parts(&self) -> ([u8; 32], Vec<Vec<u8>>, Vec<u8>) {
        let bin = &self.entry_bin;
        assert_eq!(bin[0], 0);
        let mut chain_id = [0u8; 32];
        chain_id.copy_from_slice(&bin[1..33]);

        let ext_len = u16::from_be_bytes([bin[33], bin[34]]) as usize;
        let ext = &bin[35..35 + ext_len];
        let mut ext_ids = Vec::new();
        let mut i = 0;
        while i < ext.len() {
            let len = u16::from_be_bytes([ext[i], ext[i + 1]]) as usize;
            ext_ids.push(ext[i + 2..i + 2 + len].to_vec());
            i += 2 + len;
        }

        (chain_id, ext_ids, bin[35 + ext_len..].to_vec())
    }

    pub fn record(&self) -> AnchorRecord {
        let (_, _, content) = self.entry_parts();
        serde_json::from_slice(&content).unwrap()
    }
}
