/// Ethereum calldata anchor.
///
/// Sends a zero-value transaction to self with the encoded directory block
/// payload as calldata, waits for the receipt, then records the block
/// position on the Factom anchor chain.
///
/// Uses raw JSON-RPC so any node or hosted endpoint works.
///
/// Nonce lookup and send run under one lock, and the next nonce is also
/// tracked locally, so overlapping placements never reuse a nonce.
use std::sync::Arc;
use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::payload::prepend_block_height;
use super::record::{AnchorRecord, EthereumStruct};
use super::{AnchorReceipt, DirectoryBlockAnchorInfo, PlaceAnchor};
use crate::error::{AnchorError, Result};
use crate::factom::FactomClient;

/// Configuration for Ethereum anchoring.
#[derive(Debug, Clone)]
pub struct EthereumConfig {
    /// Ethereum JSON-RPC endpoint.
    pub rpc_url: String,
    /// Key of the anchor account.
    pub signer: PrivateKeySigner,
    /// Chain ID (1 for mainnet, 11155111 for Sepolia).
    pub chain_id: u64,
    pub gas_limit: u64,
    pub confirm_poll: Duration,
    pub confirm_max_polls: u32,
}

pub struct EthereumAnchor {
    config: EthereumConfig,
    client: Client,
    /// Next nonce after the last transaction this process sent.
    next_nonce: Mutex<Option<u64>>,
    factom: Arc<FactomClient>,
}

/// Parse a hex private key, with or without `0x`.
pub fn parse_private_key(hex_key: &str) -> Result<PrivateKeySigner> {
    hex_key
        .trim()
        .trim_start_matches("0x")
        .parse()
        .map_err(|e| AnchorError::Config(format!("Invalid ETH private key: {e}")))
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxReceipt {
    block_number: String,
    block_hash: String,
    transaction_index: String,
    /// "0x1" on success, "0x0" on revert.
    status: Option<String>,
}

fn parse_quantity(value: &str) -> Result<u128> {
    u128::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| AnchorError::Serialization(format!("Invalid hex quantity {value:?}: {e}")))
}

impl EthereumAnchor {
    async fn poll_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        let Some(value) = self
            .rpc_value("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await?
        else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| AnchorError::Serialization(format!("Unexpected receipt shape: {e}")))
    }

    pub fn new(config: EthereumConfig, factom: Arc<FactomClient>) -> Self {
        info!(address = %config.signer.address(), "Ethereum anchor account");
        Self {
            config,
            client: Client::new(),
            next_nonce: Mutex::new(None),
            factom,
        }
    }

    /// Send a JSON-RPC request. A `null` result comes back as `None`.
    async fn rpc_value(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<serde_json::Value>> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnchorError::Transport(format!("ETH RPC {method} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AnchorError::Transport(format!(
                "ETH RPC {method} returned {status}"
            )));
        }

        let resp: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| AnchorError::Serialization(format!("RPC response parse error: {e}")))?;

        if let Some(err) = resp.error {
            return Err(AnchorError::Chain(format!(
                "ETH RPC {method} error: {}",
                err.message
            )));
        }

        Ok(resp.result.filter(|v| !v.is_null()))
    }

    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let value = self
            .rpc_value(method, params)
            .await?
            .ok_or_else(|| AnchorError::Chain(format!("Empty ETH RPC response for {method}")))?;
        serde_json::from_value(value)
            .map_err(|e| AnchorError::Serialization(format!("Unexpected {method} result: {e}")))
    }

    /// Build, sign, and send a transaction with the payload as calldata.
    /// Returns the transaction hash and the sending address.
    async fn send_anchor_tx(&self, payload: &[u8]) -> Result<(String, String)> {
        use alloy::consensus::SignableTransaction;
        use alloy::eips::eip2718::Encodable2718;
        use alloy::primitives::{Bytes, TxKind, U256};
        use alloy::signers::Signer;

        let signer = &self.config.signer;
        let from_address = signer.address();

        let mut next_nonce = self.next_nonce.lock().await;
        let nonce_hex: String = self
            .rpc_call(
                "eth_getTransactionCount",
                serde_json::json!([format!("{from_address:?}"), "pending"]),
            )
            .await?;
        let pending = parse_quantity(&nonce_hex)? as u64;
        let nonce = (*next_nonce).map_or(pending, |local| local.max(pending));

        let gas_price_hex: String = self.rpc_call("eth_gasPrice", serde_json::json!([])).await?;
        let gas_price = parse_quantity(&gas_price_hex)?;

        // Legacy transaction to self, payload as calldata
        let tx = alloy::consensus::TxLegacy {
            chain_id: Some(self.config.chain_id),
            nonce,
            gas_price,
            gas_limit: self.config.gas_limit,
            to: TxKind::Call(from_address),
            value: U256::ZERO,
            input: Bytes::copy_from_slice(payload),
        };

        let sig = signer
            .sign_hash(&tx.signature_hash())
            .await
            .map_err(|e| AnchorError::Chain(format!("ETH signing failed: {e}")))?;
        let signed = alloy::consensus::TxEnvelope::Legacy(tx.into_signed(sig));

        let mut raw_tx = Vec::new();
        signed.encode_2718(&mut raw_tx);
        let raw_hex = format!("0x{}", hex::encode(&raw_tx));

        let tx_hash: String = self
            .rpc_call("eth_sendRawTransaction", serde_json::json!([raw_hex]))
            .await?;
        *next_nonce = Some(nonce + 1);
        debug!(nonce, tx_hash = %tx_hash, "Ethereum anchor tx sent");

        Ok((tx_hash, from_address.to_string()))
    }

    /// Poll for the transaction receipt until the transaction is mined.
    /// Failed polls are retried; a reverted transaction ends the wait.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt> {
        for attempt in 1..=self.config.confirm_max_polls {
            match self.poll_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if receipt.status.as_deref() == Some("0x0") {
                        return Err(AnchorError::Chain(format!("Transaction {tx_hash} reverted")));
                    }
                    return Ok(receipt);
                }
                Ok(None) => debug!(tx_hash, attempt, "Waiting for Ethereum receipt"),
                Err(e) => warn!(tx_hash, attempt, error = %e, "Receipt poll failed"),
            }

            tokio::time::sleep(self.config.confirm_poll).await;
        }

        Err(AnchorError::Chain(format!(
            "Transaction {tx_hash} not mined after {} polls",
            self.config.confirm_max_polls
        )))
    }
}

#[async_trait]
impl PlaceAnchor for EthereumAnchor {
    fn chain_name(&self) -> &str {
        "Ethereum"
    }

    async fn place_anchor(&self, info: &DirectoryBlockAnchorInfo) -> Result<AnchorReceipt> {
        let payload = prepend_block_height(info.db_height, &info.key_mr)?;
        let (tx_hash, address) = self.send_anchor_tx(&payload).await?;
        info!(db_height = info.db_height, tx_hash = %tx_hash, "Ethereum anchor sent");

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        let block_height = parse_quantity(&receipt.block_number)? as u64;
        let offset = parse_quantity(&receipt.transaction_index)? as i64;

        let record = AnchorRecord::ethereum(
            info,
            EthereumStruct {
                address,
                txid: tx_hash.clone(),
                block_height: block_height as i64,
                block_hash: receipt.block_hash.clone(),
                offset,
            },
        );
        self.factom.submit_entry_to_anchor_chain(&record).await?;

        Ok(AnchorReceipt {
            chain: "ethereum".to_string(),
            tx_id: tx_hash,
            block_height,
            block_hash: receipt.block_hash,
            db_height: info.db_height,
        })
    }
}
