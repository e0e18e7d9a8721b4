/// Bitcoin OP_RETURN anchor.
///
/// Writes the encoded directory block payload (`Fa | height | KeyMR`, 40
/// bytes) as an OP_RETURN output, waits for the transaction to confirm,
/// then records the block position on the Factom anchor chain.
///
/// Talks to an Esplora-compatible REST API (mempool.space,
/// blockstream.info, or a local electrs) for UTXOs, broadcast and status.
///
/// Placements may overlap. Coin selection and broadcast run under one
/// lock, and outpoints spent by this process are skipped until the API
/// stops listing them, so two anchors never spend the same coin.
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::blockdata::opcodes::all::OP_RETURN;
use bitcoin::blockdata::script::{Builder as ScriptBuilder, ScriptBuf};
use bitcoin::script::PushBytesBuf;
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Address, Network, NetworkKind, PrivateKey, PublicKey, Transaction};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::payload::prepend_block_height;
use super::record::{AnchorRecord, BitcoinStruct};
use super::{AnchorReceipt, DirectoryBlockAnchorInfo, PlaceAnchor};
use crate::error::{AnchorError, Result};
use crate::factom::FactomClient;

/// Outputs below this are non-standard and will not relay.
const DUST_LIMIT_SATS: u64 = 546;

/// How many of our own broadcast txids are remembered as spendable change.
const OWN_TXID_MEMORY: usize = 64;

/// Configuration for Bitcoin anchoring.
#[derive(Debug, Clone)]
pub struct BitcoinConfig {
    /// Esplora API base URL, e.g. `https://mempool.space/testnet/api`.
    pub api_url: String,
    pub network: Network,
    /// Key of the anchor wallet, checked against `network`.
    pub private_key: PrivateKey,
    /// Flat fee per anchor transaction.
    pub fee_sats: u64,
    pub confirm_poll: Duration,
    pub confirm_max_polls: u32,
}

pub struct BitcoinAnchor {
    client: Client,
    config: BitcoinConfig,
    wallet: AnchorWallet,
    spends: Mutex<SpendState>,
    factom: Arc<FactomClient>,
}

#[derive(Debug, Deserialize)]
struct Utxo {
    txid: String,
    vout: u32,
    value: u64,
    status: UtxoStatus,
}

#[derive(Debug, Deserialize)]
struct UtxoStatus {
    confirmed: bool,
}

#[derive(Debug, Deserialize)]
struct TxStatus {
    confirmed: bool,
    block_height: Option<u64>,
    block_hash: Option<String>,
}

/// Parse a network name: "mainnet", "testnet", "signet" or "regtest".
pub fn parse_network(name: &str) -> Result<Network> {
    match name {
        "mainnet" | "bitcoin" => Ok(Network::Bitcoin),
        "testnet" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        other => Err(AnchorError::Config(format!(
            "unknown Bitcoin network {other:?} (mainnet, testnet, signet or regtest)"
        ))),
    }
}

/// Parse a WIF key and check that it was encoded for `network`.
pub fn parse_wif(wif: &str, network: Network) -> Result<PrivateKey> {
    let key = PrivateKey::from_wif(wif.trim())
        .map_err(|e| AnchorError::Config(format!("Invalid WIF key: {e}")))?;
    if key.network != NetworkKind::from(network) {
        return Err(AnchorError::Config(format!(
            "WIF key is for {:?} networks, configured network is {network}",
            key.network
        )));
    }
    Ok(key)
}

/// Coins this process has already spent, and change it can spend before
/// it confirms.
#[derive(Debug, Default)]
struct SpendState {
    spent: HashSet<(String, u32)>,
    own_txids: VecDeque<String>,
}

impl SpendState {
    /// Forget spent outpoints the API no longer lists.
    fn prune(&mut self, listed: &[Utxo]) {
        self.spent
            .retain(|(txid, vout)| listed.iter().any(|u| &u.txid == txid && u.vout == *vout));
    }

    fn is_spendable(&self, utxo: &Utxo) -> bool {
        (utxo.status.confirmed || self.own_txids.contains(&utxo.txid))
            && !self.spent.contains(&(utxo.txid.clone(), utxo.vout))
    }

    fn record_spend(&mut self, utxo: &Utxo, new_txid: &str) {
        self.spent.insert((utxo.txid.clone(), utxo.vout));
        self.own_txids.push_back(new_txid.to_string());
        if self.own_txids.len() > OWN_TXID_MEMORY {
            self.own_txids.pop_front();
        }
    }
}

/// Key and P2PKH address that fund and receive change for anchors.
struct AnchorWallet {
    secp: Secp256k1<All>,
    key: PrivateKey,
    public_key: PublicKey,
    address: Address,
}

impl AnchorWallet {
    fn new(key: PrivateKey, network: Network) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_private_key(&secp, &key);
        let address = Address::p2pkh(public_key, network);
        Self {
            secp,
            key,
            public_key,
            address,
        }
    }

    /// Sign input 0 of `tx` as a P2PKH spend from this wallet.
    fn sign_p2pkh(&self, tx: &mut Transaction) -> Result<()> {
        use bitcoin::hashes::Hash;
        use bitcoin::secp256k1::Message;
        use bitcoin::sighash::SighashCache;
        use bitcoin::EcdsaSighashType;

        let sighash_type = EcdsaSighashType::All;
        let sighash = SighashCache::new(&*tx)
            .legacy_signature_hash(0, &self.address.script_pubkey(), sighash_type.to_u32())
            .map_err(|e| AnchorError::Chain(format!("Sighash error: {e}")))?;

        let digest = Message::from_digest(sighash.to_byte_array());
        let mut sig = self
            .secp
            .sign_ecdsa(&digest, &self.key.inner)
            .serialize_der()
            .to_vec();
        sig.push(sighash_type.to_u32() as u8);

        let sig = PushBytesBuf::try_from(sig)
            .map_err(|e| AnchorError::Chain(format!("Signature push failed: {e}")))?;
        let pubkey = PushBytesBuf::try_from(self.public_key.to_bytes())
            .map_err(|e| AnchorError::Chain(format!("Public key push failed: {e}")))?;

        tx.input[0].script_sig = ScriptBuilder::new()
            .push_slice(&sig)
            .push_slice(&pubkey)
            .into_script();
        Ok(())
    }
}

/// First spendable UTXO that covers the fee and leaves non-dust change.
fn select_utxo<'a>(utxos: &'a [Utxo], fee: u64, spends: &SpendState) -> Option<&'a Utxo> {
    utxos
        .iter()
        .find(|u| spends.is_spendable(u) && u.value >= fee.saturating_add(DUST_LIMIT_SATS))
}

fn op_return_script(payload: &[u8]) -> Result<ScriptBuf> {
    let data = PushBytesBuf::try_from(payload.to_vec())
        .map_err(|e| AnchorError::Chain(format!("Payload too large for OP_RETURN: {e}")))?;
    Ok(ScriptBuilder::new()
        .push_opcode(OP_RETURN)
        .push_slice(&data)
        .into_script())
}

/// Spend `utxo` into an OP_RETURN output carrying `payload` (output 0)
/// and change back to the wallet (output 1), signed.
fn build_anchor_tx(
    wallet: &AnchorWallet,
    utxo: &Utxo,
    payload: &[u8],
    fee: u64,
) -> Result<Transaction> {
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, Sequence, TxIn, TxOut, Txid, Witness};

    let prev_txid: Txid = utxo
        .txid
        .parse()
        .map_err(|e| AnchorError::Serialization(format!("Invalid UTXO txid: {e}")))?;

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(prev_txid, utxo.vout),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::default(),
        }],
        output: vec![
            TxOut {
                value: Amount::ZERO,
                script_pubkey: op_return_script(payload)?,
            },
            TxOut {
                value: Amount::from_sat(utxo.value - fee),
                script_pubkey: wallet.address.script_pubkey(),
            },
        ],
    };
    wallet.sign_p2pkh(&mut tx)?;
    Ok(tx)
}

impl BitcoinAnchor {
    pub fn new(config: BitcoinConfig, factom: Arc<FactomClient>) -> Self {
        let wallet = AnchorWallet::new(config.private_key, config.network);
        info!(address = %wallet.address, "Bitcoin anchor wallet");
        Self {
            client: Client::new(),
            config,
            wallet,
            spends: Mutex::new(SpendState::default()),
            factom,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| AnchorError::Transport(format!("{what} lookup failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AnchorError::Transport(format!(
                "{what} lookup returned {status}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| AnchorError::Serialization(format!("Failed to parse {what}: {e}")))
    }

    /// Pick a coin, build and broadcast the anchor transaction. Holds the
    /// spend lock throughout so overlapping placements pick different coins.
    async fn spend_into_anchor(&self, payload: &[u8]) -> Result<String> {
        let mut spends = self.spends.lock().await;

        let utxos: Vec<Utxo> = self
            .get_json(&format!("/address/{}/utxo", self.wallet.address), "UTXOs")
            .await?;
        spends.prune(&utxos);

        let fee = self.config.fee_sats;
        let utxo = select_utxo(&utxos, fee, &spends).ok_or_else(|| {
            AnchorError::Chain(format!(
                "No spendable UTXO above {fee} sats at {}",
                self.wallet.address
            ))
        })?;
        debug!(txid = %utxo.txid, vout = utxo.vout, value = utxo.value, "Spending UTXO");

        let tx = build_anchor_tx(&self.wallet, utxo, payload, fee)?;
        let txid = self.broadcast_tx(&tx).await?;
        spends.record_spend(utxo, &txid);
        Ok(txid)
    }

    /// Broadcast a raw transaction. Returns the txid reported by the API.
    async fn broadcast_tx(&self, tx: &Transaction) -> Result<String> {
        let resp = self
            .client
            .post(self.url("/tx"))
            .body(bitcoin::consensus::encode::serialize_hex(tx))
            .send()
            .await
            .map_err(|e| AnchorError::Transport(format!("Bitcoin broadcast failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnchorError::Chain(format!("Bitcoin broadcast rejected: {body}")));
        }

        let txid = resp.text().await.map_err(|e| {
            AnchorError::Serialization(format!("Failed to read broadcast response: {e}"))
        })?;
        Ok(txid.trim().to_string())
    }

    /// Poll the transaction status until it is confirmed. Failed polls
    /// are retried; only the poll budget ends the wait.
    async fn wait_for_confirmation(&self, txid: &str) -> Result<(u64, String)> {
        let path = format!("/tx/{txid}/status");
        for attempt in 1..=self.config.confirm_max_polls {
            match self.get_json::<TxStatus>(&path, "tx status").await {
                Ok(TxStatus {
                    confirmed: true,
                    block_height: Some(height),
                    block_hash: Some(hash),
                }) => return Ok((height, hash)),
                Ok(_) => debug!(txid, attempt, "Waiting for Bitcoin confirmation"),
                Err(e) => warn!(txid, attempt, error = %e, "Tx status poll failed"),
            }

            tokio::time::sleep(self.config.confirm_poll).await;
        }

        Err(AnchorError::Chain(format!(
            "Transaction {txid} not confirmed after {} polls",
            self.config.confirm_max_polls
        )))
    }

    /// Position of `txid` within its block.
    async fn tx_offset(&self, block_hash: &str, txid: &str) -> Result<i32> {
        let txids: Vec<String> = self
            .get_json(&format!("/block/{block_hash}/txids"), "block txids")
            .await?;

        txids
            .iter()
            .position(|t| t == txid)
            .map(|p| p as i32)
            .ok_or_else(|| AnchorError::Chain(format!("Transaction {txid} not in block {block_hash}")))
    }
}

#[async_trait]
impl PlaceAnchor for BitcoinAnchor {
    fn chain_name(&self) -> &str {
        "Bitcoin"
    }

    async fn place_anchor(&self, info: &DirectoryBlockAnchorInfo) -> Result<AnchorReceipt> {
        let payload = prepend_block_height(info.db_height, &info.key_mr)?;
        let txid = self.spend_into_anchor(&payload).await?;
        info!(db_height = info.db_height, txid = %txid, "Bitcoin anchor broadcast");

        let (block_height, block_hash) = self.wait_for_confirmation(&txid).await?;
        let offset = self.tx_offset(&block_hash, &txid).await?;

        let record = AnchorRecord::bitcoin(
            info,
            BitcoinStruct {
                address: self.wallet.address.to_string(),
                txid: txid.clone(),
                block_height: block_height as i32,
                block_hash: block_hash.clone(),
                offset,
            },
        );
        self.factom.submit_entry_to_anchor_chain(&record).await?;

        Ok(AnchorReceipt {
            chain: "bitcoin".to_string(),
            tx_id: txid,
            block_height,
            block_hash,
            db_height: info.db_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regtest_key() -> PrivateKey {
        use bitcoin::secp256k1::SecretKey;

        PrivateKey::new(SecretKey::from_slice(&[0x22; 32]).unwrap(), Network::Regtest)
    }

    fn wallet() -> AnchorWallet {
        AnchorWallet::new(regtest_key(), Network::Regtest)
    }

    fn utxo(value: u64, confirmed: bool) -> Utxo {
        utxo_at("ab", 0, value, confirmed)
    }

    fn utxo_at(txid_byte: &str, vout: u32, value: u64, confirmed: bool) -> Utxo {
        Utxo {
            txid: txid_byte.repeat(32),
            vout,
            value,
            status: UtxoStatus { confirmed },
        }
    }

    #[test]
    fn test_network_names() {
        assert_eq!(parse_network("mainnet").unwrap(), Network::Bitcoin);
        assert_eq!(parse_network("testnet").unwrap(), Network::Testnet);
        assert_eq!(parse_network("signet").unwrap(), Network::Signet);
        assert_eq!(parse_network("regtest").unwrap(), Network::Regtest);
        assert!(matches!(parse_network("mainnnet"), Err(AnchorError::Config(_))));
    }

    #[test]
    fn test_wif_network_must_match() {
        let wif = regtest_key().to_wif();
        assert!(parse_wif(&wif, Network::Testnet).is_ok());
        assert!(matches!(
            parse_wif(&wif, Network::Bitcoin),
            Err(AnchorError::Config(_))
        ));
    }

    #[test]
    fn test_select_utxo_skips_unconfirmed_and_dust() {
        let spends = SpendState::default();
        let utxos = vec![
            utxo(100_000, false),
            utxo(5_000 + DUST_LIMIT_SATS - 1, true),
            utxo(5_000 + DUST_LIMIT_SATS, true),
        ];
        let picked = select_utxo(&utxos, 5_000, &spends).unwrap();
        assert_eq!(picked.value, 5_000 + DUST_LIMIT_SATS);

        assert!(select_utxo(&utxos[..2], 5_000, &spends).is_none());
    }

    #[test]
    fn test_spent_outpoints_are_skipped() {
        let mut spends = SpendState::default();
        let utxos = vec![utxo_at("aa", 0, 50_000, true), utxo_at("cc", 1, 50_000, true)];

        let first = select_utxo(&utxos, 5_000, &spends).unwrap();
        assert_eq!(first.txid, "aa".repeat(32));
        spends.record_spend(first, &"bb".repeat(32));

        let second = select_utxo(&utxos, 5_000, &spends).unwrap();
        assert_eq!(second.txid, "cc".repeat(32));
        spends.record_spend(second, &"dd".repeat(32));

        assert!(select_utxo(&utxos, 5_000, &spends).is_none());
    }

    #[test]
    fn test_own_unconfirmed_change_is_spendable() {
        let mut spends = SpendState::default();
        let confirmed = utxo_at("aa", 0, 50_000, true);
        spends.record_spend(&confirmed, &"bb".repeat(32));

        let listed = vec![utxo_at("bb", 1, 45_000, false), utxo_at("ee", 0, 90_000, false)];
        spends.prune(&listed);
        assert!(spends.spent.is_empty());

        let picked = select_utxo(&listed, 5_000, &spends).unwrap();
        assert_eq!(picked.txid, "bb".repeat(32));
    }

    #[test]
    fn test_anchor_tx_layout() {
        let payload = prepend_block_height(42, &[0x77; 32]).unwrap();
        let wallet = wallet();
        let tx = build_anchor_tx(&wallet, &utxo(20_000, true), &payload, 5_000).unwrap();

        assert_eq!(tx.input.len(), 1);
        assert!(!tx.input[0].script_sig.is_empty());
        assert_eq!(tx.output.len(), 2);

        let op_return = tx.output[0].script_pubkey.as_bytes();
        assert_eq!(op_return[0], 0x6a);
        assert_eq!(op_return[1] as usize, payload.len());
        assert_eq!(&op_return[2..], payload.as_slice());
        assert_eq!(tx.output[0].value.to_sat(), 0);

        assert_eq!(tx.output[1].value.to_sat(), 15_000);
        assert_eq!(tx.output[1].script_pubkey, wallet.address.script_pubkey());
    }

    #[test]
    fn test_bad_wif_is_config_error() {
        assert!(matches!(
            parse_wif("not-a-key", Network::Testnet),
            Err(AnchorError::Config(_))
        ));
    }
}
