/// Factom client for writing anchor records to the anchor chain.
///
/// Entries land in two phases against factomd's `/v2` JSON-RPC endpoint:
///
/// ```text
/// commit-entry  ──(settle)──▶  reveal-entry
/// ```
///
/// The commit pays for and registers the entry hash; the reveal carries
/// the entry itself. Both phases are built from the same `Entry` value, so
/// the revealed bytes always hash to what was committed.
pub mod compose;
pub mod ec;
pub mod entry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use self::compose::{compose_entry_commit, compose_entry_reveal, JsonRpcResponse};
use self::ec::EcAddress;
use self::entry::{new_anchor_entry, Entry};
use crate::anchor::record::AnchorRecord;
use crate::crypto::sign::SigKey;
use crate::error::{AnchorError, Result};

/// Connection settings for factomd.
#[derive(Debug, Clone)]
pub struct FactomConfig {
    /// factomd API address, `host:port`.
    pub server: String,
    /// Chain that receives anchor records.
    pub anchor_chain_id: [u8; 32],
    /// Pause between commit and reveal so the commit can propagate.
    pub reveal_delay: Duration,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Optional factomd RPC username and password.
    pub basic_auth: Option<(String, String)>,
}

/// Client that commits and reveals anchor entries.
pub struct FactomClient {
    client: Client,
    config: FactomConfig,
    endpoint: String,
    ec: EcAddress,
    sig_key: SigKey,
    next_id: AtomicU64,
}

impl FactomClient {
    pub fn new(config: FactomConfig, ec: EcAddress, sig_key: SigKey) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnchorError::Transport(format!("failed to build HTTP client: {e}")))?;
        let endpoint = format!("http://{}/v2", config.server);

        info!(
            server = %config.server,
            ec_address = %ec.public_address(),
            chain_id = %hex::encode(config.anchor_chain_id),
            "Factom client ready"
        );

        Ok(Self {
            client,
            config,
            endpoint,
            ec,
            sig_key,
            next_id: AtomicU64::new(0),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sign `record` and write it to the anchor chain.
    pub async fn submit_entry_to_anchor_chain(&self, record: &AnchorRecord) -> Result<()> {
        let (raw, sig) = record.marshal_and_sign(&self.sig_key)?;
        let entry = new_anchor_entry(self.config.anchor_chain_id, &sig, raw);
        self.commit_and_reveal(&entry).await
    }

    /// Commit `entry`, wait for the settling delay, then reveal it.
    ///
    /// A rejected commit does not stop the reveal; the rejection is
    /// reported once both phases have run. Transport errors return
    /// immediately.
    pub async fn commit_and_reveal(&self, entry: &Entry) -> Result<()> {
        let commit = compose_entry_commit(entry, &self.ec, self.next_id())?;
        info!(
            entry_hash = %hex::encode(entry.hash()?),
            chain_id = %entry.chain_id_hex(),
            "Committing entry"
        );
        let commit_status = self.post("commit", &commit).await?;

        tokio::time::sleep(self.config.reveal_delay).await;

        let reveal = compose_entry_reveal(entry, self.next_id())?;
        info!(chain_id = %entry.chain_id_hex(), "Revealing entry");
        let reveal_status = self.post("reveal", &reveal).await?;

        for (phase, status) in [("commit", commit_status), ("reveal", reveal_status)] {
            if !status.is_success() {
                return Err(AnchorError::ServerRejection {
                    phase,
                    status: status.as_u16(),
                });
            }
        }

        info!(chain_id = %entry.chain_id_hex(), "Entry committed and revealed");
        Ok(())
    }

    /// POST a JSON-RPC request and log the outcome. Only transport
    /// failures are errors here; the status is returned for the caller.
    async fn post<T: Serialize>(&self, phase: &'static str, request: &T) -> Result<StatusCode> {
        let body = serde_json::to_vec(request)
            .map_err(|e| AnchorError::Composition(format!("{phase} encode failed: {e}")))?;
        debug!(phase, body = %String::from_utf8_lossy(&body), "Posting to factomd");

        let mut req = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some((user, password)) = &self.config.basic_auth {
            req = req.basic_auth(user, Some(password));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AnchorError::Transport(format!("{phase} request failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            error!(
                phase,
                "factomd username/password incorrect, check factomd_user and factomd_password"
            );
        } else if !status.is_success() {
            error!(phase, status = status.as_u16(), "factomd returned an error status");
        }

        match resp.bytes().await {
            Ok(body) => match serde_json::from_slice::<JsonRpcResponse>(&body) {
                Ok(parsed) => match parsed.error {
                    Some(err) => warn!(
                        phase,
                        code = err.code,
                        message = %err.message,
                        "factomd returned a JSON-RPC error"
                    ),
                    None => debug!(phase, result = ?parsed.result, "factomd response"),
                },
                Err(e) => error!(phase, error = %e, "Failed to parse factomd response body"),
            },
            Err(e) => error!(phase, error = %e, "Failed to read factomd response body"),
        }

        Ok(status)
    }
}
