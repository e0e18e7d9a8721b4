/// Service configuration, loaded from a TOML file.
///
/// ```toml
/// [app]
/// factom_addr = "localhost:8088"
/// anchor_to = 0            # 0 = Bitcoin, 1 = Ethereum
///
/// [anchor]
/// server_ec_key = "Es..."
/// sig_key = "<64 or 128 hex chars>"
/// anchor_chain_id = "df3ade9eec4b08d5379cc64270c30ea7315d8a8a1a69efe2b98a60ecdd69e604"
///
/// [btc]
/// api_url = "https://mempool.space/testnet/api"
/// wif_private_key = "..."
/// ```
///
/// Raw values are kept as strings here; `AnchorSettings::from_config`
/// parses keys and ids and rejects anything malformed.
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::anchor::bitcoin::{self, BitcoinConfig};
use crate::anchor::ethereum::{self, EthereumConfig};
use crate::anchor::service::DEFAULT_FAILURE_THRESHOLD;
use crate::crypto::sign::SigKey;
use crate::error::{AnchorError, Result};
use crate::factom::ec::EcAddress;
use crate::factom::FactomConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppSection,
    pub anchor: AnchorSection,
    pub btc: Option<BtcSection>,
    pub eth: Option<EthSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub factom_addr: String,
    pub anchor_to: i64,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reveal_delay_ms")]
    pub reveal_delay_ms: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    pub factomd_user: Option<String>,
    pub factomd_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnchorSection {
    pub server_ec_key: String,
    pub sig_key: String,
    pub anchor_chain_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BtcSection {
    pub api_url: String,
    #[serde(default = "default_btc_network")]
    pub network: String,
    pub wif_private_key: String,
    #[serde(default = "default_fee_sats")]
    pub fee_sats: u64,
    #[serde(default = "default_btc_poll_secs")]
    pub confirm_poll_secs: u64,
    #[serde(default = "default_btc_max_polls")]
    pub confirm_max_polls: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EthSection {
    pub rpc_url: String,
    pub private_key_hex: String,
    pub chain_id: u64,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_eth_poll_secs")]
    pub confirm_poll_secs: u64,
    #[serde(default = "default_eth_max_polls")]
    pub confirm_max_polls: u32,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8099".to_string()
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_reveal_delay_ms() -> u64 {
    2_000
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_btc_network() -> String {
    "testnet".to_string()
}

fn default_fee_sats() -> u64 {
    5_000
}

fn default_btc_poll_secs() -> u64 {
    60
}

fn default_btc_max_polls() -> u32 {
    180
}

fn default_gas_limit() -> u64 {
    30_000
}

fn default_eth_poll_secs() -> u64 {
    15
}

fn default_eth_max_polls() -> u32 {
    240
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            AnchorError::Config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AnchorError::Config(e.to_string()))
    }
}

/// Which chain receives anchors.
#[derive(Debug, Clone)]
pub enum Backend {
    Bitcoin(BitcoinConfig),
    Ethereum(EthereumConfig),
}

/// Fully parsed settings. Building one fails on any malformed key, id or
/// backend selector.
#[derive(Debug)]
pub struct AnchorSettings {
    pub factom: FactomConfig,
    pub ec: EcAddress,
    pub sig_key: SigKey,
    pub backend: Backend,
    pub listen_addr: String,
    pub failure_threshold: u32,
}

impl AnchorSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let ec = EcAddress::from_secret(&config.anchor.server_ec_key)
            .map_err(|e| AnchorError::Config(format!("Cannot parse server EC key: {e}")))?;
        let sig_key = SigKey::from_hex(&config.anchor.sig_key)
            .map_err(|e| AnchorError::Config(format!("Cannot parse signature key: {e}")))?;
        let anchor_chain_id = parse_chain_id(&config.anchor.anchor_chain_id)?;

        let app = &config.app;
        if app.failure_threshold == 0 {
            return Err(AnchorError::Config("failure_threshold must be at least 1".into()));
        }

        let backend = match app.anchor_to {
            0 => {
                let btc = config
                    .btc
                    .as_ref()
                    .ok_or_else(|| AnchorError::Config("anchor_to = 0 needs a [btc] section".into()))?;
                let network = bitcoin::parse_network(&btc.network)?;
                Backend::Bitcoin(BitcoinConfig {
                    api_url: btc.api_url.trim_end_matches('/').to_string(),
                    network,
                    private_key: bitcoin::parse_wif(&btc.wif_private_key, network)?,
                    fee_sats: btc.fee_sats,
                    confirm_poll: Duration::from_secs(btc.confirm_poll_secs),
                    confirm_max_polls: btc.confirm_max_polls,
                })
            }
            1 => {
                let eth = config
                    .eth
                    .as_ref()
                    .ok_or_else(|| AnchorError::Config("anchor_to = 1 needs an [eth] section".into()))?;
                Backend::Ethereum(EthereumConfig {
                    rpc_url: eth.rpc_url.clone(),
                    signer: ethereum::parse_private_key(&eth.private_key_hex)?,
                    chain_id: eth.chain_id,
                    gas_limit: eth.gas_limit,
                    confirm_poll: Duration::from_secs(eth.confirm_poll_secs),
                    confirm_max_polls: eth.confirm_max_polls,
                })
            }
            other => {
                return Err(AnchorError::Config(format!(
                    "anchor_to = {other} is not supported (0 = Bitcoin, 1 = Ethereum)"
                )))
            }
        };

        let basic_auth = match (&app.factomd_user, &app.factomd_password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            (None, None) => None,
            _ => {
                return Err(AnchorError::Config(
                    "factomd_user and factomd_password must be set together".into(),
                ))
            }
        };

        Ok(Self {
            factom: FactomConfig {
                server: app.factom_addr.clone(),
                anchor_chain_id,
                reveal_delay: Duration::from_millis(app.reveal_delay_ms),
                timeout: Duration::from_secs(app.http_timeout_secs),
                basic_auth,
            },
            ec,
            sig_key,
            backend,
            listen_addr: app.listen_addr.clone(),
            failure_threshold: app.failure_threshold,
        })
    }
}

fn parse_chain_id(s: &str) -> Result<[u8; 32]> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(s.trim(), &mut out)
        .map_err(|e| AnchorError::Config(format!("Cannot parse anchor chain id: {e}")))?;
    Ok(out)
}
