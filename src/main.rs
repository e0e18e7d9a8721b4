use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use factom_anchor::anchor::bitcoin::BitcoinAnchor;
use factom_anchor::anchor::ethereum::EthereumAnchor;
use factom_anchor::anchor::payload::encode_height_hash;
use factom_anchor::anchor::service::ServiceExit;
use factom_anchor::anchor::PlaceAnchor;
use factom_anchor::app;
use factom_anchor::config::{AnchorSettings, Backend, Config};
use factom_anchor::error::{AnchorError, Result};
use factom_anchor::factom::FactomClient;
use factom_anchor::logging::{self, LogFormat};

#[derive(Parser)]
#[command(name = "factom-anchor")]
#[command(about = "Anchor Factom directory blocks into Bitcoin or Ethereum")]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the anchor service and its HTTP intake
    Run {
        /// Path to the TOML configuration file
        #[arg(long, env = "FACTOM_ANCHOR_CONFIG", default_value = "anchor.toml")]
        config: PathBuf,
    },
    /// Print the on-chain payload for a block height and hash
    Encode {
        height: u64,
        /// Hash as hex
        hash: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::Encode { height, hash } => encode(height, &hash),
    }
}

fn encode(height: u64, hash: &str) -> ExitCode {
    let result = hex::decode(hash.trim_start_matches("0x"))
        .map_err(|e| AnchorError::Serialization(format!("hash is not hex: {e}")))
        .and_then(|hash| encode_height_hash(height, &hash));

    match result {
        Ok(payload) => {
            println!("{}", hex::encode(payload));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: &Path) -> ExitCode {
    let settings = match Config::load(path).and_then(|c| AnchorSettings::from_config(&c)) {
        Ok(settings) => settings,
        Err(e) => {
            error!(config = %path.display(), error = %e, "Cannot start anchor service");
            return ExitCode::FAILURE;
        }
    };

    match start(settings).await {
        Ok(exit) if exit.is_failure() => {
            error!(?exit, "Anchor service stopped after repeated failures");
            ExitCode::FAILURE
        }
        Ok(exit) => {
            info!(?exit, "Anchor service stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Anchor service failed");
            ExitCode::FAILURE
        }
    }
}

async fn start(settings: AnchorSettings) -> Result<ServiceExit> {
    let AnchorSettings {
        factom,
        ec,
        sig_key,
        backend,
        listen_addr,
        failure_threshold,
    } = settings;

    let factom = Arc::new(FactomClient::new(factom, ec, sig_key)?);
    let placer: Arc<dyn PlaceAnchor> = match backend {
        Backend::Bitcoin(config) => {
            info!(api = %config.api_url, network = %config.network, "Anchoring to Bitcoin");
            Arc::new(BitcoinAnchor::new(config, factom))
        }
        Backend::Ethereum(config) => {
            info!(rpc = %config.rpc_url, chain_id = config.chain_id, "Anchoring to Ethereum");
            Arc::new(EthereumAnchor::new(config, factom))
        }
    };

    let listener = TcpListener::bind(&listen_addr).await?;
    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    app::run(placer, listener, failure_threshold, shutdown).await
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
        _ = terminate() => info!("Received SIGTERM"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}
