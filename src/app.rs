/// Process wiring: the dispatch loop and its HTTP intake.
///
/// Both share one cancellation token. Whichever stops first cancels it,
/// and `run` returns only after the intake server has shut down.
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::anchor::service::{AnchorService, ServiceExit};
use crate::anchor::PlaceAnchor;
use crate::error::{AnchorError, Result};
use crate::server::{self, AppState};

pub const REQUEST_QUEUE_CAPACITY: usize = 128;

/// Run `placer` behind an intake served on `listener` until the failure
/// threshold is hit, `shutdown` is cancelled, or the server stops.
pub async fn run(
    placer: Arc<dyn PlaceAnchor>,
    listener: TcpListener,
    failure_threshold: u32,
    shutdown: CancellationToken,
) -> Result<ServiceExit> {
    let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
    let state = AppState {
        requests: requests_tx,
        chain: placer.chain_name().to_string(),
    };
    let service = AnchorService::new(placer, requests_rx, failure_threshold, shutdown.clone());

    let mut server = tokio::spawn(server::serve(listener, state, shutdown.clone()));

    let exit = tokio::select! {
        exit = service.run() => {
            shutdown.cancel();
            match server.await {
                Ok(Err(e)) => error!(error = %e, "Intake server failed during shutdown"),
                Err(e) => error!(error = %e, "Intake server task panicked"),
                Ok(Ok(())) => {}
            }
            exit
        }
        res = &mut server => {
            shutdown.cancel();
            res.map_err(|e| AnchorError::Io(std::io::Error::other(e)))??;
            ServiceExit::Shutdown
        }
    };

    Ok(exit)
}
