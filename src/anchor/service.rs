/// Anchor dispatch loop.
///
/// Receives directory blocks to anchor and hands each one to the
/// configured backend on its own task:
///
/// ```text
/// requests ──▶ AnchorService ──spawn──▶ PlaceAnchor::place_anchor
///                  ▲                          │
///                  └──────── failures ◀───────┘ (on error)
/// ```
///
/// The loop owns the failure counter. It is never reset: once the
/// threshold is reached the loop requests shutdown through its
/// cancellation token and stops taking requests, leaving the restart to
/// the process supervisor.
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{AnchorFailure, DirectoryBlockAnchorInfo, PlaceAnchor};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Monotonic failure count checked against a fixed threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureCounter {
    count: u32,
    threshold: u32,
}

impl FailureCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record one failure. Returns true once the threshold is reached.
    pub fn record(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.count >= self.threshold
    }
}

/// Why the dispatch loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceExit {
    /// Too many failed placements; shutdown was requested.
    FailureThreshold { failures: u32 },
    /// The shutdown token was cancelled by someone else.
    Shutdown,
    /// Every request sender was dropped.
    IntakeClosed,
}

impl ServiceExit {
    /// True when the process should exit with a failure status.
    pub fn is_failure(&self) -> bool {
        matches!(self, ServiceExit::FailureThreshold { .. })
    }
}

pub struct AnchorService {
    placer: Arc<dyn PlaceAnchor>,
    requests: mpsc::Receiver<DirectoryBlockAnchorInfo>,
    failures: mpsc::Receiver<AnchorFailure>,
    failure_tx: mpsc::Sender<AnchorFailure>,
    counter: FailureCounter,
    shutdown: CancellationToken,
}

impl AnchorService {
    pub fn new(
        placer: Arc<dyn PlaceAnchor>,
        requests: mpsc::Receiver<DirectoryBlockAnchorInfo>,
        failure_threshold: u32,
        shutdown: CancellationToken,
    ) -> Self {
        let (failure_tx, failures) = mpsc::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            placer,
            requests,
            failures,
            failure_tx,
            counter: FailureCounter::new(failure_threshold),
            shutdown,
        }
    }

    /// Sender for failure signals raised outside the loop's own
    /// placement tasks.
    pub fn failure_sender(&self) -> mpsc::Sender<AnchorFailure> {
        self.failure_tx.clone()
    }

    /// Run until the failure threshold is hit, shutdown is requested, or
    /// the intake closes.
    ///
    /// Failures already queued are always counted before the next request
    /// is accepted.
    pub async fn run(mut self) -> ServiceExit {
        info!(
            chain = self.placer.chain_name(),
            threshold = self.counter.threshold(),
            "Start anchor service"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!(failures = self.counter.count(), "Shutdown requested, stopping anchor service");
                    return ServiceExit::Shutdown;
                }

                Some(failure) = self.failures.recv() => {
                    let tripped = self.counter.record();
                    error!(
                        chain = %failure.chain,
                        db_height = failure.db_height,
                        failures = self.counter.count(),
                        "Anchor failed"
                    );
                    if tripped {
                        error!(
                            failures = self.counter.count(),
                            threshold = self.counter.threshold(),
                            "Too many anchor failures, requesting shutdown"
                        );
                        self.shutdown.cancel();
                        return ServiceExit::FailureThreshold {
                            failures: self.counter.count(),
                        };
                    }
                }

                msg = self.requests.recv() => match msg {
                    Some(info) => self.dispatch(info),
                    None => {
                        warn!("Anchor request intake closed, stopping anchor service");
                        return ServiceExit::IntakeClosed;
                    }
                },
            }
        }
    }

    fn dispatch(&self, info: DirectoryBlockAnchorInfo) {
        info!(
            db_height = info.db_height,
            key_mr = %hex::encode(info.key_mr),
            "Got anchor request"
        );

        let placer = Arc::clone(&self.placer);
        let failures = self.failure_tx.clone();
        tokio::spawn(async move {
            let chain = placer.chain_name().to_string();
            match placer.place_anchor(&info).await {
                Ok(receipt) => info!(
                    chain = %chain,
                    db_height = info.db_height,
                    tx_id = %receipt.tx_id,
                    "Anchor placed"
                ),
                Err(e) => {
                    error!(
                        chain = %chain,
                        db_height = info.db_height,
                        error = %e,
                        "Anchor placement failed"
                    );
                    let failure = AnchorFailure {
                        chain,
                        db_height: info.db_height,
                    };
                    if failures.send(failure).await.is_err() {
                        warn!(db_height = info.db_height, "Anchor service stopped, failure not counted");
                    }
                }
            }
        });
    }
}
