//! # Work Loop
//!
//! The single-threaded polling driver: fetch a task, run each instruction
//! it carries in fixed order, batch the results into one report, and sleep
//! until the next poll. Retries live inside individual gateway operations;
//! the loop itself never retries a task, and a failure inside one branch
//! never stops the remaining branches or the loop.
//!
//! The only state carried across iterations is the most recently processed
//! download URL, held as a field here so the loop's state machine is
//! self-contained and resettable per test.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use pincast_common::Config;

use crate::dispatcher::{NodeStatus, WorkDispatcher};
use crate::gateway::{GatewayError, StorageGateway};
use crate::task::{classify, ErrorCode, Instruction, Task, WorkResult};
use crate::verify::confirm_size;

// ════════════════════════════════════════════════════════════════════════════
// ITERATION OUTCOME
// ════════════════════════════════════════════════════════════════════════════

/// What one poll iteration amounted to; decides the next poll delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// At least one instruction was executed.
    Worked,
    /// Dispatcher reported no work.
    Idle,
    /// Payload matched no known shape and was dropped.
    Dropped,
    /// The poll itself failed before any work was seen.
    PollFailed,
}

impl IterationOutcome {
    /// Idle iterations wait the long interval; everything else polls again
    /// after the short one.
    pub fn next_delay(&self, config: &Config) -> Duration {
        match self {
            IterationOutcome::Idle => config.long_poll,
            _ => config.short_poll,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SCHEDULER
// ════════════════════════════════════════════════════════════════════════════

/// Polling driver owning the gateway and dispatcher clients.
pub struct Scheduler<G, D> {
    pub gateway: G,
    pub dispatcher: D,
    pub config: Config,
    /// Most recently processed download URL, kept as a verification
    /// tie-break for repeat downloads.
    last_download: Option<String>,
}

impl<G: StorageGateway, D: WorkDispatcher> Scheduler<G, D> {
    pub fn new(gateway: G, dispatcher: D, config: Config) -> Self {
        Scheduler {
            gateway,
            dispatcher,
            config,
            last_download: None,
        }
    }

    /// The most recently processed download URL, if any.
    pub fn last_download(&self) -> Option<&str> {
        self.last_download.as_deref()
    }

    /// Drive the loop until `shutdown` fires, finishing the in-flight
    /// iteration first.
    pub async fn run(&mut self, shutdown: Arc<Notify>) {
        info!(
            short_poll = ?self.config.short_poll,
            long_poll = ?self.config.long_poll,
            "work loop started"
        );
        loop {
            let outcome = self.run_once().await;
            let delay = outcome.next_delay(&self.config);
            debug!(?outcome, ?delay, "scheduling next poll");
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("work loop shutting down");
                    break;
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// One poll iteration: fetch, classify, execute, report.
    pub async fn run_once(&mut self) -> IterationOutcome {
        debug!("polling for work");
        let status = match self.node_status().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to gather node metadata");
                return IterationOutcome::PollFailed;
            }
        };
        let payload = match self.dispatcher.get_work(&status).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "work poll failed");
                return IterationOutcome::PollFailed;
            }
        };
        if !payload.show.is_empty() || !payload.episode.is_empty() {
            info!(show = %payload.show, episode = %payload.episode, "assigned episode");
        }

        match classify(payload) {
            Task::NoWork { message } => {
                debug!(%message, "dispatcher reports no work");
                IterationOutcome::Idle
            }
            Task::Unrecognized(payload) => {
                warn!(?payload, "unrecognized work payload, dropping");
                IterationOutcome::Dropped
            }
            Task::Assigned(instructions) => {
                let mut results = Vec::new();
                for instruction in instructions {
                    if let Some(result) = self.execute(instruction).await {
                        results.push(result);
                    }
                }
                if !results.is_empty() {
                    self.submit(&results).await;
                }
                IterationOutcome::Worked
            }
        }
    }

    async fn execute(&mut self, instruction: Instruction) -> Option<WorkResult> {
        match instruction {
            Instruction::Download { url, filename } => {
                info!(%url, %filename, "processing download task");
                let result = match self.handle_download(&url, &filename).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(error = %e, %url, "download task failed");
                        download_failure(e)
                    }
                };
                self.last_download = Some(url);
                info!("completed download work");
                Some(result)
            }
            Instruction::Pin { cid, name_hint } => {
                info!(%cid, "processing pin task");
                if let Err(e) = self.gateway.pin(&cid).await {
                    error!(error = %e, %cid, "failed to pin");
                    return Some(WorkResult::Failed {
                        code: ErrorCode::Pin,
                        message: None,
                    });
                }
                match self.gateway.verify_pin(&cid, name_hint.as_deref()).await {
                    Ok(pinned) => {
                        info!(%cid, length = pinned.length, "completed pin work");
                        Some(WorkResult::Pinned {
                            reference: pinned.reference.join(),
                            length: pinned.length.to_string(),
                        })
                    }
                    Err(e) => {
                        error!(error = %e, %cid, "failed to size pinned object");
                        Some(WorkResult::Failed {
                            code: ErrorCode::Generic,
                            message: None,
                        })
                    }
                }
            }
            Instruction::Delete { cid } => {
                info!(%cid, "processing delete task");
                match self.gateway.unpin(&cid).await {
                    Ok(removed) => {
                        info!(cid = removed.as_str(), "completed delete work");
                        Some(WorkResult::Deleted { cid: removed })
                    }
                    Err(e) => {
                        error!(error = %e, %cid, "failed to remove pin");
                        if self.config.report_delete_failures {
                            Some(WorkResult::Failed {
                                code: ErrorCode::Generic,
                                message: None,
                            })
                        } else {
                            None
                        }
                    }
                }
            }
        }
    }

    async fn handle_download(&self, url: &str, filename: &str) -> Result<WorkResult, GatewayError> {
        let bytes = self.gateway.fetch_source(url).await?;
        let outcome = self.gateway.add_bytes(bytes, filename).await?;
        let repeat = self.last_download.as_deref() == Some(url);
        let length =
            confirm_size(&self.gateway, &outcome.reference, filename, outcome.size, repeat).await?;
        Ok(WorkResult::Downloaded {
            reference: outcome.reference.join(),
            length: length.to_string(),
        })
    }

    async fn submit(&self, results: &[WorkResult]) {
        let status = match self.node_status().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "skipping report, node metadata unavailable");
                return;
            }
        };
        let used = match self.gateway.disk_usage().await {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "skipping report, disk usage unavailable");
                return;
            }
        };
        match self.dispatcher.send_report(&status, used, results).await {
            Ok(ack) => debug!(%ack, "report submitted"),
            Err(e) => warn!(error = %e, "failed to submit report"),
        }
    }

    async fn node_status(&self) -> Result<NodeStatus, GatewayError> {
        let daemon_id = self.gateway.identity().await?;
        let peers = self.gateway.peer_count().await?;
        let version = self.gateway.version().await?;
        Ok(NodeStatus {
            peers,
            daemon_id,
            daemon_version: version.version,
            online: version.online,
        })
    }
}

/// Map a download-branch failure to its reported result. Upstream HTTP
/// failures carry the dedicated download code plus the status message;
/// everything else is generic.
fn download_failure(e: GatewayError) -> WorkResult {
    match e {
        GatewayError::Http { message, .. } => WorkResult::Failed {
            code: ErrorCode::Download,
            message: Some(message),
        },
        _ => WorkResult::Failed {
            code: ErrorCode::Generic,
            message: None,
        },
    }
}
