//! # Work Loop Integration Tests
//!
//! Drives the scheduler through complete poll iterations against scripted
//! gateway and dispatcher doubles, with no daemon or network involved.
//!
//! ## Scenario Categories
//!
//! | Category | What It Exercises |
//! |----------|-------------------|
//! | A. Download | happy path, verification fallback, repeat tie-break |
//! | B. Pin | success, pin failure code, verify failure code |
//! | C. Delete | success, configurable failure reporting |
//! | D. Batching | multi-instruction payloads, single report |
//! | E. Scheduling | idle vs. worked vs. dropped vs. failed-poll delays |

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use pincast_common::Config;
use pincast_node::{
    AddOutcome, DaemonVersion, DispatchError, ErrorCode, GatewayError, IterationOutcome,
    NodeStatus, ObjectRef, PinnedObject, Scheduler, StorageGateway, WorkDispatcher, WorkPayload,
    WorkResult,
};

// ═══════════════════════════════════════════════════════════════════════════
// GATEWAY DOUBLE
// ═══════════════════════════════════════════════════════════════════════════

struct MockGateway {
    /// Bytes served for any source URL, or the error to fail with.
    source: Result<Vec<u8>, GatewayError>,
    pin_result: Result<(), GatewayError>,
    unpin_result: Result<(), GatewayError>,
    /// Size the directory listing reports, or the error to fail with.
    listed: Result<u64, GatewayError>,
    /// Successive `cat_size` results; exhausting the script is an error.
    cat_script: Mutex<VecDeque<Result<u64, GatewayError>>>,
    cat_calls: Mutex<Vec<(String, Option<String>)>>,
    public: Result<u64, GatewayError>,
}

impl MockGateway {
    /// A healthy daemon holding a 1000-byte object everywhere.
    fn healthy(cats: Vec<Result<u64, GatewayError>>) -> Self {
        MockGateway {
            source: Ok(vec![0u8; 1000]),
            pin_result: Ok(()),
            unpin_result: Ok(()),
            listed: Ok(1000),
            cat_script: Mutex::new(cats.into_iter().collect()),
            cat_calls: Mutex::new(Vec::new()),
            public: Ok(1000),
        }
    }

    fn cat_calls(&self) -> Vec<(String, Option<String>)> {
        self.cat_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageGateway for MockGateway {
    async fn fetch_source(&self, _url: &str) -> Result<Vec<u8>, GatewayError> {
        self.source.clone()
    }

    async fn add_bytes(&self, bytes: Vec<u8>, _filename: &str) -> Result<AddOutcome, GatewayError> {
        Ok(AddOutcome {
            reference: ObjectRef::new("QmFile", "QmDir"),
            size: bytes.len() as u64,
        })
    }

    async fn pin(&self, _cid: &str) -> Result<(), GatewayError> {
        self.pin_result.clone()
    }

    async fn cat_size(&self, path: &str, dump_name: Option<&str>) -> Result<u64, GatewayError> {
        self.cat_calls
            .lock()
            .unwrap()
            .push((path.to_string(), dump_name.map(str::to_string)));
        self.cat_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GatewayError::Transport("cat script empty".to_string())))
    }

    async fn verify_pin(
        &self,
        dir_cid: &str,
        _name_hint: Option<&str>,
    ) -> Result<PinnedObject, GatewayError> {
        self.listed.clone().map(|length| PinnedObject {
            reference: ObjectRef::new("QmFile", dir_cid),
            length,
        })
    }

    async fn unpin(&self, cid: &str) -> Result<String, GatewayError> {
        self.unpin_result.clone().map(|()| cid.to_string())
    }

    async fn public_size(&self, _cid: &str) -> Result<u64, GatewayError> {
        self.public.clone()
    }

    async fn peer_count(&self) -> Result<u64, GatewayError> {
        Ok(7)
    }

    async fn disk_usage(&self) -> Result<u64, GatewayError> {
        Ok(123_456)
    }

    async fn identity(&self) -> Result<String, GatewayError> {
        Ok("12DaemonId".to_string())
    }

    async fn version(&self) -> Result<DaemonVersion, GatewayError> {
        Ok(DaemonVersion {
            version: "0.29.0".to_string(),
            online: true,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DISPATCHER DOUBLE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct MockDispatcher {
    /// Payloads served in order; an empty queue reports no work.
    queue: Mutex<VecDeque<WorkPayload>>,
    reports: Mutex<Vec<(u64, Vec<WorkResult>)>>,
    fail_poll: bool,
}

impl MockDispatcher {
    fn serving(payloads: Vec<WorkPayload>) -> Self {
        MockDispatcher {
            queue: Mutex::new(payloads.into_iter().collect()),
            ..Default::default()
        }
    }

    fn reports(&self) -> Vec<(u64, Vec<WorkResult>)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkDispatcher for MockDispatcher {
    async fn get_work(&self, _status: &NodeStatus) -> Result<WorkPayload, DispatchError> {
        if self.fail_poll {
            return Err(DispatchError::Transport("connection refused".to_string()));
        }
        Ok(self.queue.lock().unwrap().pop_front().unwrap_or(WorkPayload {
            message: "No work for you".to_string(),
            ..WorkPayload::default()
        }))
    }

    async fn send_report(
        &self,
        _status: &NodeStatus,
        used_bytes: u64,
        results: &[WorkResult],
    ) -> Result<String, DispatchError> {
        self.reports
            .lock()
            .unwrap()
            .push((used_bytes, results.to_vec()));
        Ok("Ok".to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

fn config() -> Config {
    Config::for_identity("op@example.com")
}

fn download_payload(url: &str, filename: &str) -> WorkPayload {
    WorkPayload {
        show: "Test Show".to_string(),
        episode: "42".to_string(),
        download: url.to_string(),
        filename: filename.to_string(),
        ..WorkPayload::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// A. DOWNLOAD
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn download_with_agreeing_sizes_reports_upload_length() {
    let gateway = MockGateway::healthy(vec![Ok(1000)]);
    let dispatcher =
        MockDispatcher::serving(vec![download_payload("http://x/a.mp3", "a.mp3")]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    let outcome = scheduler.run_once().await;
    assert_eq!(outcome, IterationOutcome::Worked);
    assert_eq!(outcome.next_delay(&scheduler.config), scheduler.config.short_poll);

    let reports = scheduler.dispatcher.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, 123_456);
    assert_eq!(
        reports[0].1,
        vec![WorkResult::Downloaded {
            reference: "QmFile/QmDir".to_string(),
            length: "1000".to_string(),
        }]
    );

    // observation read only, no fallback
    assert_eq!(scheduler.gateway.cat_calls().len(), 1);
    assert_eq!(scheduler.last_download(), Some("http://x/a.mp3"));
}

#[tokio::test]
async fn first_time_size_disagreement_falls_back_to_bare_cid() {
    let gateway = MockGateway::healthy(vec![Ok(999), Ok(777)]);
    let dispatcher =
        MockDispatcher::serving(vec![download_payload("http://x/a.mp3", "a.mp3")]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    scheduler.run_once().await;

    let reports = scheduler.dispatcher.reports();
    assert_eq!(
        reports[0].1,
        vec![WorkResult::Downloaded {
            reference: "QmFile/QmDir".to_string(),
            length: "777".to_string(),
        }]
    );
    let calls = scheduler.gateway.cat_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], ("QmFile".to_string(), None));
}

#[tokio::test]
async fn repeat_download_fallback_targets_the_composite_reference() {
    // First iteration completes cleanly and records the URL; the second
    // iteration re-downloads the same URL and disagrees on size.
    let gateway = MockGateway::healthy(vec![Ok(1000), Ok(999), Ok(888)]);
    let dispatcher = MockDispatcher::serving(vec![
        download_payload("http://x/a.mp3", "a.mp3"),
        download_payload("http://x/a.mp3", "a.mp3"),
    ]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    scheduler.run_once().await;
    assert_eq!(scheduler.last_download(), Some("http://x/a.mp3"));
    scheduler.run_once().await;

    let calls = scheduler.gateway.cat_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(
        calls[2],
        ("QmFile/QmDir".to_string(), Some("a.mp3".to_string()))
    );

    let reports = scheduler.dispatcher.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(
        reports[1].1,
        vec![WorkResult::Downloaded {
            reference: "QmFile/QmDir".to_string(),
            length: "888".to_string(),
        }]
    );
}

#[tokio::test]
async fn upstream_http_failure_reports_the_download_code() {
    let mut gateway = MockGateway::healthy(vec![]);
    gateway.source = Err(GatewayError::Http {
        status: 404,
        message: "episode gone".to_string(),
    });
    let dispatcher =
        MockDispatcher::serving(vec![download_payload("http://x/missing.mp3", "missing.mp3")]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    let outcome = scheduler.run_once().await;
    assert_eq!(outcome, IterationOutcome::Worked);

    let reports = scheduler.dispatcher.reports();
    assert_eq!(
        reports[0].1,
        vec![WorkResult::Failed {
            code: ErrorCode::Download,
            message: Some("episode gone".to_string()),
        }]
    );
    // the failed URL still becomes the repeat tie-break marker
    assert_eq!(scheduler.last_download(), Some("http://x/missing.mp3"));
}

#[tokio::test]
async fn transport_failure_during_download_is_generic() {
    let mut gateway = MockGateway::healthy(vec![]);
    gateway.source = Err(GatewayError::Transport("dns failure".to_string()));
    let dispatcher = MockDispatcher::serving(vec![download_payload("http://x/a.mp3", "a.mp3")]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    scheduler.run_once().await;
    assert_eq!(
        scheduler.dispatcher.reports()[0].1,
        vec![WorkResult::Failed {
            code: ErrorCode::Generic,
            message: None,
        }]
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// B. PIN
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn pin_task_reports_listed_reference_and_length() {
    let gateway = MockGateway::healthy(vec![]);
    let dispatcher = MockDispatcher::serving(vec![WorkPayload {
        pin: "QmDir".to_string(),
        filename: "a.mp3".to_string(),
        ..WorkPayload::default()
    }]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    let outcome = scheduler.run_once().await;
    assert_eq!(outcome, IterationOutcome::Worked);
    assert_eq!(
        scheduler.dispatcher.reports()[0].1,
        vec![WorkResult::Pinned {
            reference: "QmFile/QmDir".to_string(),
            length: "1000".to_string(),
        }]
    );
}

#[tokio::test]
async fn exhausted_pin_confirmation_reports_the_pin_code() {
    let mut gateway = MockGateway::healthy(vec![]);
    gateway.pin_result = Err(GatewayError::UnexpectedPinResult(0));
    let dispatcher = MockDispatcher::serving(vec![WorkPayload {
        pin: "QmDir".to_string(),
        ..WorkPayload::default()
    }]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    scheduler.run_once().await;
    assert_eq!(
        scheduler.dispatcher.reports()[0].1,
        vec![WorkResult::Failed {
            code: ErrorCode::Pin,
            message: None,
        }]
    );
}

#[tokio::test]
async fn pin_verification_failure_is_distinguished_from_pin_failure() {
    let mut gateway = MockGateway::healthy(vec![]);
    gateway.listed = Err(GatewayError::NameNotFound("a.mp3".to_string()));
    let dispatcher = MockDispatcher::serving(vec![WorkPayload {
        pin: "QmDir".to_string(),
        filename: "a.mp3".to_string(),
        ..WorkPayload::default()
    }]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    scheduler.run_once().await;
    assert_eq!(
        scheduler.dispatcher.reports()[0].1,
        vec![WorkResult::Failed {
            code: ErrorCode::Generic,
            message: None,
        }]
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// C. DELETE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn delete_task_reports_the_removed_cid() {
    let gateway = MockGateway::healthy(vec![]);
    let dispatcher = MockDispatcher::serving(vec![WorkPayload {
        delete: "QmGone".to_string(),
        ..WorkPayload::default()
    }]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    scheduler.run_once().await;
    assert_eq!(
        scheduler.dispatcher.reports()[0].1,
        vec![WorkResult::Deleted {
            cid: "QmGone".to_string(),
        }]
    );
}

#[tokio::test]
async fn delete_failure_is_reported_by_default() {
    let mut gateway = MockGateway::healthy(vec![]);
    gateway.unpin_result = Err(GatewayError::Transport("daemon busy".to_string()));
    let dispatcher = MockDispatcher::serving(vec![WorkPayload {
        delete: "QmGone".to_string(),
        ..WorkPayload::default()
    }]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    scheduler.run_once().await;
    assert_eq!(
        scheduler.dispatcher.reports()[0].1,
        vec![WorkResult::Failed {
            code: ErrorCode::Generic,
            message: None,
        }]
    );
}

#[tokio::test]
async fn delete_failure_stays_silent_when_configured_best_effort() {
    let mut gateway = MockGateway::healthy(vec![]);
    gateway.unpin_result = Err(GatewayError::Transport("daemon busy".to_string()));
    let dispatcher = MockDispatcher::serving(vec![WorkPayload {
        delete: "QmGone".to_string(),
        ..WorkPayload::default()
    }]);
    let mut cfg = config();
    cfg.report_delete_failures = false;
    let mut scheduler = Scheduler::new(gateway, dispatcher, cfg);

    let outcome = scheduler.run_once().await;
    // the branch ran, so the iteration still counts as worked,
    // but nothing was produced and no report goes out
    assert_eq!(outcome, IterationOutcome::Worked);
    assert!(scheduler.dispatcher.reports().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// D. BATCHING
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn pin_and_delete_in_one_payload_batch_into_one_report() {
    let gateway = MockGateway::healthy(vec![]);
    let dispatcher = MockDispatcher::serving(vec![WorkPayload {
        pin: "QmDir".to_string(),
        delete: "QmGone".to_string(),
        ..WorkPayload::default()
    }]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    scheduler.run_once().await;

    let reports = scheduler.dispatcher.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].1,
        vec![
            WorkResult::Pinned {
                reference: "QmFile/QmDir".to_string(),
                length: "1000".to_string(),
            },
            WorkResult::Deleted {
                cid: "QmGone".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn one_failing_branch_does_not_stop_the_others() {
    let mut gateway = MockGateway::healthy(vec![]);
    gateway.pin_result = Err(GatewayError::UnexpectedPinResult(2));
    let dispatcher = MockDispatcher::serving(vec![WorkPayload {
        pin: "QmDir".to_string(),
        delete: "QmGone".to_string(),
        ..WorkPayload::default()
    }]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    scheduler.run_once().await;
    assert_eq!(
        scheduler.dispatcher.reports()[0].1,
        vec![
            WorkResult::Failed {
                code: ErrorCode::Pin,
                message: None,
            },
            WorkResult::Deleted {
                cid: "QmGone".to_string(),
            },
        ]
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// E. SCHEDULING
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn no_work_message_idles_without_a_report() {
    let gateway = MockGateway::healthy(vec![]);
    let dispatcher = MockDispatcher::serving(vec![WorkPayload {
        message: "No work available".to_string(),
        ..WorkPayload::default()
    }]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    let outcome = scheduler.run_once().await;
    assert_eq!(outcome, IterationOutcome::Idle);
    assert_eq!(outcome.next_delay(&scheduler.config), scheduler.config.long_poll);
    assert!(scheduler.dispatcher.reports().is_empty());
}

#[tokio::test]
async fn unrecognized_payload_is_dropped_without_a_report() {
    let gateway = MockGateway::healthy(vec![]);
    let dispatcher = MockDispatcher::serving(vec![WorkPayload {
        show: "Mystery Show".to_string(),
        ..WorkPayload::default()
    }]);
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    let outcome = scheduler.run_once().await;
    assert_eq!(outcome, IterationOutcome::Dropped);
    assert!(scheduler.dispatcher.reports().is_empty());
}

#[tokio::test]
async fn failed_poll_reschedules_after_the_short_interval() {
    let gateway = MockGateway::healthy(vec![]);
    let dispatcher = MockDispatcher {
        fail_poll: true,
        ..Default::default()
    };
    let mut scheduler = Scheduler::new(gateway, dispatcher, config());

    let outcome = scheduler.run_once().await;
    assert_eq!(outcome, IterationOutcome::PollFailed);
    assert_eq!(outcome.next_delay(&scheduler.config), scheduler.config.short_poll);
}
