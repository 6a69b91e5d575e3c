//! Worker configuration loaded from environment variables.
//!
//! The worker refuses to start without `PINCAST_EMAIL`: the dispatcher
//! keys every request on that identity. Everything else has a default
//! matching a stock local daemon setup.
//!
//! ## Environment Variables
//!
//! Required:
//! - `PINCAST_EMAIL`: identity reported to the dispatcher
//!
//! Optional:
//! - `PINCAST_DISPATCHER_URL`: dispatcher base URL
//! - `PINCAST_IPFS_API`: local storage daemon RPC base URL
//! - `PINCAST_MIRROR_A` / `PINCAST_MIRROR_B`: public gateway bases used
//!   for independent verification (A on even attempts, B on odd)
//! - `PINCAST_DEBUG_DIR`: directory for diagnostic content dumps
//! - `PINCAST_REPORT_DELETE_FAILURES`: report failed unpins upstream
//!   (default `true`; `false` reduces delete to best-effort)
//! - `PINCAST_SHORT_POLL_SECS` / `PINCAST_LONG_POLL_SECS`: poll intervals
//! - `PINCAST_TRANSFER_TIMEOUT_SECS`: timeout on large transfer calls

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Dispatcher base used when `PINCAST_DISPATCHER_URL` is unset.
pub const DEFAULT_DISPATCHER_URL: &str = "https://ipfspodcasting.net";

/// Local daemon RPC base used when `PINCAST_IPFS_API` is unset.
pub const DEFAULT_IPFS_API_URL: &str = "http://127.0.0.1:5001/api/v0";

/// Public gateway base for even-numbered verification attempts.
pub const DEFAULT_MIRROR_A: &str = "https://cf-ipfs.com/ipfs";

/// Public gateway base for odd-numbered verification attempts.
pub const DEFAULT_MIRROR_B: &str = "https://ipfs.io/ipfs";

/// Poll interval after an iteration that produced work results.
pub const DEFAULT_SHORT_POLL: Duration = Duration::from_secs(30);

/// Poll interval after an idle (no-work) iteration.
pub const DEFAULT_LONG_POLL: Duration = Duration::from_secs(5 * 60);

/// Timeout on add / cat / public-mirror / source-download transfers.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(7 * 60);

/// Timeout on small status queries (id, version, peers, repo stat).
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity reported to the dispatcher on every request.
    pub email: String,
    /// Dispatcher base URL (no trailing slash).
    pub dispatcher_url: String,
    /// Local storage daemon RPC base URL (no trailing slash).
    pub ipfs_api_url: String,
    /// Public gateway base for even attempts.
    pub mirror_a: String,
    /// Public gateway base for odd attempts.
    pub mirror_b: String,
    /// When set, `cat` persists the bytes it read under this directory.
    pub debug_dump_dir: Option<PathBuf>,
    /// Whether a failed unpin produces a `Failed` result in the report.
    pub report_delete_failures: bool,
    /// Poll interval after a productive iteration.
    pub short_poll: Duration,
    /// Poll interval after an idle iteration.
    pub long_poll: Duration,
    /// Timeout applied to large transfer operations.
    pub transfer_timeout: Duration,
    /// Timeout applied to status queries.
    pub status_timeout: Duration,
}

impl Config {
    /// Configuration with stock defaults for the given identity.
    pub fn for_identity(email: impl Into<String>) -> Self {
        Config {
            email: email.into(),
            dispatcher_url: DEFAULT_DISPATCHER_URL.to_string(),
            ipfs_api_url: DEFAULT_IPFS_API_URL.to_string(),
            mirror_a: DEFAULT_MIRROR_A.to_string(),
            mirror_b: DEFAULT_MIRROR_B.to_string(),
            debug_dump_dir: None,
            report_delete_failures: true,
            short_poll: DEFAULT_SHORT_POLL,
            long_poll: DEFAULT_LONG_POLL,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
        }
    }

    /// Load configuration from the environment.
    ///
    /// Fails when `PINCAST_EMAIL` is unset or when a set override fails to
    /// parse; unset optional variables fall back to defaults.
    pub fn from_env() -> Result<Self, String> {
        let email = env::var("PINCAST_EMAIL")
            .map_err(|_| "PINCAST_EMAIL environment variable not set".to_string())?;

        let mut cfg = Config::for_identity(email);

        if let Ok(url) = env::var("PINCAST_DISPATCHER_URL") {
            cfg.dispatcher_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = env::var("PINCAST_IPFS_API") {
            cfg.ipfs_api_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = env::var("PINCAST_MIRROR_A") {
            cfg.mirror_a = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = env::var("PINCAST_MIRROR_B") {
            cfg.mirror_b = url.trim_end_matches('/').to_string();
        }
        if let Ok(dir) = env::var("PINCAST_DEBUG_DIR") {
            if !dir.trim().is_empty() {
                cfg.debug_dump_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(v) = env::var("PINCAST_REPORT_DELETE_FAILURES") {
            cfg.report_delete_failures = !matches!(v.to_lowercase().as_str(), "false" | "0");
        }
        if let Some(secs) = parse_secs("PINCAST_SHORT_POLL_SECS")? {
            cfg.short_poll = secs;
        }
        if let Some(secs) = parse_secs("PINCAST_LONG_POLL_SECS")? {
            cfg.long_poll = secs;
        }
        if let Some(secs) = parse_secs("PINCAST_TRANSFER_TIMEOUT_SECS")? {
            cfg.transfer_timeout = secs;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the worker cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() {
            return Err("identity email must not be empty".to_string());
        }
        if self.dispatcher_url.is_empty() {
            return Err("dispatcher URL must not be empty".to_string());
        }
        if self.ipfs_api_url.is_empty() {
            return Err("storage daemon URL must not be empty".to_string());
        }
        if self.short_poll.is_zero() || self.long_poll.is_zero() {
            return Err("poll intervals must be non-zero".to_string());
        }
        Ok(())
    }
}

fn parse_secs(var: &str) -> Result<Option<Duration>, String> {
    match env::var(var) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .map_err(|_| format!("{var} must be a whole number of seconds"))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}
