//! # Storage Gateway Seam
//!
//! Trait boundary over the local storage daemon and the public read-only
//! mirrors, plus the value types shared by every component that touches
//! stored objects.
//!
//! The concrete implementation lives in [`crate::ipfs`]; tests substitute
//! their own implementations to drive the verification engine and the
//! scheduler without a daemon.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

// ════════════════════════════════════════════════════════════════════════════
// OBJECT REFERENCE
// ════════════════════════════════════════════════════════════════════════════

/// Composite reference to a stored file and its wrapping directory.
///
/// The daemon wraps every added file in a synthetic single-entry directory;
/// the two CIDs travel together on the wire as `fileCid/directoryCid`.
/// The halves serve different RPCs, so a wire-form reference must be split
/// back into its parts before either is used against the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    /// CID of the file itself.
    pub file_cid: String,
    /// CID of the synthetic wrapping directory.
    pub dir_cid: String,
}

impl ObjectRef {
    pub fn new(file_cid: impl Into<String>, dir_cid: impl Into<String>) -> Self {
        ObjectRef {
            file_cid: file_cid.into(),
            dir_cid: dir_cid.into(),
        }
    }

    /// Parse the wire form `fileCid/directoryCid`.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        match raw.split_once('/') {
            Some((file, dir)) if !file.is_empty() && !dir.is_empty() => {
                Ok(ObjectRef::new(file, dir))
            }
            _ => Err(GatewayError::MalformedReference(raw.to_string())),
        }
    }

    /// Render the wire form `fileCid/directoryCid`.
    pub fn join(&self) -> String {
        format!("{}/{}", self.file_cid, self.dir_cid)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.file_cid, self.dir_cid)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// OPERATION RESULTS
// ════════════════════════════════════════════════════════════════════════════

/// Outcome of adding content to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// Reference to the stored file and its wrapping directory.
    pub reference: ObjectRef,
    /// Byte length of the content as uploaded.
    pub size: u64,
}

/// A pinned file located through a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedObject {
    /// Reference to the nested file and the listed directory.
    pub reference: ObjectRef,
    /// Size the listing reports for the nested file.
    pub length: u64,
}

/// Daemon version information used for outbound metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonVersion {
    pub version: String,
    pub online: bool,
}

// ════════════════════════════════════════════════════════════════════════════
// ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Failures surfaced by gateway operations.
///
/// `Http` is kept distinct from `Transport` because download tasks report
/// upstream HTTP failures under a dedicated error code; the remaining
/// variants are shape and lookup failures that no retry can fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Network-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Transport(String),

    /// The upstream answered with a non-success HTTP status.
    #[error("upstream returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The daemon returned a structurally different payload than expected.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponseShape(String),

    /// `pin/add` confirmed a pin count other than one.
    #[error("pin add confirmed {0} pins, expected exactly 1")]
    UnexpectedPinResult(usize),

    /// A listing held no link with the hinted name.
    #[error("no entry named {0:?} in directory listing")]
    NameNotFound(String),

    /// A listing held an unexpected number of top-level objects.
    #[error("unexpected object count in listing: {0}")]
    UnexpectedObjectCount(usize),

    /// A composite reference was not of the form `fileCid/directoryCid`.
    #[error("malformed composite reference: {0:?}")]
    MalformedReference(String),
}

// ════════════════════════════════════════════════════════════════════════════
// GATEWAY TRAIT
// ════════════════════════════════════════════════════════════════════════════

/// Operations against the local storage daemon, the public mirrors, and
/// the upstream content sources.
///
/// ## Contract
///
/// - Implementations own their retry behavior; callers never retry.
/// - `public_size` exhausting its mirrors is an error here; the caller
///   decides whether that is fatal (the verification engine treats it as
///   a missing observation).
/// - Status queries (`peer_count`, `disk_usage`, `identity`, `version`)
///   are single-shot.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Fetch raw content from an upstream source URL.
    async fn fetch_source(&self, url: &str) -> Result<Vec<u8>, GatewayError>;

    /// Add content to the daemon, wrapped in a directory and pinned.
    async fn add_bytes(&self, bytes: Vec<u8>, filename: &str) -> Result<AddOutcome, GatewayError>;

    /// Pin an existing CID; succeeds only when exactly one pin is confirmed.
    async fn pin(&self, cid: &str) -> Result<(), GatewayError>;

    /// Read an object fully and return its byte length.
    ///
    /// `path` may be a bare CID or a composite `fileCid/directoryCid`
    /// reference. When `dump_name` is given and a debug directory is
    /// configured, the bytes are also written to disk for inspection.
    async fn cat_size(&self, path: &str, dump_name: Option<&str>) -> Result<u64, GatewayError>;

    /// List a directory object and locate the single nested file.
    async fn verify_pin(
        &self,
        dir_cid: &str,
        name_hint: Option<&str>,
    ) -> Result<PinnedObject, GatewayError>;

    /// Remove a pin; best-effort, returns the CID for chaining.
    async fn unpin(&self, cid: &str) -> Result<String, GatewayError>;

    /// Read an object from the public mirrors and return its byte length.
    async fn public_size(&self, cid: &str) -> Result<u64, GatewayError>;

    /// Number of peers the daemon is connected to.
    async fn peer_count(&self) -> Result<u64, GatewayError>;

    /// Bytes used by the daemon's repository.
    async fn disk_usage(&self) -> Result<u64, GatewayError>;

    /// The daemon's node identifier.
    async fn identity(&self) -> Result<String, GatewayError>;

    /// The daemon's version and online flag.
    async fn version(&self) -> Result<DaemonVersion, GatewayError>;
}
