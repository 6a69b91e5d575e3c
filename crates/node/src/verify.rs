//! # Verification Engine
//!
//! After a download-and-pin completes, the stored object's size is
//! re-derived through three independent read paths (directory listing,
//! direct read-back, public mirror) and compared against the size
//! recorded at upload time. The three observations are gathered
//! concurrently; a public mirror that cannot be reached is a missing
//! observation, not a mismatch, because mirror reachability is outside
//! this system's control and must not fail an otherwise-correct store.
//!
//! When the observations disagree (or cannot be gathered), the
//! authoritative length is re-derived with one fresh read-back.

use tracing::{debug, warn};

use crate::gateway::{GatewayError, ObjectRef, StorageGateway};

/// Sizes observed for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeObservations {
    /// Size reported by the directory listing.
    pub listed: u64,
    /// Size of the bytes read back from the daemon.
    pub read_back: u64,
    /// Size of the bytes read from a public mirror, when reachable.
    pub public: Option<u64>,
}

impl SizeObservations {
    /// Every obtained observation equals the upload-time size.
    pub fn all_match(&self, original: u64) -> bool {
        self.listed == original
            && self.read_back == original
            && self.public.map_or(true, |p| p == original)
    }
}

/// Gather the three size observations concurrently.
pub async fn observe_sizes<G: StorageGateway + ?Sized>(
    gateway: &G,
    reference: &ObjectRef,
    filename: &str,
) -> Result<SizeObservations, GatewayError> {
    debug!(%reference, filename, "gathering size observations");
    let (listed, read_back, public) = tokio::join!(
        gateway.verify_pin(&reference.dir_cid, Some(filename)),
        gateway.cat_size(&reference.file_cid, None),
        gateway.public_size(&reference.file_cid),
    );

    let public = match public {
        Ok(size) => Some(size),
        Err(e) => {
            warn!(error = %e, "public mirror read failed, excluding observation");
            None
        }
    };

    Ok(SizeObservations {
        listed: listed?.length,
        read_back: read_back?,
        public,
    })
}

/// Confirm the stored size of a freshly downloaded object.
///
/// Returns the length to report: the upload-time size when every obtained
/// observation agrees with it, otherwise the result of a fresh read-back.
/// `repeat_download` marks that this object's source URL was also the most
/// recently processed download; a repeat can observe a stale size through
/// the bare file CID immediately after re-adding, so the fallback read
/// targets the composite reference in that case and the bare CID otherwise.
pub async fn confirm_size<G: StorageGateway + ?Sized>(
    gateway: &G,
    reference: &ObjectRef,
    filename: &str,
    original_size: u64,
    repeat_download: bool,
) -> Result<u64, GatewayError> {
    match observe_sizes(gateway, reference, filename).await {
        Ok(obs) if obs.all_match(original_size) => {
            debug!(original_size, "all size observations agree");
            Ok(original_size)
        }
        Ok(obs) => {
            debug!(?obs, original_size, "size observations disagree, re-deriving");
            fallback_size(gateway, reference, filename, repeat_download).await
        }
        Err(e) => {
            warn!(error = %e, "size comparison failed, re-deriving");
            fallback_size(gateway, reference, filename, repeat_download).await
        }
    }
}

async fn fallback_size<G: StorageGateway + ?Sized>(
    gateway: &G,
    reference: &ObjectRef,
    filename: &str,
    repeat_download: bool,
) -> Result<u64, GatewayError> {
    if repeat_download {
        gateway.cat_size(&reference.join(), Some(filename)).await
    } else {
        gateway.cat_size(&reference.file_cid, None).await
    }
}
