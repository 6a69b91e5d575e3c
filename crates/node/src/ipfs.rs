//! # Storage Daemon Client
//!
//! reqwest-backed [`StorageGateway`] implementation speaking the local
//! daemon's RPC surface, the public mirrors, and upstream content sources.
//!
//! Two HTTP clients are held: a long-timeout one for transfers (add, cat,
//! mirror and source reads can move hundreds of megabytes) and a
//! short-timeout one for status queries. Response-shape rules are plain
//! functions so they unit-test without a daemon.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use pincast_common::retry::{retry_immediate, AttemptError, RetryPolicy};
use pincast_common::Config;

use crate::gateway::{
    AddOutcome, DaemonVersion, GatewayError, ObjectRef, PinnedObject, StorageGateway,
};
use crate::USER_AGENT;

// ════════════════════════════════════════════════════════════════════════════
// RETRY CEILINGS
// ════════════════════════════════════════════════════════════════════════════

/// Attempt ceiling on daemon and source-transfer operations.
pub const DAEMON_ATTEMPTS: u32 = 5;

/// Attempt ceiling on public-mirror reads.
pub const MIRROR_ATTEMPTS: u32 = 8;

// ════════════════════════════════════════════════════════════════════════════
// WIRE SHAPES
// ════════════════════════════════════════════════════════════════════════════

/// One record of the daemon's newline-delimited add response. The records
/// also carry `Name` and `Size`; only the hash feeds the reference.
#[derive(Debug, Clone, Deserialize)]
struct AddRecord {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(rename = "Objects", default)]
    objects: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Links", default)]
    links: Vec<ListedLink>,
}

#[derive(Debug, Deserialize)]
struct ListedLink {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size")]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct PinAddResponse {
    #[serde(rename = "Pins", default)]
    pins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SwarmPeers {
    #[serde(rename = "Peers", default)]
    peers: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RepoStat {
    #[serde(rename = "RepoSize")]
    repo_size: u64,
}

#[derive(Debug, Deserialize)]
struct DaemonId {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct DiagSys {
    ipfs_version: String,
    net: DiagNet,
}

#[derive(Debug, Deserialize)]
struct DiagNet {
    online: bool,
}

// ════════════════════════════════════════════════════════════════════════════
// SHAPE RULES
// ════════════════════════════════════════════════════════════════════════════

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => GatewayError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => GatewayError::Transport(e.to_string()),
        }
    }
}

/// Decode the add response: newline-delimited JSON, first record the file,
/// second the wrapping directory.
fn parse_add_records(body: &str) -> Result<ObjectRef, GatewayError> {
    let mut records = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: AddRecord = serde_json::from_str(line).map_err(|e| {
            GatewayError::UnexpectedResponseShape(format!("bad add record: {e}"))
        })?;
        records.push(record);
    }
    if records.len() < 2 {
        return Err(GatewayError::UnexpectedResponseShape(format!(
            "expected file and directory add records, got {}",
            records.len()
        )));
    }
    let file = &records[0];
    let directory = &records[1];
    Ok(ObjectRef::new(&file.hash, &directory.hash))
}

/// Locate the nested file inside a directory listing.
///
/// One object with one link wins unconditionally. One object with several
/// links falls back to an exact name match against the hint. Anything else
/// is an unexpected listing.
fn select_pinned(listing: &Listing, name_hint: Option<&str>) -> Result<PinnedObject, GatewayError> {
    if listing.objects.len() == 1 {
        let object = &listing.objects[0];
        if object.links.len() == 1 {
            let link = &object.links[0];
            return Ok(PinnedObject {
                reference: ObjectRef::new(&link.hash, &object.hash),
                length: link.size,
            });
        }
        if let Some(name) = name_hint {
            return match object.links.iter().find(|l| l.name == name) {
                Some(link) => Ok(PinnedObject {
                    reference: ObjectRef::new(&link.hash, &object.hash),
                    length: link.size,
                }),
                None => Err(GatewayError::NameNotFound(name.to_string())),
            };
        }
    }
    Err(GatewayError::UnexpectedObjectCount(listing.objects.len()))
}

// ════════════════════════════════════════════════════════════════════════════
// CLIENT
// ════════════════════════════════════════════════════════════════════════════

/// Concrete gateway over the local daemon and the public mirrors.
pub struct IpfsApi {
    api_base: String,
    mirror_a: String,
    mirror_b: String,
    /// Short-timeout client for status queries.
    status: Client,
    /// Long-timeout client for transfers.
    transfer: Client,
    debug_dump_dir: Option<PathBuf>,
}

impl IpfsApi {
    pub fn new(config: &Config) -> Self {
        let status = Client::builder()
            .timeout(config.status_timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("reqwest client");
        let transfer = Client::builder()
            .timeout(config.transfer_timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("reqwest client");
        IpfsApi {
            api_base: config.ipfs_api_url.clone(),
            mirror_a: config.mirror_a.clone(),
            mirror_b: config.mirror_b.clone(),
            status,
            transfer,
            debug_dump_dir: config.debug_dump_dir.clone(),
        }
    }

    /// Mirror base for a 1-based attempt index: A on even, B on odd.
    fn mirror_base(&self, attempt: u32) -> &str {
        if attempt % 2 == 0 {
            &self.mirror_a
        } else {
            &self.mirror_b
        }
    }

    async fn status_query<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.api_base, path);
        let resp = self.status.post(&url).send().await?.error_for_status()?;
        Ok(resp.json::<T>().await?)
    }

    async fn dump_bytes(&self, name: &str, bytes: &[u8]) {
        let Some(dir) = &self.debug_dump_dir else {
            return;
        };
        let path = dir.join(name);
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => debug!(path = %path.display(), "wrote debug dump"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write debug dump"),
        }
    }
}

#[async_trait]
impl StorageGateway for IpfsApi {
    async fn fetch_source(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        debug!(url, "downloading source content");
        retry_immediate(RetryPolicy::attempts(DAEMON_ATTEMPTS), |attempt| async move {
            trace!(attempt, url, "starting source download");
            let run = async {
                let resp = self.transfer.get(url).send().await?.error_for_status()?;
                let bytes = resp.bytes().await?;
                Ok::<_, GatewayError>(bytes.to_vec())
            };
            run.await.map_err(AttemptError::Transient)
        })
        .await
    }

    async fn add_bytes(&self, bytes: Vec<u8>, filename: &str) -> Result<AddOutcome, GatewayError> {
        let size = bytes.len() as u64;
        debug!(filename, size, "adding content to daemon");

        let url = format!(
            "{}/add?wrap-with-directory=true&progress=false&pin=true",
            self.api_base
        );
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        let body = self
            .transfer
            .post(&url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let reference = parse_add_records(&body)?;
        info!(%reference, size, "added content to daemon");
        Ok(AddOutcome { reference, size })
    }

    async fn pin(&self, cid: &str) -> Result<(), GatewayError> {
        debug!(cid, "pinning object");
        let url = format!("{}/pin/add?arg={}", self.api_base, cid);
        retry_immediate(RetryPolicy::attempts(DAEMON_ATTEMPTS), |attempt| {
            let url = url.clone();
            async move {
                trace!(attempt, cid, "requesting pin");
                let run = async {
                    let resp = self
                        .status
                        .post(&url)
                        .send()
                        .await?
                        .error_for_status()?
                        .json::<PinAddResponse>()
                        .await?;
                    let count = resp.pins.as_ref().map_or(0, Vec::len);
                    if count != 1 {
                        return Err(GatewayError::UnexpectedPinResult(count));
                    }
                    Ok(())
                };
                run.await.map_err(AttemptError::Transient)
            }
        })
        .await?;
        debug!(cid, "pin complete");
        Ok(())
    }

    async fn cat_size(&self, path: &str, dump_name: Option<&str>) -> Result<u64, GatewayError> {
        debug!(path, "reading object back for size check");
        let url = format!("{}/cat?arg={}", self.api_base, path);
        let bytes = retry_immediate(RetryPolicy::attempts(DAEMON_ATTEMPTS), |attempt| {
            let url = url.clone();
            async move {
                trace!(attempt, path, "cat request");
                let run = async {
                    let resp = self.transfer.post(&url).send().await?.error_for_status()?;
                    Ok::<_, GatewayError>(resp.bytes().await?)
                };
                run.await.map_err(AttemptError::Transient)
            }
        })
        .await?;

        if let Some(name) = dump_name {
            self.dump_bytes(name, &bytes).await;
        }
        debug!(path, size = bytes.len(), "cat size obtained");
        Ok(bytes.len() as u64)
    }

    async fn verify_pin(
        &self,
        dir_cid: &str,
        name_hint: Option<&str>,
    ) -> Result<PinnedObject, GatewayError> {
        debug!(dir_cid, ?name_hint, "listing pinned directory");
        let url = format!("{}/ls?arg={}", self.api_base, dir_cid);
        let listing = retry_immediate(RetryPolicy::attempts(DAEMON_ATTEMPTS), |attempt| {
            let url = url.clone();
            async move {
                trace!(attempt, dir_cid, "ls request");
                let run = async {
                    let resp = self
                        .status
                        .post(&url)
                        .send()
                        .await?
                        .error_for_status()?
                        .json::<Listing>()
                        .await?;
                    Ok::<_, GatewayError>(resp)
                };
                run.await.map_err(AttemptError::Transient)
            }
        })
        .await?;

        select_pinned(&listing, name_hint)
    }

    async fn unpin(&self, cid: &str) -> Result<String, GatewayError> {
        debug!(cid, "removing pin");
        let url = format!("{}/pin/rm?arg={}", self.api_base, cid);
        let body = self
            .status
            .post(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;
        trace!(cid, %body, "pin removed");
        Ok(cid.to_string())
    }

    async fn public_size(&self, cid: &str) -> Result<u64, GatewayError> {
        debug!(cid, "reading object from public mirror");
        retry_immediate(RetryPolicy::attempts(MIRROR_ATTEMPTS), |attempt| {
            let url = format!("{}/{}", self.mirror_base(attempt), cid);
            async move {
                trace!(attempt, %url, "public mirror request");
                let run = async {
                    let resp = self.transfer.get(&url).send().await?.error_for_status()?;
                    let bytes = resp.bytes().await?;
                    Ok::<_, GatewayError>(bytes.len() as u64)
                };
                run.await.map_err(AttemptError::Transient)
            }
        })
        .await
    }

    async fn peer_count(&self) -> Result<u64, GatewayError> {
        let resp: SwarmPeers = self.status_query("/swarm/peers").await?;
        let count = resp.peers.as_ref().map_or(0, Vec::len) as u64;
        trace!(peers = count, "peer count");
        Ok(count)
    }

    async fn disk_usage(&self) -> Result<u64, GatewayError> {
        let resp: RepoStat = self.status_query("/repo/stat?size-only=true").await?;
        trace!(repo_size = resp.repo_size, "repository size");
        Ok(resp.repo_size)
    }

    async fn identity(&self) -> Result<String, GatewayError> {
        let resp: DaemonId = self.status_query("/id").await?;
        Ok(resp.id)
    }

    async fn version(&self) -> Result<DaemonVersion, GatewayError> {
        let resp: DiagSys = self.status_query("/diag/sys").await?;
        Ok(DaemonVersion {
            version: resp.ipfs_version,
            online: resp.net.online,
        })
    }
}
