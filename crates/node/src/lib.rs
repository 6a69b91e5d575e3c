//! # Pincast Node Crate
//!
//! Worker node bridging the podcast-pinning dispatcher with a local
//! content-addressed storage daemon. The node polls for a task (download
//! and pin a file, pin an existing object, or unpin one), executes it
//! against the daemon, re-verifies the stored size through three
//! independent read paths, and reports a reconciled outcome back.
//!
//! ## Modules
//! - `task`: wire payload, classification, result model
//! - `gateway`: storage-gateway trait seam and shared value types
//! - `ipfs`: reqwest-backed daemon / mirror client
//! - `dispatcher`: work dispatcher client
//! - `verify`: three-way size verification engine
//! - `scheduler`: the polling work loop
//!
//! ## Data Flow
//!
//! ```text
//! scheduler ──▶ dispatcher.get_work ──▶ classify
//!     │                                     │
//!     │            ┌── download ── fetch_source ▸ add ▸ verify ──┐
//!     ├── execute ─┼── pin ─────── pin ▸ verify_pin ─────────────┤
//!     │            └── delete ──── unpin ────────────────────────┘
//!     │                                     │
//!     └──────── dispatcher.send_report ◀── batch
//! ```

pub mod dispatcher;
pub mod gateway;
pub mod ipfs;
pub mod scheduler;
pub mod task;
pub mod verify;

/// User agent sent on every outbound HTTP request.
pub const USER_AGENT: &str = concat!("pincast/", env!("CARGO_PKG_VERSION"));

pub use dispatcher::{DispatchError, HttpDispatcher, NodeStatus, WorkDispatcher};
pub use gateway::{AddOutcome, DaemonVersion, GatewayError, ObjectRef, PinnedObject, StorageGateway};
pub use ipfs::IpfsApi;
pub use scheduler::{IterationOutcome, Scheduler};
pub use task::{classify, ErrorCode, Instruction, Task, WorkPayload, WorkResult};
pub use verify::{confirm_size, observe_sizes, SizeObservations};
