//! # Task Model
//!
//! The dispatcher's task payload carries no discriminant: the kind of work
//! is implied by which fields are present. Everything downstream of the
//! wire decode goes through [`classify`] exactly once, producing a tagged
//! [`Task`] so the scheduler can match exhaustively instead of re-testing
//! field presence in every branch.

use serde::Deserialize;

// ════════════════════════════════════════════════════════════════════════════
// WIRE PAYLOAD
// ════════════════════════════════════════════════════════════════════════════

/// Raw task payload as decoded from the dispatcher.
///
/// Absent fields decode as empty strings; emptiness is the "not this kind
/// of task" signal. `show` and `episode` carry no decision logic and are
/// used only as log context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkPayload {
    pub show: String,
    pub episode: String,
    pub download: String,
    pub pin: String,
    pub filename: String,
    pub delete: String,
    pub message: String,
}

// ════════════════════════════════════════════════════════════════════════════
// CLASSIFIED TASK
// ════════════════════════════════════════════════════════════════════════════

/// A single unit of work carried by a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Fetch content from `url`, add it to the daemon, verify the result.
    Download { url: String, filename: String },
    /// Pin an existing directory CID, then verify it via listing.
    Pin {
        cid: String,
        /// Filename hint for multi-link listings.
        name_hint: Option<String>,
    },
    /// Remove the pin on a CID.
    Delete { cid: String },
}

/// A dispatcher payload after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// One or more instructions, in execution order.
    Assigned(Vec<Instruction>),
    /// Dispatcher reported nothing to do.
    NoWork { message: String },
    /// Payload matched no known shape; logged and dropped.
    Unrecognized(WorkPayload),
}

/// Classify a decoded payload into an explicit task.
///
/// Instructions are collected in fixed priority order (download, pin,
/// delete) and one payload may yield several. A payload yielding none is
/// idle when its message says so, unrecognized otherwise.
pub fn classify(payload: WorkPayload) -> Task {
    let mut instructions = Vec::new();

    if !payload.download.is_empty() && !payload.filename.is_empty() {
        instructions.push(Instruction::Download {
            url: payload.download.clone(),
            filename: payload.filename.clone(),
        });
    }
    if !payload.pin.is_empty() {
        instructions.push(Instruction::Pin {
            cid: payload.pin.clone(),
            name_hint: if payload.filename.is_empty() {
                None
            } else {
                Some(payload.filename.clone())
            },
        });
    }
    if !payload.delete.is_empty() {
        instructions.push(Instruction::Delete {
            cid: payload.delete.clone(),
        });
    }

    if !instructions.is_empty() {
        return Task::Assigned(instructions);
    }
    if payload.message.to_lowercase().contains("no work") {
        return Task::NoWork {
            message: payload.message,
        };
    }
    Task::Unrecognized(payload)
}

// ════════════════════════════════════════════════════════════════════════════
// RESULTS
// ════════════════════════════════════════════════════════════════════════════

/// Coarse error code reported to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Download task failed on an upstream HTTP error.
    Download,
    /// Pin operation failed.
    Pin,
    /// Anything else.
    Generic,
}

impl ErrorCode {
    /// Wire value understood by the dispatcher.
    pub fn as_wire(&self) -> &'static str {
        match self {
            ErrorCode::Download => "99",
            ErrorCode::Pin => "98",
            ErrorCode::Generic => "1",
        }
    }
}

/// Outcome of processing one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkResult {
    Downloaded { reference: String, length: String },
    Pinned { reference: String, length: String },
    Deleted { cid: String },
    Failed {
        code: ErrorCode,
        message: Option<String>,
    },
}

impl WorkResult {
    /// Form fields this result contributes to the outbound report.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            WorkResult::Downloaded { reference, length } => vec![
                ("downloaded", reference.clone()),
                ("length", length.clone()),
            ],
            WorkResult::Pinned { reference, length } => {
                vec![("pinned", reference.clone()), ("length", length.clone())]
            }
            WorkResult::Deleted { cid } => vec![("deleted", cid.clone())],
            WorkResult::Failed { code, message } => {
                let mut fields = vec![("error", code.as_wire().to_string())];
                if let Some(msg) = message {
                    fields.push(("errorMessage", msg.clone()));
                }
                fields
            }
        }
    }
}
