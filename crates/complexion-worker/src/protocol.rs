//! Wire frames exchanged with the caller, one JSON object per line.

use complexion_core::{LandmarkSet, QualityReport, SkinMetrics};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller → worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Bring up the tensor runtime. Always answered, even when already initialized.
    Initialize { id: Uuid },
    /// Score one photo. `image` is a data URL or bare base64.
    ///
    /// The photo passes the worker's quality gate first and a rejection is
    /// answered with an ERROR frame. Callers that gated the photo themselves
    /// send `"gate": false` to score it regardless.
    Analyze {
        id: Uuid,
        image: String,
        landmarks: LandmarkSet,
        /// Previous report for the same subject, used for trend tags.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<SkinMetrics>,
        #[serde(default = "gate_by_default")]
        gate: bool,
    },
}

fn gate_by_default() -> bool {
    true
}

/// Worker → caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerReply {
    Initialized {
        id: Uuid,
        backend: String,
    },
    Result {
        id: Uuid,
        quality: QualityReport,
        metrics: SkinMetrics,
    },
    Error {
        /// Absent when the request could not be parsed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<Uuid>,
        error: String,
    },
}

impl WorkerReply {
    pub fn error(id: Option<Uuid>, error: impl ToString) -> Self {
        WorkerReply::Error {
            id,
            error: error.to_string(),
        }
    }
}
