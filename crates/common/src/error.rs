//! Error taxonomy for the frame analysis pipeline

use std::time::Duration;
use thiserror::Error;

/// The four ordered analysis stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ObjectDetection,
    SceneClassification,
    EventDetection,
    NarrativeSynthesis,
}

impl Stage {
    /// Get human-readable stage name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ObjectDetection => "object_detection",
            Self::SceneClassification => "scene_classification",
            Self::EventDetection => "event_detection",
            Self::NarrativeSynthesis => "narrative_synthesis",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad, empty, or undecodable input video. Fatal, never retried.
    #[error("Invalid input video: {0}")]
    Validation(String),

    /// Decode failure after exhausting all extraction attempts.
    #[error("Frame extraction failed after {attempts} attempts: {cause}")]
    Extraction { cause: String, attempts: u32 },

    /// One inference stage returned an unparsable or structurally invalid
    /// response. The raw payload is kept for operator inspection.
    #[error("Stage {stage} failed: {cause}")]
    Stage {
        stage: Stage,
        cause: String,
        raw_response: Option<String>,
    },

    /// Atomic per-frame commit failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// External call (decode or inference) exceeded its deadline.
    #[error("External call timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Construct a stage error, retaining the raw offending payload
    #[must_use]
    pub fn stage(stage: Stage, cause: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            cause: cause.into(),
            raw_response: Some(raw.into()),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
