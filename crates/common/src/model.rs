//! Data model shared across the pipeline crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl VideoState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a state stored as TEXT
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states are never re-entered automatically
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A video row as persisted. Exactly one pipeline run mutates a video at a
/// time; `processed_frames` never exceeds `total_frames`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: i32,
    pub source_path: String,
    pub duration_seconds: Option<f64>,
    pub state: VideoState,
    pub total_frames: i32,
    pub processed_frames: i32,
    pub created_at: DateTime<Utc>,
}

/// Transient frame artifact produced by the decoder gateway. Consumed and
/// deleted by the scheduler; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFrame {
    /// 1-based frame index within the extraction
    pub index: u32,
    /// Seconds from the start of the video
    pub timestamp: f64,
    /// Image bytes on temporary storage
    pub path: PathBuf,
}

/// Axis-aligned bounding box in pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One detected object within a frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    pub class: String,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

impl DetectedObject {
    /// Whether the detection names a person ("person", "person walking", ...)
    #[must_use]
    pub fn is_person(&self) -> bool {
        self.class.to_lowercase().contains("person")
    }
}

/// Stage-1 output: ordered object list for one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectDetectionResult {
    pub objects: Vec<DetectedObject>,
}

/// Sentinel for descriptive attributes the model did not report
pub const AUTO_DETECTED: &str = "auto-detected";

pub fn auto_detected() -> String {
    AUTO_DETECTED.to_string()
}

/// Descriptive attribute bag attached to a scene classification. Every field
/// is optional in the model response and falls back to a sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneAttributes {
    #[serde(default = "auto_detected")]
    pub lighting: String,
    #[serde(default = "auto_detected")]
    pub composition: String,
    #[serde(default = "auto_detected")]
    pub mood: String,
    #[serde(default = "auto_detected")]
    pub setting: String,
    #[serde(default = "auto_detected", rename = "cameraAngle")]
    pub camera_angle: String,
    #[serde(default = "auto_detected", rename = "visualQuality")]
    pub visual_quality: String,
}

impl Default for SceneAttributes {
    fn default() -> Self {
        Self {
            lighting: auto_detected(),
            composition: auto_detected(),
            mood: auto_detected(),
            setting: auto_detected(),
            camera_angle: auto_detected(),
            visual_quality: auto_detected(),
        }
    }
}

/// Stage-2 output for one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneClassification {
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub attributes: SceneAttributes,
}

/// Stage-3 output: an action spanning a sub-range of the temporal window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalEvent {
    pub start_frame: u32,
    pub end_frame: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub event_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub involved_objects: Vec<String>,
}

/// Stage-4 output for one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeContext {
    pub summary: String,
    #[serde(default)]
    pub key_elements: Vec<String>,
    #[serde(default = "auto_detected")]
    pub primary_action: String,
    #[serde(default)]
    pub secondary_actions: Vec<String>,
    #[serde(default)]
    pub context: String,
}

/// Combined output of the four stages for one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub frame_index: u32,
    pub timestamp: f64,
    pub objects: ObjectDetectionResult,
    pub scene: SceneClassification,
    pub events: Vec<TemporalEvent>,
    pub narrative: NarrativeContext,
}

/// Objects grouped by kind inside keyframe metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyframeObjects {
    pub people: Vec<String>,
    pub items: Vec<String>,
    pub environment: Vec<String>,
}

/// Actions recorded inside keyframe metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyframeActions {
    pub primary: String,
    pub secondary: Vec<String>,
    /// Descriptions of temporal events active at this frame
    pub movements: Vec<String>,
}

/// Unified metadata record derived from the four stage outputs of one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyframeMetadata {
    pub description: String,
    pub objects: KeyframeObjects,
    pub actions: KeyframeActions,
    pub technical: SceneAttributes,
}

/// A persisted keyframe row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyframeRecord {
    pub video_id: i32,
    pub timestamp: f64,
    pub thumbnail_path: Option<String>,
    pub metadata: KeyframeMetadata,
}

/// Tag category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    Person,
    Object,
    Scene,
    Event,
    Narrative,
}

impl TagCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Object => "object",
            Self::Scene => "scene",
            Self::Event => "event",
            Self::Narrative => "narrative",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "person" => Some(Self::Person),
            "object" => Some(Self::Object),
            "scene" => Some(Self::Scene),
            "event" => Some(Self::Event),
            "narrative" => Some(Self::Narrative),
            _ => None,
        }
    }
}

/// A persisted tag row. Confidence is stored on a 0-100 scale and is always
/// clamped into that range regardless of the upstream value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRecord {
    pub video_id: i32,
    pub name: String,
    pub category: TagCategory,
    pub timestamp: f64,
    pub confidence: i16,
    pub ai_generated: bool,
}

/// Progress snapshot exposed to external callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub state: VideoState,
    pub total_frames: i32,
    pub processed_frames: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [
            VideoState::Pending,
            VideoState::Processing,
            VideoState::Completed,
            VideoState::Failed,
        ] {
            assert_eq!(VideoState::parse(state.as_str()), Some(state));
        }
        assert_eq!(VideoState::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!VideoState::Pending.is_terminal());
        assert!(!VideoState::Processing.is_terminal());
        assert!(VideoState::Completed.is_terminal());
        assert!(VideoState::Failed.is_terminal());
    }

    #[test]
    fn test_is_person_case_insensitive() {
        let obj = DetectedObject {
            class: "Person riding bicycle".to_string(),
            confidence: 0.9,
            bounding_box: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 20.0,
            },
        };
        assert!(obj.is_person());
    }

    #[test]
    fn test_scene_attributes_default_to_sentinel() {
        let attrs: SceneAttributes = serde_json::from_str("{}").unwrap();
        assert_eq!(attrs.lighting, AUTO_DETECTED);
        assert_eq!(attrs.camera_angle, AUTO_DETECTED);
        assert_eq!(attrs.visual_quality, AUTO_DETECTED);
    }

    #[test]
    fn test_scene_attributes_accept_camel_case() {
        let attrs: SceneAttributes =
            serde_json::from_str(r#"{"cameraAngle": "overhead", "lighting": "dim"}"#).unwrap();
        assert_eq!(attrs.camera_angle, "overhead");
        assert_eq!(attrs.lighting, "dim");
        assert_eq!(attrs.mood, AUTO_DETECTED);
    }

    #[test]
    fn test_tag_category_round_trip() {
        for cat in [
            TagCategory::Person,
            TagCategory::Object,
            TagCategory::Scene,
            TagCategory::Event,
            TagCategory::Narrative,
        ] {
            assert_eq!(TagCategory::parse(cat.as_str()), Some(cat));
        }
    }
}
