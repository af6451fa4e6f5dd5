//! The four analysis stages
//!
//! Each stage issues one call against the multimodal inference capability
//! and validates the structural shape of the response. Mandatory structural
//! fields (object class, confidence, bounding box, scene label, event
//! frame range) fail the stage when missing; optional descriptive
//! sub-fields fall back to sentinels via the serde defaults on the shared
//! model types. The raw offending payload is retained on every failure for
//! operator inspection.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use framesight_common::{
    auto_detected, BoundingBox, DetectedObject, NarrativeContext, ObjectDetectionResult,
    PipelineError, Result, SceneAttributes, SceneClassification, Stage, TemporalEvent,
};
use framesight_inference::{strip_code_fences, CompletionRequest, InferenceClient};

use crate::prompts;
use crate::window::WindowEntry;

fn call_failed(stage: Stage, e: framesight_inference::InferenceError) -> PipelineError {
    PipelineError::Stage {
        stage,
        cause: e.to_string(),
        raw_response: None,
    }
}

fn parse_response<T: DeserializeOwned>(stage: Stage, raw: &str) -> Result<T> {
    serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| PipelineError::stage(stage, e.to_string(), raw))
}

#[derive(Debug, Deserialize)]
struct RawObjectDetection {
    objects: Vec<RawDetection>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    class: String,
    confidence: f64,
    #[serde(rename = "boundingBox", alias = "bounding_box")]
    bounding_box: RawBox,
}

#[derive(Debug, Deserialize)]
struct RawBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Stage 1: object detection from the frame image alone
pub async fn detect_objects(
    client: &dyn InferenceClient,
    image: &[u8],
) -> Result<ObjectDetectionResult> {
    let stage = Stage::ObjectDetection;
    let raw = client
        .complete(CompletionRequest {
            system_prompt: prompts::OBJECT_DETECTION_SYSTEM.to_string(),
            user_prompt: prompts::OBJECT_DETECTION_USER.to_string(),
            image: Some(image.to_vec()),
            context: None,
            json_only: true,
        })
        .await
        .map_err(|e| call_failed(stage, e))?;

    let parsed: RawObjectDetection = parse_response(stage, &raw)?;
    let objects = parsed
        .objects
        .into_iter()
        .map(|d| DetectedObject {
            class: d.class,
            confidence: d.confidence,
            bounding_box: BoundingBox {
                x: d.bounding_box.x,
                y: d.bounding_box.y,
                width: d.bounding_box.width,
                height: d.bounding_box.height,
            },
        })
        .collect::<Vec<_>>();
    debug!(objects = objects.len(), "Object detection complete");
    Ok(ObjectDetectionResult { objects })
}

#[derive(Debug, Deserialize)]
struct RawScene {
    label: String,
    confidence: f64,
    #[serde(default)]
    attributes: SceneAttributes,
}

/// Stage 2: scene classification, biased by the stage-1 object list
pub async fn classify_scene(
    client: &dyn InferenceClient,
    image: &[u8],
    objects: &ObjectDetectionResult,
) -> Result<SceneClassification> {
    let stage = Stage::SceneClassification;
    let context = serde_json::json!({
        "detectedObjects": objects.objects.iter().map(|o| &o.class).collect::<Vec<_>>(),
    });
    let raw = client
        .complete(CompletionRequest {
            system_prompt: prompts::SCENE_CLASSIFICATION_SYSTEM.to_string(),
            user_prompt: prompts::SCENE_CLASSIFICATION_USER.to_string(),
            image: Some(image.to_vec()),
            context: Some(context),
            json_only: true,
        })
        .await
        .map_err(|e| call_failed(stage, e))?;

    let parsed: RawScene = parse_response(stage, &raw)?;
    debug!(label = %parsed.label, "Scene classification complete");
    Ok(SceneClassification {
        label: parsed.label,
        confidence: parsed.confidence,
        attributes: parsed.attributes,
    })
}

#[derive(Debug, Deserialize)]
struct RawEventList {
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "startFrame", alias = "start_frame")]
    start_frame: u32,
    #[serde(rename = "endFrame", alias = "end_frame")]
    end_frame: u32,
    #[serde(rename = "startTime", alias = "start_time")]
    start_time: f64,
    #[serde(rename = "endTime", alias = "end_time")]
    end_time: f64,
    #[serde(rename = "eventType", alias = "event_type")]
    event_type: String,
    confidence: f64,
    #[serde(default)]
    description: String,
    #[serde(rename = "involvedObjects", alias = "involved_objects", default)]
    involved_objects: Vec<String>,
}

/// Stage 3: event detection over the full temporal window snapshot. The
/// caller skips this stage when the window holds fewer than two frames.
pub async fn detect_events(
    client: &dyn InferenceClient,
    window: &[WindowEntry],
) -> Result<Vec<TemporalEvent>> {
    let stage = Stage::EventDetection;
    let context = serde_json::json!({ "frames": window });
    let raw = client
        .complete(CompletionRequest {
            system_prompt: prompts::EVENT_DETECTION_SYSTEM.to_string(),
            user_prompt: prompts::EVENT_DETECTION_USER.to_string(),
            image: None,
            context: Some(context),
            json_only: true,
        })
        .await
        .map_err(|e| call_failed(stage, e))?;

    let parsed: RawEventList = parse_response(stage, &raw)?;
    let events = parsed
        .events
        .into_iter()
        .map(|e| TemporalEvent {
            start_frame: e.start_frame,
            end_frame: e.end_frame,
            start_time: e.start_time,
            end_time: e.end_time,
            event_type: e.event_type,
            confidence: e.confidence,
            description: e.description,
            involved_objects: e.involved_objects,
        })
        .collect::<Vec<_>>();
    debug!(events = events.len(), "Event detection complete");
    Ok(events)
}

#[derive(Debug, Deserialize)]
struct RawNarrative {
    summary: String,
    #[serde(rename = "keyElements", alias = "key_elements", default)]
    key_elements: Vec<String>,
    #[serde(
        rename = "primaryAction",
        alias = "primary_action",
        default = "auto_detected"
    )]
    primary_action: String,
    #[serde(rename = "secondaryActions", alias = "secondary_actions", default)]
    secondary_actions: Vec<String>,
    #[serde(default)]
    context: String,
}

/// Stage 4: narrative synthesis from the frame image and all prior outputs
pub async fn synthesize_narrative(
    client: &dyn InferenceClient,
    image: &[u8],
    objects: &ObjectDetectionResult,
    scene: &SceneClassification,
    events: &[TemporalEvent],
) -> Result<NarrativeContext> {
    let stage = Stage::NarrativeSynthesis;
    let context = serde_json::json!({
        "objects": objects,
        "scene": scene,
        "events": events,
    });
    let raw = client
        .complete(CompletionRequest {
            system_prompt: prompts::NARRATIVE_SYNTHESIS_SYSTEM.to_string(),
            user_prompt: prompts::NARRATIVE_SYNTHESIS_USER.to_string(),
            image: Some(image.to_vec()),
            context: Some(context),
            json_only: true,
        })
        .await
        .map_err(|e| call_failed(stage, e))?;

    let parsed: RawNarrative = parse_response(stage, &raw)?;
    Ok(NarrativeContext {
        summary: parsed.summary,
        key_elements: parsed.key_elements,
        primary_action: parsed.primary_action,
        secondary_actions: parsed.secondary_actions,
        context: parsed.context,
    })
}
