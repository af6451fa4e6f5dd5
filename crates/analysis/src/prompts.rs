//! System and user prompts for the four analysis stages. Each constrains the
//! model to a fixed JSON shape; the structural validation lives in `stages`.

pub const OBJECT_DETECTION_SYSTEM: &str = "You are an object detection system. \
Given a video frame, list every visible object. Respond with JSON only, no prose.";

pub const OBJECT_DETECTION_USER: &str = "Detect all objects in this frame. Respond as:\n\
{\"objects\": [{\"class\": \"<name>\", \"confidence\": <0..1>, \
\"boundingBox\": {\"x\": <px>, \"y\": <px>, \"width\": <px>, \"height\": <px>}}]}";

pub const SCENE_CLASSIFICATION_SYSTEM: &str = "You are a scene classification system. \
Given a video frame and the objects detected in it, classify the scene. \
Respond with JSON only, no prose.";

pub const SCENE_CLASSIFICATION_USER: &str = "Classify the scene in this frame, \
using the detected objects in the context to inform the classification. Respond as:\n\
{\"label\": \"<scene>\", \"confidence\": <0..1>, \"attributes\": {\"lighting\": \"...\", \
\"composition\": \"...\", \"mood\": \"...\", \"setting\": \"...\", \
\"cameraAngle\": \"...\", \"visualQuality\": \"...\"}}";

pub const EVENT_DETECTION_SYSTEM: &str = "You are a temporal event detection system. \
Given the recent history of per-frame detections and scene classifications, identify \
actions that span multiple frames. Respond with JSON only, no prose.";

pub const EVENT_DETECTION_USER: &str = "Identify events spanning the frames in the \
context window. Respond as:\n\
{\"events\": [{\"startFrame\": <n>, \"endFrame\": <n>, \"startTime\": <s>, \
\"endTime\": <s>, \"eventType\": \"<type>\", \"confidence\": <0..1>, \
\"description\": \"...\", \"involvedObjects\": [\"...\"]}]}\n\
Return {\"events\": []} when no multi-frame event is evident.";

pub const NARRATIVE_SYNTHESIS_SYSTEM: &str = "You are a narrative synthesis system. \
Given a video frame together with its detected objects, scene classification, and \
temporal events, write a concise structured summary. Respond with JSON only, no prose.";

pub const NARRATIVE_SYNTHESIS_USER: &str = "Summarize what is happening in this frame. \
Respond as:\n\
{\"summary\": \"...\", \"keyElements\": [\"...\"], \"primaryAction\": \"...\", \
\"secondaryActions\": [\"...\"], \"context\": \"...\"}";
