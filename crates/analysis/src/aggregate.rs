//! Result aggregation
//!
//! Pure functions turning one frame's four-stage analysis into the rows the
//! store commits: a unified keyframe metadata record and a flat tag list.

use framesight_common::{
    FrameAnalysis, KeyframeActions, KeyframeMetadata, KeyframeObjects, KeyframeRecord,
    TagCategory, TagRecord, AUTO_DETECTED,
};

/// Rescale a `[0,1]` model confidence to the persisted 0-100 scale.
/// Out-of-range inputs clamp rather than fail.
#[must_use]
pub fn scale_confidence(confidence: f64) -> i16 {
    let scaled = (confidence * 100.0).round();
    if scaled <= 0.0 {
        0
    } else if scaled >= 100.0 {
        100
    } else {
        scaled as i16
    }
}

/// Build the keyframe row for one analyzed frame
#[must_use]
pub fn build_keyframe(video_id: i32, analysis: &FrameAnalysis) -> KeyframeRecord {
    let (people, items): (Vec<_>, Vec<_>) = analysis
        .objects
        .objects
        .iter()
        .partition(|o| o.is_person());

    let attrs = &analysis.scene.attributes;
    let mut environment = vec![attrs.setting.clone()];
    for attr in [&attrs.lighting, &attrs.mood, &attrs.composition] {
        if attr != AUTO_DETECTED {
            environment.push(attr.clone());
        }
    }

    KeyframeRecord {
        video_id,
        timestamp: analysis.timestamp,
        thumbnail_path: None,
        metadata: KeyframeMetadata {
            description: analysis.narrative.summary.clone(),
            objects: KeyframeObjects {
                people: people.into_iter().map(|o| o.class.clone()).collect(),
                items: items.into_iter().map(|o| o.class.clone()).collect(),
                environment,
            },
            actions: KeyframeActions {
                primary: analysis.narrative.primary_action.clone(),
                secondary: analysis.narrative.secondary_actions.clone(),
                movements: analysis
                    .events
                    .iter()
                    .map(|e| e.description.clone())
                    .collect(),
            },
            technical: attrs.clone(),
        },
    }
}

/// Confidence assigned to narrative key-element tags, which carry no model
/// confidence of their own
const NARRATIVE_TAG_CONFIDENCE: i16 = 90;

/// Derive the flat tag list for one analyzed frame
#[must_use]
pub fn derive_tags(video_id: i32, analysis: &FrameAnalysis) -> Vec<TagRecord> {
    let mut tags = Vec::new();

    for object in &analysis.objects.objects {
        tags.push(TagRecord {
            video_id,
            name: object.class.clone(),
            category: if object.is_person() {
                TagCategory::Person
            } else {
                TagCategory::Object
            },
            timestamp: analysis.timestamp,
            confidence: scale_confidence(object.confidence),
            ai_generated: true,
        });
    }

    tags.push(TagRecord {
        video_id,
        name: analysis.scene.label.clone(),
        category: TagCategory::Scene,
        timestamp: analysis.timestamp,
        confidence: scale_confidence(analysis.scene.confidence),
        ai_generated: true,
    });

    for event in &analysis.events {
        tags.push(TagRecord {
            video_id,
            name: event.event_type.clone(),
            category: TagCategory::Event,
            // Anchored at the event's start, not the frame's timestamp
            timestamp: event.start_time,
            confidence: scale_confidence(event.confidence),
            ai_generated: true,
        });
    }

    for element in &analysis.narrative.key_elements {
        tags.push(TagRecord {
            video_id,
            name: element.clone(),
            category: TagCategory::Narrative,
            timestamp: analysis.timestamp,
            confidence: NARRATIVE_TAG_CONFIDENCE,
            ai_generated: true,
        });
    }

    tags
}
