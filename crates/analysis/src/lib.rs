//! Frame analysis orchestration
//!
//! Runs the four-stage chain for a single extracted frame: object detection,
//! scene classification, temporal event detection, narrative synthesis. Each
//! stage feeds the next; the first failure aborts the chain for that frame.
//! Event detection reads the shared temporal window and is skipped when the
//! window holds fewer than two frames, since no multi-frame action can exist
//! yet.

pub mod aggregate;
pub mod prompts;
pub mod stages;
pub mod window;

use std::sync::Arc;

use tracing::{debug, instrument};

use framesight_common::{FrameAnalysis, Result};
use framesight_inference::InferenceClient;

pub use aggregate::{build_keyframe, derive_tags, scale_confidence};
pub use window::{TemporalWindow, WindowEntry, DEFAULT_WINDOW_CAPACITY};

/// Per-video analyzer. Cheap to clone; frame workers share the inference
/// client and the temporal window.
#[derive(Clone)]
pub struct FrameAnalyzer {
    client: Arc<dyn InferenceClient>,
    window: Arc<TemporalWindow>,
}

impl FrameAnalyzer {
    pub fn new(client: Arc<dyn InferenceClient>, window_capacity: usize) -> Self {
        Self {
            client,
            window: Arc::new(TemporalWindow::with_capacity(window_capacity)),
        }
    }

    pub fn window(&self) -> &TemporalWindow {
        &self.window
    }

    /// Run all four stages for one frame. The frame's own stage-1/2 results
    /// are appended to the window before event detection, so they are part
    /// of its own event context.
    #[instrument(skip(self, image))]
    pub async fn analyze(
        &self,
        image: &[u8],
        frame_index: u32,
        timestamp: f64,
    ) -> Result<FrameAnalysis> {
        let objects = stages::detect_objects(self.client.as_ref(), image).await?;
        let scene = stages::classify_scene(self.client.as_ref(), image, &objects).await?;

        self.window.append(WindowEntry {
            frame_index,
            timestamp,
            objects: objects.clone(),
            scene: scene.clone(),
        });
        let snapshot = self.window.snapshot();

        let events = if snapshot.len() < 2 {
            debug!(frame = frame_index, "Window too small, skipping event detection");
            Vec::new()
        } else {
            stages::detect_events(self.client.as_ref(), &snapshot).await?
        };

        let narrative =
            stages::synthesize_narrative(self.client.as_ref(), image, &objects, &scene, &events)
                .await?;

        Ok(FrameAnalysis {
            frame_index,
            timestamp,
            objects,
            scene,
            events,
            narrative,
        })
    }
}
