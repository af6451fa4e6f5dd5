//! Pipeline orchestration
//!
//! Drives one video through extraction, batched analysis, and persistence,
//! and tracks its lifecycle state. Batch sizing is re-evaluated against
//! memory pressure before every batch. A batch's frames are analyzed
//! concurrently but committed only if every analysis in the batch succeeded;
//! commits then land frame-by-frame in timestamp order so the progress
//! counter is externally visible mid-batch. A failure discards the failing
//! batch's uncommitted results, marks the video `failed`, and keeps all
//! previously committed work.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use framesight_analysis::{build_keyframe, derive_tags, FrameAnalyzer, DEFAULT_WINDOW_CAPACITY};
use framesight_common::{
    ExtractedFrame, FrameAnalysis, PipelineError, ProcessingProgress, Result, VideoState,
};
use framesight_decoder::{ExtractorConfig, FfmpegBackend, FrameExtractor};
use framesight_inference::InferenceClient;
use framesight_monitor::ResourceMonitor;
use framesight_storage::{StorageError, VideoStore};

/// Default analysis batch size before pressure adjustment
pub const DEFAULT_BASE_BATCH_SIZE: usize = 5;

/// Pipeline tuning knobs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Batch size handed to the resource monitor for adjustment
    pub base_batch_size: usize,
    /// Temporal window capacity per video
    pub window_capacity: usize,
    /// Root directory for per-video frame artifacts
    pub work_dir: PathBuf,
    pub extractor: ExtractorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_batch_size: DEFAULT_BASE_BATCH_SIZE,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            work_dir: std::env::temp_dir().join("framesight"),
            extractor: ExtractorConfig::default(),
        }
    }
}

fn persistence(e: StorageError) -> PipelineError {
    PipelineError::Persistence(e.to_string())
}

/// Video processing pipeline
pub struct VideoPipeline {
    extractor: FrameExtractor,
    store: Arc<dyn VideoStore>,
    client: Arc<dyn InferenceClient>,
    monitor: Arc<dyn ResourceMonitor>,
    config: PipelineConfig,
}

impl VideoPipeline {
    pub fn new(
        store: Arc<dyn VideoStore>,
        client: Arc<dyn InferenceClient>,
        monitor: Arc<dyn ResourceMonitor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor: FrameExtractor::new(
                Box::<FfmpegBackend>::default(),
                config.extractor.clone(),
            ),
            store,
            client,
            monitor,
            config,
        }
    }

    /// Replace the production ffmpeg extractor, e.g. with a custom
    /// degradation ladder
    #[must_use]
    pub fn with_extractor(mut self, extractor: FrameExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Kick off processing in the background and return immediately
    pub fn start_processing(self: Arc<Self>, video_id: i32, path: PathBuf) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.process(video_id, &path).await {
                error!(video_id, error = %e, "Video processing failed");
            }
        })
    }

    /// Process one video end to end. Any error marks the video `failed`
    /// while keeping previously committed keyframes and tags.
    #[instrument(skip(self, path))]
    pub async fn process(&self, video_id: i32, path: &Path) -> Result<()> {
        let result = self.run(video_id, path).await;

        let frame_dir = self.frame_dir(video_id);
        if let Err(e) = tokio::fs::remove_dir_all(&frame_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(video_id, error = %e, "Failed to sweep frame artifacts");
            }
        }

        match result {
            Ok(()) => {
                self.store
                    .set_state(video_id, VideoState::Completed)
                    .await
                    .map_err(persistence)?;
                info!(video_id, "Video processing completed");
                Ok(())
            }
            Err(e) => {
                if let Err(se) = self.store.set_state(video_id, VideoState::Failed).await {
                    error!(video_id, error = %se, "Failed to mark video failed");
                }
                Err(e)
            }
        }
    }

    /// Progress snapshot for external callers
    pub async fn get_progress(&self, video_id: i32) -> Result<ProcessingProgress> {
        self.store.get_progress(video_id).await.map_err(persistence)
    }

    fn frame_dir(&self, video_id: i32) -> PathBuf {
        self.config.work_dir.join(format!("video-{video_id}"))
    }

    async fn run(&self, video_id: i32, path: &Path) -> Result<()> {
        self.store
            .set_state(video_id, VideoState::Processing)
            .await
            .map_err(persistence)?;

        let frame_dir = self.frame_dir(video_id);
        tokio::fs::create_dir_all(&frame_dir).await?;

        let extraction = self.extractor.extract(path, &frame_dir).await?;
        info!(
            video_id,
            frames = extraction.frames.len(),
            attempt = extraction.attempt,
            "Extraction complete"
        );

        self.store
            .set_duration(video_id, extraction.duration_seconds)
            .await
            .map_err(persistence)?;
        self.store
            .set_total_frames(video_id, extraction.frames.len() as i32)
            .await
            .map_err(persistence)?;

        self.process_frames(video_id, extraction.frames).await
    }

    /// Analyze and commit extracted frames in adaptive batches. Public so
    /// callers that produce frames by other means can reuse the scheduler.
    pub async fn process_frames(
        &self,
        video_id: i32,
        mut frames: Vec<ExtractedFrame>,
    ) -> Result<()> {
        frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let analyzer = FrameAnalyzer::new(self.client.clone(), self.config.window_capacity);
        let mut remaining = frames.into_iter();

        loop {
            let batch_size = self
                .monitor
                .recommended_batch_size(self.config.base_batch_size);
            let batch: Vec<ExtractedFrame> = remaining.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            info!(
                video_id,
                batch = batch.len(),
                pressure = self.monitor.current_pressure(),
                "Scheduling analysis batch"
            );
            self.run_batch(video_id, batch, &analyzer).await?;
        }

        Ok(())
    }

    /// Analyze one batch concurrently, then commit all of it in timestamp
    /// order. Every task is awaited even when a sibling fails; the first
    /// error is returned and nothing from the batch is committed.
    async fn run_batch(
        &self,
        video_id: i32,
        batch: Vec<ExtractedFrame>,
        analyzer: &FrameAnalyzer,
    ) -> Result<()> {
        let mut handles: Vec<(ExtractedFrame, JoinHandle<Result<FrameAnalysis>>)> =
            Vec::with_capacity(batch.len());
        for frame in batch {
            let analyzer = analyzer.clone();
            let task_frame = frame.clone();
            let handle = tokio::spawn(async move {
                let image = tokio::fs::read(&task_frame.path).await?;
                analyzer
                    .analyze(&image, task_frame.index, task_frame.timestamp)
                    .await
            });
            handles.push((frame, handle));
        }

        let mut analyzed = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for (frame, handle) in handles {
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(PipelineError::Internal(e.to_string())));
            match outcome {
                Ok(analysis) => analyzed.push((frame, analysis)),
                Err(e) => {
                    warn!(video_id, frame = frame.index, error = %e, "Frame analysis failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        analyzed.sort_by(|a, b| a.1.timestamp.total_cmp(&b.1.timestamp));
        for (frame, analysis) in analyzed {
            let mut keyframe = build_keyframe(video_id, &analysis);
            keyframe.thumbnail_path = Some(frame.path.to_string_lossy().into_owned());
            let tags = derive_tags(video_id, &analysis);
            self.store
                .commit_frame(&keyframe, &tags)
                .await
                .map_err(persistence)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use framesight_analysis::prompts;
    use framesight_common::TagCategory;
    use framesight_decoder::backend::DecodeBackend;
    use framesight_decoder::{ExtractionSettings, VideoProbe};
    use framesight_inference::{CompletionRequest, InferenceClient, InferenceError};
    use framesight_monitor::FixedMonitor;
    use framesight_storage::MemoryVideoStore;
    use std::time::Duration;

    /// Succeeds on every stage unless the frame image matches the poison
    /// bytes, in which case scene classification returns garbage.
    struct PoisonClient {
        poison: Option<Vec<u8>>,
    }

    #[async_trait]
    impl InferenceClient for PoisonClient {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<String, InferenceError> {
            if request.system_prompt == prompts::OBJECT_DETECTION_SYSTEM {
                Ok(r#"{"objects": [{"class": "person", "confidence": 0.9,
                    "boundingBox": {"x": 0.0, "y": 0.0, "width": 5.0, "height": 5.0}}]}"#
                    .to_string())
            } else if request.system_prompt == prompts::SCENE_CLASSIFICATION_SYSTEM {
                if let Some(poison) = &self.poison {
                    if request.image.as_deref() == Some(poison.as_slice()) {
                        return Ok("scene classifier went off the rails".to_string());
                    }
                }
                Ok(r#"{"label": "street", "confidence": 0.8}"#.to_string())
            } else if request.system_prompt == prompts::EVENT_DETECTION_SYSTEM {
                Ok(r#"{"events": []}"#.to_string())
            } else {
                Ok(r#"{"summary": "a person", "keyElements": ["person"],
                    "primaryAction": "standing", "secondaryActions": [], "context": ""}"#
                    .to_string())
            }
        }
    }

    fn pipeline_with(
        store: Arc<MemoryVideoStore>,
        poison: Option<Vec<u8>>,
        pressure: f64,
    ) -> VideoPipeline {
        VideoPipeline::new(
            store,
            Arc::new(PoisonClient { poison }),
            Arc::new(FixedMonitor::new(pressure)),
            PipelineConfig::default(),
        )
    }

    /// Write `count` frame files into a temp dir and return their records
    fn fabricate_frames(dir: &Path, count: u32) -> Vec<ExtractedFrame> {
        (1..=count)
            .map(|i| {
                let path = dir.join(format!("frame_{i:06}.jpg"));
                std::fs::write(&path, format!("frame-{i}")).unwrap();
                ExtractedFrame {
                    index: i,
                    timestamp: f64::from(i - 1) / 2.0,
                    path,
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_all_batches_commit_and_video_counts_match() {
        let store = Arc::new(MemoryVideoStore::new());
        let video_id = store.create_video("/tmp/clip.mp4").await.unwrap();
        store.set_total_frames(video_id, 10).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let frames = fabricate_frames(dir.path(), 10);

        // Mid-band pressure keeps the batch size at the base of 5
        let pipeline = pipeline_with(store.clone(), None, 70.0);
        pipeline.process_frames(video_id, frames).await.unwrap();

        let progress = store.get_progress(video_id).await.unwrap();
        assert_eq!(progress.processed_frames, 10);
        assert_eq!(store.get_keyframes(video_id).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_mid_run_failure_keeps_committed_batches() {
        let store = Arc::new(MemoryVideoStore::new());
        let video_id = store.create_video("/tmp/clip.mp4").await.unwrap();
        store.set_total_frames(video_id, 10).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let frames = fabricate_frames(dir.path(), 10);

        // Frame 7 poisons scene classification in the second batch of 5
        let pipeline = pipeline_with(store.clone(), Some(b"frame-7".to_vec()), 70.0);
        let err = pipeline
            .process_frames(video_id, frames)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Stage { .. }));

        // First batch committed in full, second batch discarded entirely
        let progress = store.get_progress(video_id).await.unwrap();
        assert_eq!(progress.processed_frames, 5);
        let keyframes = store.get_keyframes(video_id).await.unwrap();
        assert_eq!(keyframes.len(), 5);
        assert!(keyframes.iter().all(|k| k.timestamp < 2.5));
    }

    #[tokio::test]
    async fn test_keyframes_carry_tags_and_thumbnails() {
        let store = Arc::new(MemoryVideoStore::new());
        let video_id = store.create_video("/tmp/clip.mp4").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let frames = fabricate_frames(dir.path(), 2);

        let pipeline = pipeline_with(store.clone(), None, 70.0);
        pipeline.process_frames(video_id, frames).await.unwrap();

        let keyframes = store.get_keyframes(video_id).await.unwrap();
        assert!(keyframes
            .iter()
            .all(|k| k.thumbnail_path.as_deref().is_some_and(|p| p.contains("frame_"))));

        let tags = store.get_tags(video_id).await.unwrap();
        assert!(tags.iter().any(|t| t.category == TagCategory::Person));
        assert!(tags.iter().any(|t| t.category == TagCategory::Scene));
        assert!(tags.iter().all(|t| (0..=100).contains(&t.confidence)));
    }

    #[tokio::test]
    async fn test_high_pressure_halves_batch() {
        let store = Arc::new(MemoryVideoStore::new());
        let video_id = store.create_video("/tmp/clip.mp4").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        // Poison frame 3: with base 5 halved to 2, the first batch (frames
        // 1-2) must commit before the second batch (3-4) fails
        let frames = fabricate_frames(dir.path(), 6);

        let pipeline = pipeline_with(store.clone(), Some(b"frame-3".to_vec()), 95.0);
        pipeline
            .process_frames(video_id, frames)
            .await
            .unwrap_err();

        let progress = store.get_progress(video_id).await.unwrap();
        assert_eq!(progress.processed_frames, 2);
    }

    /// Probe succeeds, decode never produces artifacts
    struct BarrenBackend;

    #[async_trait]
    impl DecodeBackend for BarrenBackend {
        async fn probe(&self, _path: &Path) -> framesight_common::Result<VideoProbe> {
            Ok(VideoProbe {
                duration_seconds: 4.0,
                container: "mov".to_string(),
                has_video: true,
            })
        }

        async fn decode(
            &self,
            _path: &Path,
            _settings: &ExtractionSettings,
            _output_dir: &Path,
        ) -> framesight_common::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_zero_frames_marks_video_failed() {
        let store = Arc::new(MemoryVideoStore::new());
        let video_id = store.create_video("/tmp/clip.mp4").await.unwrap();

        let input = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(input.path(), b"not really a video").unwrap();

        let extractor_config = ExtractorConfig {
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(2),
            ..ExtractorConfig::default()
        };

        let work_dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            work_dir: work_dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let pipeline = VideoPipeline::new(
            store.clone(),
            Arc::new(PoisonClient { poison: None }),
            Arc::new(FixedMonitor::new(50.0)),
            config,
        )
        .with_extractor(FrameExtractor::new(
            Box::new(BarrenBackend),
            extractor_config,
        ));

        let err = pipeline.process(video_id, input.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction { .. }));

        let progress = store.get_progress(video_id).await.unwrap();
        assert_eq!(progress.state, VideoState::Failed);
        assert_eq!(progress.processed_frames, 0);
        assert!(store.get_keyframes(video_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_fails_validation() {
        let store = Arc::new(MemoryVideoStore::new());
        let video_id = store.create_video("/tmp/clip.mp4").await.unwrap();

        let input = tempfile::NamedTempFile::new().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            work_dir: work_dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let pipeline = VideoPipeline::new(
            store.clone(),
            Arc::new(PoisonClient { poison: None }),
            Arc::new(FixedMonitor::new(50.0)),
            config,
        );

        let err = pipeline.process(video_id, input.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        let progress = store.get_progress(video_id).await.unwrap();
        assert_eq!(progress.state, VideoState::Failed);
    }
}
