//! Decoder gateway
//!
//! Wraps the external frame-extraction utility. Produces an ordered sequence
//! of timestamped JPEG artifacts from an uploaded video, with bounded retry
//! and progressive quality degradation for difficult inputs. Every attempt's
//! output is verified independently of what the decoder claims: a frame file
//! must exist, be non-empty, and have decodable dimensions to survive.

pub mod backend;

pub use backend::{DecodeBackend, FfmpegBackend};

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use framesight_common::{ExtractedFrame, PipelineError, Result};

/// Result of probing a video container
#[derive(Debug, Clone)]
pub struct VideoProbe {
    pub duration_seconds: f64,
    pub container: String,
    pub has_video: bool,
}

/// Decode settings for a single extraction attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    /// Sampling rate in frames per second
    pub fps: f64,
    /// JPEG quality as ffmpeg `-q:v` (2 = best, 31 = worst)
    pub jpeg_quality: u8,
    /// Cap on the number of frames requested
    pub max_frames: u32,
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Extraction attempts before giving up
    pub max_attempts: u32,
    /// Base delay between attempts, doubling per attempt
    pub backoff_base: Duration,
    /// Upper bound on the backoff delay
    pub backoff_cap: Duration,
    /// Degradation ladder, one rung per attempt. Attempts past the last rung
    /// reuse it.
    pub ladder: Vec<ExtractionSettings>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(5),
            ladder: vec![
                ExtractionSettings {
                    fps: 2.0,
                    jpeg_quality: 2,
                    max_frames: 600,
                },
                ExtractionSettings {
                    fps: 1.0,
                    jpeg_quality: 5,
                    max_frames: 300,
                },
                ExtractionSettings {
                    fps: 0.5,
                    jpeg_quality: 8,
                    max_frames: 120,
                },
            ],
        }
    }
}

impl ExtractorConfig {
    /// Settings for the given attempt, clamped to the last ladder rung
    #[must_use]
    pub fn settings_for_attempt(&self, attempt: u32) -> &ExtractionSettings {
        let idx = (attempt as usize).min(self.ladder.len().saturating_sub(1));
        &self.ladder[idx]
    }

    /// Exponential backoff delay before retrying after `attempt` failed
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.backoff_cap)
    }
}

/// A completed extraction
#[derive(Debug)]
pub struct Extraction {
    /// Verified frames, sorted by index. Gaps and duplicates are passed
    /// through untouched.
    pub frames: Vec<ExtractedFrame>,
    /// 0-based attempt that produced the frames
    pub attempt: u32,
    /// Settings of the successful attempt
    pub settings: ExtractionSettings,
    /// Duration reported by the probe
    pub duration_seconds: f64,
}

/// Decoder gateway over an external decode backend
pub struct FrameExtractor {
    backend: Box<dyn DecodeBackend>,
    config: ExtractorConfig,
}

impl FrameExtractor {
    #[must_use]
    pub fn new(backend: Box<dyn DecodeBackend>, config: ExtractorConfig) -> Self {
        Self { backend, config }
    }

    /// Gateway with the production ffmpeg backend and default settings
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Box::<FfmpegBackend>::default(), ExtractorConfig::default())
    }

    /// Extract frames from `path` into `output_dir`.
    ///
    /// Validates the input up front (fails fast, no retry), then attempts
    /// extraction up to `max_attempts` times with exponential backoff,
    /// degrading sampling rate and quality per attempt. Partial artifacts
    /// from a failed attempt are swept before the next one.
    pub async fn extract(&self, path: &Path, output_dir: &Path) -> Result<Extraction> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            PipelineError::Validation(format!("cannot read {}: {e}", path.display()))
        })?;
        if metadata.len() == 0 {
            return Err(PipelineError::Validation(format!(
                "{} is empty",
                path.display()
            )));
        }

        let probe = self.backend.probe(path).await?;
        if !probe.has_video {
            return Err(PipelineError::Validation(format!(
                "{} has no video stream",
                path.display()
            )));
        }
        if probe.duration_seconds <= 0.0 {
            return Err(PipelineError::Validation(format!(
                "{} has zero duration",
                path.display()
            )));
        }

        tokio::fs::create_dir_all(output_dir).await?;

        let mut last_cause = String::from("no attempts made");
        for attempt in 0..self.config.max_attempts {
            sweep_artifacts(output_dir)?;
            let settings = self.config.settings_for_attempt(attempt);
            info!(
                attempt,
                fps = settings.fps,
                quality = settings.jpeg_quality,
                max_frames = settings.max_frames,
                "Starting extraction attempt for {}",
                path.display()
            );

            match self.backend.decode(path, settings, output_dir).await {
                Ok(()) => {
                    let frames = verify_artifacts(output_dir, settings.fps)?;
                    if frames.is_empty() {
                        warn!(attempt, "Decode reported success but no valid frames survived verification");
                        last_cause = "no valid frames survived verification".to_string();
                    } else {
                        info!(
                            attempt,
                            frames = frames.len(),
                            "Extraction succeeded"
                        );
                        return Ok(Extraction {
                            frames,
                            attempt,
                            settings: settings.clone(),
                            duration_seconds: probe.duration_seconds,
                        });
                    }
                }
                Err(e) => {
                    warn!(attempt, "Decode attempt failed: {e}");
                    last_cause = e.to_string();
                }
            }

            if attempt + 1 < self.config.max_attempts {
                tokio::time::sleep(self.config.backoff_delay(attempt)).await;
            }
        }

        Err(PipelineError::Extraction {
            cause: last_cause,
            attempts: self.config.max_attempts,
        })
    }
}

/// Remove leftover frame artifacts from a previous attempt
fn sweep_artifacts(output_dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(output_dir)? {
        let path = entry?.path();
        if is_frame_artifact(&path) {
            let _ = std::fs::remove_file(&path);
        }
    }
    Ok(())
}

fn is_frame_artifact(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("jpg")
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.starts_with("frame_"))
}

fn frame_index(path: &Path) -> Option<u32> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.split('_').next_back())
        .and_then(|s| s.parse::<u32>().ok())
}

/// Verify decode output independently of what the decoder claimed. Invalid
/// or empty artifacts are deleted and excluded; survivors come back sorted
/// by frame index with timestamps derived from the sampling rate.
fn verify_artifacts(output_dir: &Path, fps: f64) -> Result<Vec<ExtractedFrame>> {
    let mut frames: Vec<ExtractedFrame> = Vec::new();
    let mut rejected = 0usize;

    for entry in std::fs::read_dir(output_dir)? {
        let path = entry?.path();
        if !is_frame_artifact(&path) {
            continue;
        }
        let Some(index) = frame_index(&path) else {
            continue;
        };

        let valid = std::fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false)
            && image::image_dimensions(&path).is_ok();
        if !valid {
            rejected += 1;
            let _ = std::fs::remove_file(&path);
            continue;
        }

        frames.push(ExtractedFrame {
            index,
            timestamp: f64::from(index.saturating_sub(1)) / fps,
            path,
        });
    }

    frames.sort_by_key(|f| f.index);
    debug!(
        valid = frames.len(),
        rejected, "Verified extraction artifacts"
    );
    Ok(frames)
}
