//! Decode backends: the production `ffmpeg`/`ffprobe` subprocess wrapper and
//! the trait that lets tests script decode outcomes.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use framesight_common::{PipelineError, Result};

use crate::{ExtractionSettings, VideoProbe};

/// External decode capability consumed by the gateway
#[async_trait]
pub trait DecodeBackend: Send + Sync {
    /// Probe container validity and duration
    async fn probe(&self, path: &Path) -> Result<VideoProbe>;

    /// Decode the video into numbered JPEG files under `output_dir`
    async fn decode(
        &self,
        path: &Path,
        settings: &ExtractionSettings,
        output_dir: &Path,
    ) -> Result<()>;
}

/// `ffprobe -print_format json` output, reduced to the fields we read
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
}

/// Production backend shelling out to the `ffmpeg` and `ffprobe` CLIs
pub struct FfmpegBackend {
    call_timeout: Duration,
}

impl FfmpegBackend {
    #[must_use]
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }

    async fn run(&self, mut command: Command) -> Result<std::process::Output> {
        let output = tokio::time::timeout(self.call_timeout, command.output())
            .await
            .map_err(|_| PipelineError::Timeout(self.call_timeout))??;
        Ok(output)
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

#[async_trait]
impl DecodeBackend for FfmpegBackend {
    async fn probe(&self, path: &Path) -> Result<VideoProbe> {
        let mut command = Command::new("ffprobe");
        command
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .kill_on_drop(true);

        let output = self.run(command).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Validation(format!(
                "ffprobe could not read {}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let format = parsed.format.ok_or_else(|| {
            PipelineError::Validation(format!("no container format in {}", path.display()))
        })?;

        let duration_seconds = format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);
        let has_video = parsed
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("video"));

        let probe = VideoProbe {
            duration_seconds,
            container: format
                .format_name
                .unwrap_or_default()
                .split(',')
                .next()
                .unwrap_or("unknown")
                .to_string(),
            has_video,
        };
        debug!(
            "Probed {}: container={}, duration={:.2}s, has_video={}",
            path.display(),
            probe.container,
            probe.duration_seconds,
            probe.has_video
        );
        Ok(probe)
    }

    async fn decode(
        &self,
        path: &Path,
        settings: &ExtractionSettings,
        output_dir: &Path,
    ) -> Result<()> {
        let pattern = output_dir.join("frame_%06d.jpg");

        let mut command = Command::new("ffmpeg");
        command
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(path)
            .args([
                "-vf",
                &format!("fps={}", settings.fps),
                "-q:v",
                &settings.jpeg_quality.to_string(),
                "-frames:v",
                &settings.max_frames.to_string(),
            ])
            .arg(&pattern)
            .kill_on_drop(true);

        let output = self.run(command).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Internal(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
