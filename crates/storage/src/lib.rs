//! Persistence layer
//!
//! Stores videos, keyframes, and tags in `PostgreSQL`. A frame's keyframe
//! row, its tag rows, and the progress counter bump commit in a single
//! transaction so external readers never observe a keyframe without its
//! tags or a counter ahead of the rows it counts.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use framesight_common::{KeyframeRecord, ProcessingProgress, TagRecord, VideoRecord, VideoState};

pub use memory::MemoryVideoStore;
pub use postgres::{PostgresConfig, PostgresVideoStore};

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("PostgreSQL error: {0}")]
    Postgres(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Video not found: {0}")]
    NotFound(i32),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Video metadata, keyframe, and tag persistence
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Initialize database schema (create tables if not exist)
    async fn init_schema(&self) -> StorageResult<()>;

    /// Register a new video in `pending` state, returning its id
    async fn create_video(&self, source_path: &str) -> StorageResult<i32>;

    /// Retrieve a video row
    async fn get_video(&self, video_id: i32) -> StorageResult<VideoRecord>;

    /// Record the probed duration in seconds
    async fn set_duration(&self, video_id: i32, duration: f64) -> StorageResult<()>;

    /// Record the total frame count once extraction finishes
    async fn set_total_frames(&self, video_id: i32, total: i32) -> StorageResult<()>;

    /// Move the video to a new lifecycle state
    async fn set_state(&self, video_id: i32, state: VideoState) -> StorageResult<()>;

    /// Atomically persist one frame's keyframe row and tag rows and bump
    /// the processed-frame counter
    async fn commit_frame(
        &self,
        keyframe: &KeyframeRecord,
        tags: &[TagRecord],
    ) -> StorageResult<()>;

    /// Progress snapshot for external callers
    async fn get_progress(&self, video_id: i32) -> StorageResult<ProcessingProgress>;

    /// Keyframes for a video, ordered by timestamp
    async fn get_keyframes(&self, video_id: i32) -> StorageResult<Vec<KeyframeRecord>>;

    /// Tags for a video, ordered by timestamp
    async fn get_tags(&self, video_id: i32) -> StorageResult<Vec<TagRecord>>;

    /// Delete a video and all dependent rows
    async fn delete_video(&self, video_id: i32) -> StorageResult<()>;
}
