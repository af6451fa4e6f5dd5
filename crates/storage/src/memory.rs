//! In-memory video store
//!
//! Implements [`VideoStore`] over a mutex-guarded map with the same
//! atomicity contract as the `PostgreSQL` store: a frame commit either
//! lands in full (keyframe, tags, counter) or not at all. Used by tests
//! and by local runs without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use framesight_common::{
    KeyframeRecord, ProcessingProgress, TagRecord, VideoRecord, VideoState,
};

use crate::{StorageError, StorageResult, VideoStore};

#[derive(Default)]
struct Inner {
    next_id: i32,
    videos: HashMap<i32, VideoRecord>,
    keyframes: HashMap<i32, Vec<KeyframeRecord>>,
    tags: HashMap<i32, Vec<TagRecord>>,
}

/// Mutex-guarded in-memory store
#[derive(Default)]
pub struct MemoryVideoStore {
    inner: Mutex<Inner>,
}

impl MemoryVideoStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn init_schema(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn create_video(&self, source_path: &str) -> StorageResult<i32> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let id = inner.next_id;
        inner.videos.insert(
            id,
            VideoRecord {
                id,
                source_path: source_path.to_string(),
                duration_seconds: None,
                state: VideoState::Pending,
                total_frames: 0,
                processed_frames: 0,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_video(&self, video_id: i32) -> StorageResult<VideoRecord> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .videos
            .get(&video_id)
            .cloned()
            .ok_or(StorageError::NotFound(video_id))
    }

    async fn set_duration(&self, video_id: i32, duration: f64) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let video = inner
            .videos
            .get_mut(&video_id)
            .ok_or(StorageError::NotFound(video_id))?;
        video.duration_seconds = Some(duration);
        Ok(())
    }

    async fn set_total_frames(&self, video_id: i32, total: i32) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let video = inner
            .videos
            .get_mut(&video_id)
            .ok_or(StorageError::NotFound(video_id))?;
        video.total_frames = total;
        Ok(())
    }

    async fn set_state(&self, video_id: i32, state: VideoState) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let video = inner
            .videos
            .get_mut(&video_id)
            .ok_or(StorageError::NotFound(video_id))?;
        video.state = state;
        Ok(())
    }

    async fn commit_frame(
        &self,
        keyframe: &KeyframeRecord,
        tags: &[TagRecord],
    ) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let video_id = keyframe.video_id;
        if !inner.videos.contains_key(&video_id) {
            return Err(StorageError::NotFound(video_id));
        }
        inner
            .keyframes
            .entry(video_id)
            .or_default()
            .push(keyframe.clone());
        inner
            .tags
            .entry(video_id)
            .or_default()
            .extend(tags.iter().cloned());
        if let Some(video) = inner.videos.get_mut(&video_id) {
            video.processed_frames += 1;
        }
        Ok(())
    }

    async fn get_progress(&self, video_id: i32) -> StorageResult<ProcessingProgress> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let video = inner
            .videos
            .get(&video_id)
            .ok_or(StorageError::NotFound(video_id))?;
        Ok(ProcessingProgress {
            state: video.state,
            total_frames: video.total_frames,
            processed_frames: video.processed_frames,
        })
    }

    async fn get_keyframes(&self, video_id: i32) -> StorageResult<Vec<KeyframeRecord>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut keyframes = inner.keyframes.get(&video_id).cloned().unwrap_or_default();
        keyframes.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(keyframes)
    }

    async fn get_tags(&self, video_id: i32) -> StorageResult<Vec<TagRecord>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut tags = inner.tags.get(&video_id).cloned().unwrap_or_default();
        tags.sort_by(|a, b| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(tags)
    }

    async fn delete_video(&self, video_id: i32) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.videos.remove(&video_id);
        inner.keyframes.remove(&video_id);
        inner.tags.remove(&video_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesight_common::{
        KeyframeActions, KeyframeMetadata, KeyframeObjects, SceneAttributes, TagCategory,
    };

    fn keyframe(video_id: i32, timestamp: f64) -> KeyframeRecord {
        KeyframeRecord {
            video_id,
            timestamp,
            thumbnail_path: None,
            metadata: KeyframeMetadata {
                description: "a test frame".to_string(),
                objects: KeyframeObjects::default(),
                actions: KeyframeActions::default(),
                technical: SceneAttributes::default(),
            },
        }
    }

    fn tag(video_id: i32, name: &str, timestamp: f64) -> TagRecord {
        TagRecord {
            video_id,
            name: name.to_string(),
            category: TagCategory::Object,
            timestamp,
            confidence: 90,
            ai_generated: true,
        }
    }

    #[tokio::test]
    async fn test_lifecycle_round_trip() {
        let store = MemoryVideoStore::new();
        let id = store.create_video("/tmp/clip.mp4").await.unwrap();

        store.set_state(id, VideoState::Processing).await.unwrap();
        store.set_duration(id, 12.5).await.unwrap();
        store.set_total_frames(id, 10).await.unwrap();

        let video = store.get_video(id).await.unwrap();
        assert_eq!(video.state, VideoState::Processing);
        assert_eq!(video.duration_seconds, Some(12.5));
        assert_eq!(video.total_frames, 10);
        assert_eq!(video.processed_frames, 0);
    }

    #[tokio::test]
    async fn test_commit_frame_bumps_counter_with_rows() {
        let store = MemoryVideoStore::new();
        let id = store.create_video("/tmp/clip.mp4").await.unwrap();
        store.set_total_frames(id, 2).await.unwrap();

        store
            .commit_frame(&keyframe(id, 0.0), &[tag(id, "dog", 0.0)])
            .await
            .unwrap();
        store
            .commit_frame(&keyframe(id, 0.5), &[tag(id, "cat", 0.5)])
            .await
            .unwrap();

        let progress = store.get_progress(id).await.unwrap();
        assert_eq!(progress.processed_frames, 2);
        assert_eq!(store.get_keyframes(id).await.unwrap().len(), 2);
        assert_eq!(store.get_tags(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_commit_frame_unknown_video_changes_nothing() {
        let store = MemoryVideoStore::new();
        let err = store
            .commit_frame(&keyframe(42, 0.0), &[tag(42, "dog", 0.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(42)));
        assert!(store.get_keyframes(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keyframes_ordered_by_timestamp() {
        let store = MemoryVideoStore::new();
        let id = store.create_video("/tmp/clip.mp4").await.unwrap();
        store.commit_frame(&keyframe(id, 1.5), &[]).await.unwrap();
        store.commit_frame(&keyframe(id, 0.5), &[]).await.unwrap();
        store.commit_frame(&keyframe(id, 1.0), &[]).await.unwrap();

        let timestamps: Vec<f64> = store
            .get_keyframes(id)
            .await
            .unwrap()
            .iter()
            .map(|k| k.timestamp)
            .collect();
        assert_eq!(timestamps, vec![0.5, 1.0, 1.5]);
    }

    #[tokio::test]
    async fn test_delete_video_removes_dependents() {
        let store = MemoryVideoStore::new();
        let id = store.create_video("/tmp/clip.mp4").await.unwrap();
        store
            .commit_frame(&keyframe(id, 0.0), &[tag(id, "dog", 0.0)])
            .await
            .unwrap();

        store.delete_video(id).await.unwrap();
        assert!(matches!(
            store.get_video(id).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(store.get_keyframes(id).await.unwrap().is_empty());
        assert!(store.get_tags(id).await.unwrap().is_empty());
    }
}
