//! `PostgreSQL` video store

use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};
use tracing::info;

use framesight_common::{
    KeyframeMetadata, KeyframeRecord, ProcessingProgress, TagCategory, TagRecord, VideoRecord,
    VideoState,
};

use crate::{StorageError, StorageResult, VideoStore};

/// `PostgreSQL` configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("POSTGRES_DB").unwrap_or_else(|_| "framesight".to_string()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_default(),
        }
    }
}

impl PostgresConfig {
    /// Build connection string
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

fn pg_err(e: tokio_postgres::Error) -> StorageError {
    StorageError::Postgres(e.to_string())
}

/// `PostgreSQL` video store. The client sits behind a mutex: frame commits
/// are serialized, so the progress counter only ever moves through committed
/// transactions.
pub struct PostgresVideoStore {
    client: Mutex<Client>,
}

impl PostgresVideoStore {
    /// Connect and spawn the connection driver in the background
    pub async fn connect(config: PostgresConfig) -> StorageResult<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .map_err(pg_err)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

fn row_to_video(row: &tokio_postgres::Row) -> StorageResult<VideoRecord> {
    let state: String = row.get(3);
    let state = VideoState::parse(&state)
        .ok_or_else(|| StorageError::Postgres(format!("unknown video state: {state}")))?;
    Ok(VideoRecord {
        id: row.get(0),
        source_path: row.get(1),
        duration_seconds: row.get(2),
        state,
        total_frames: row.get(4),
        processed_frames: row.get(5),
        created_at: row.get(6),
    })
}

fn row_to_keyframe(row: &tokio_postgres::Row) -> StorageResult<KeyframeRecord> {
    let metadata: serde_json::Value = row.get(3);
    let metadata: KeyframeMetadata =
        serde_json::from_value(metadata).map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(KeyframeRecord {
        video_id: row.get(0),
        timestamp: row.get(1),
        thumbnail_path: row.get(2),
        metadata,
    })
}

fn row_to_tag(row: &tokio_postgres::Row) -> StorageResult<TagRecord> {
    let category: String = row.get(2);
    let category = TagCategory::parse(&category)
        .ok_or_else(|| StorageError::Postgres(format!("unknown tag category: {category}")))?;
    Ok(TagRecord {
        video_id: row.get(0),
        name: row.get(1),
        category,
        timestamp: row.get(3),
        confidence: row.get(4),
        ai_generated: row.get(5),
    })
}

#[async_trait::async_trait]
impl VideoStore for PostgresVideoStore {
    async fn init_schema(&self) -> StorageResult<()> {
        let client = self.client.lock().await;

        client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS videos (
                    id SERIAL PRIMARY KEY,
                    source_path TEXT NOT NULL,
                    duration_seconds DOUBLE PRECISION,
                    state TEXT NOT NULL DEFAULT 'pending',
                    total_frames INTEGER NOT NULL DEFAULT 0,
                    processed_frames INTEGER NOT NULL DEFAULT 0,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
                )
                ",
                &[],
            )
            .await
            .map_err(pg_err)?;

        client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS keyframes (
                    id SERIAL PRIMARY KEY,
                    video_id INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
                    timestamp DOUBLE PRECISION NOT NULL,
                    thumbnail_path TEXT,
                    metadata JSONB NOT NULL
                )
                ",
                &[],
            )
            .await
            .map_err(pg_err)?;

        client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS tags (
                    id SERIAL PRIMARY KEY,
                    video_id INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    timestamp DOUBLE PRECISION NOT NULL,
                    confidence SMALLINT NOT NULL,
                    ai_generated BOOLEAN NOT NULL DEFAULT TRUE
                )
                ",
                &[],
            )
            .await
            .map_err(pg_err)?;

        client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_keyframes_video ON keyframes(video_id, timestamp)",
                &[],
            )
            .await
            .map_err(pg_err)?;

        client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_tags_video ON tags(video_id, timestamp)",
                &[],
            )
            .await
            .map_err(pg_err)?;

        info!("PostgreSQL schema initialized");

        Ok(())
    }

    async fn create_video(&self, source_path: &str) -> StorageResult<i32> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                "INSERT INTO videos (source_path) VALUES ($1) RETURNING id",
                &[&source_path],
            )
            .await
            .map_err(pg_err)?;
        Ok(row.get(0))
    }

    async fn get_video(&self, video_id: i32) -> StorageResult<VideoRecord> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                r"
                SELECT id, source_path, duration_seconds, state,
                       total_frames, processed_frames, created_at
                FROM videos WHERE id = $1
                ",
                &[&video_id],
            )
            .await
            .map_err(pg_err)?
            .ok_or(StorageError::NotFound(video_id))?;
        row_to_video(&row)
    }

    async fn set_duration(&self, video_id: i32, duration: f64) -> StorageResult<()> {
        let client = self.client.lock().await;
        let updated = client
            .execute(
                "UPDATE videos SET duration_seconds = $2 WHERE id = $1",
                &[&video_id, &duration],
            )
            .await
            .map_err(pg_err)?;
        if updated == 0 {
            return Err(StorageError::NotFound(video_id));
        }
        Ok(())
    }

    async fn set_total_frames(&self, video_id: i32, total: i32) -> StorageResult<()> {
        let client = self.client.lock().await;
        let updated = client
            .execute(
                "UPDATE videos SET total_frames = $2 WHERE id = $1",
                &[&video_id, &total],
            )
            .await
            .map_err(pg_err)?;
        if updated == 0 {
            return Err(StorageError::NotFound(video_id));
        }
        Ok(())
    }

    async fn set_state(&self, video_id: i32, state: VideoState) -> StorageResult<()> {
        let client = self.client.lock().await;
        let updated = client
            .execute(
                "UPDATE videos SET state = $2 WHERE id = $1",
                &[&video_id, &state.as_str()],
            )
            .await
            .map_err(pg_err)?;
        if updated == 0 {
            return Err(StorageError::NotFound(video_id));
        }
        Ok(())
    }

    async fn commit_frame(
        &self,
        keyframe: &KeyframeRecord,
        tags: &[TagRecord],
    ) -> StorageResult<()> {
        let metadata = serde_json::to_value(&keyframe.metadata)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(pg_err)?;

        tx.execute(
            r"
            INSERT INTO keyframes (video_id, timestamp, thumbnail_path, metadata)
            VALUES ($1, $2, $3, $4)
            ",
            &[
                &keyframe.video_id,
                &keyframe.timestamp,
                &keyframe.thumbnail_path,
                &metadata,
            ],
        )
        .await
        .map_err(pg_err)?;

        for tag in tags {
            tx.execute(
                r"
                INSERT INTO tags (video_id, name, category, timestamp, confidence, ai_generated)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
                &[
                    &tag.video_id,
                    &tag.name,
                    &tag.category.as_str(),
                    &tag.timestamp,
                    &tag.confidence,
                    &tag.ai_generated,
                ],
            )
            .await
            .map_err(pg_err)?;
        }

        let updated = tx
            .execute(
                "UPDATE videos SET processed_frames = processed_frames + 1 WHERE id = $1",
                &[&keyframe.video_id],
            )
            .await
            .map_err(pg_err)?;
        if updated == 0 {
            // Rolls back on drop
            return Err(StorageError::NotFound(keyframe.video_id));
        }

        tx.commit().await.map_err(pg_err)
    }

    async fn get_progress(&self, video_id: i32) -> StorageResult<ProcessingProgress> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT state, total_frames, processed_frames FROM videos WHERE id = $1",
                &[&video_id],
            )
            .await
            .map_err(pg_err)?
            .ok_or(StorageError::NotFound(video_id))?;

        let state: String = row.get(0);
        let state = VideoState::parse(&state)
            .ok_or_else(|| StorageError::Postgres(format!("unknown video state: {state}")))?;
        Ok(ProcessingProgress {
            state,
            total_frames: row.get(1),
            processed_frames: row.get(2),
        })
    }

    async fn get_keyframes(&self, video_id: i32) -> StorageResult<Vec<KeyframeRecord>> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                r"
                SELECT video_id, timestamp, thumbnail_path, metadata
                FROM keyframes WHERE video_id = $1
                ORDER BY timestamp
                ",
                &[&video_id],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_keyframe).collect()
    }

    async fn get_tags(&self, video_id: i32) -> StorageResult<Vec<TagRecord>> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                r"
                SELECT video_id, name, category, timestamp, confidence, ai_generated
                FROM tags WHERE video_id = $1
                ORDER BY timestamp, name
                ",
                &[&video_id],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_tag).collect()
    }

    async fn delete_video(&self, video_id: i32) -> StorageResult<()> {
        let client = self.client.lock().await;
        // keyframes and tags cascade
        client
            .execute("DELETE FROM videos WHERE id = $1", &[&video_id])
            .await
            .map_err(pg_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PostgresConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "framesight".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
        };
        let conn_str = config.connection_string();
        assert!(conn_str.contains("host=localhost"));
        assert!(conn_str.contains("dbname=framesight"));
    }
}
