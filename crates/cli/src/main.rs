//! Framesight CLI
//!
//! Operator entry point: process a video through the analysis pipeline,
//! inspect progress, and list derived tags.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use framesight_inference::{HttpInferenceClient, InferenceConfig};
use framesight_monitor::MemoryMonitor;
use framesight_pipeline::{PipelineConfig, VideoPipeline};
use framesight_storage::{PostgresConfig, PostgresVideoStore, VideoStore};

#[derive(Parser)]
#[command(
    name = "framesight",
    version,
    about = "Video frame analysis pipeline",
    long_about = "Extract frames from a video with ffmpeg, run each frame through a \
                  four-stage multimodal analysis chain, and persist keyframes and tags \
                  to PostgreSQL.\n\n\
                  Database connection is configured via POSTGRES_HOST, POSTGRES_PORT, \
                  POSTGRES_DB, POSTGRES_USER, and POSTGRES_PASSWORD. The inference \
                  endpoint defaults to FRAMESIGHT_INFERENCE_URL."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a video file end to end
    Process {
        /// Path to the input video
        video: PathBuf,

        /// Override the inference endpoint base URL
        #[arg(long)]
        inference_url: Option<String>,

        /// Analysis batch size before memory-pressure adjustment
        #[arg(long, default_value_t = framesight_pipeline::DEFAULT_BASE_BATCH_SIZE)]
        base_batch_size: usize,
    },

    /// Show processing progress for a video
    Progress {
        /// Video id returned by `process`
        video_id: i32,
    },

    /// List derived tags for a video
    Tags {
        /// Video id returned by `process`
        video_id: i32,
    },

    /// Create database tables
    InitDb,
}

async fn connect_store() -> Result<PostgresVideoStore> {
    PostgresVideoStore::connect(PostgresConfig::default())
        .await
        .context("Failed to connect to PostgreSQL")
}

async fn run_process(
    video: PathBuf,
    inference_url: Option<String>,
    base_batch_size: usize,
) -> Result<()> {
    let store = Arc::new(connect_store().await?);
    store
        .init_schema()
        .await
        .context("Failed to initialize schema")?;

    let mut inference_config = InferenceConfig::default();
    if let Some(url) = inference_url {
        inference_config.endpoint = url;
    }
    let client = HttpInferenceClient::new(inference_config)
        .context("Failed to build inference client")?;

    let video_id = store
        .create_video(&video.to_string_lossy())
        .await
        .context("Failed to register video")?;
    println!("Registered video {video_id}");

    let config = PipelineConfig {
        base_batch_size,
        ..PipelineConfig::default()
    };
    let pipeline = VideoPipeline::new(
        store.clone(),
        Arc::new(client),
        Arc::new(MemoryMonitor::default()),
        config,
    );

    let outcome = pipeline.process(video_id, &video).await;

    let progress = store.get_progress(video_id).await?;
    println!(
        "Video {video_id}: {} ({}/{} frames)",
        progress.state.as_str(),
        progress.processed_frames,
        progress.total_frames
    );

    outcome.map_err(|e| anyhow::anyhow!("Processing failed: {e}"))
}

async fn run_progress(video_id: i32) -> Result<()> {
    let store = connect_store().await?;
    let progress = store
        .get_progress(video_id)
        .await
        .with_context(|| format!("No progress for video {video_id}"))?;
    println!("{}", serde_json::to_string_pretty(&progress)?);
    Ok(())
}

async fn run_tags(video_id: i32) -> Result<()> {
    let store = connect_store().await?;
    let tags = store
        .get_tags(video_id)
        .await
        .with_context(|| format!("No tags for video {video_id}"))?;
    if tags.is_empty() {
        println!("No tags for video {video_id}");
        return Ok(());
    }
    for tag in tags {
        println!(
            "{:>8.2}s  {:<10} {:>3}  {}",
            tag.timestamp,
            tag.category.as_str(),
            tag.confidence,
            tag.name
        );
    }
    Ok(())
}

async fn run_init_db() -> Result<()> {
    let store = connect_store().await?;
    store
        .init_schema()
        .await
        .context("Failed to initialize schema")?;
    println!("Schema initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Process {
            video,
            inference_url,
            base_batch_size,
        } => run_process(video, inference_url, base_batch_size).await,
        Commands::Progress { video_id } => run_progress(video_id).await,
        Commands::Tags { video_id } => run_tags(video_id).await,
        Commands::InitDb => run_init_db().await,
    }
}
