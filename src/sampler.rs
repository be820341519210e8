//! Thumbnail sampler: one still frame every 30 seconds, posted to the sprite
//! endpoint as JPEG data URLs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::rpc::VideoRpc;

pub const SAMPLE_INTERVAL_SECS: u64 = 30;

/// `max(1, ceil(duration / 30))`. Unknown or non-positive durations still
/// produce the single leading frame.
pub fn sample_count(duration_secs: f64) -> usize {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 1;
    }
    let count = (duration_secs / SAMPLE_INTERVAL_SECS as f64).ceil() as usize;
    count.max(1)
}

pub fn sample_timestamps(duration_secs: f64) -> Vec<f64> {
    let upper = if duration_secs.is_finite() {
        duration_secs.max(0.0)
    } else {
        0.0
    };
    (0..sample_count(duration_secs))
        .map(|i| ((i as u64 * SAMPLE_INTERVAL_SECS) as f64).min(upper))
        .collect()
}

pub fn to_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn duration_secs(&self, path: &Path) -> AppResult<f64>;
    async fn frame_jpeg(&self, path: &Path, at_secs: f64) -> AppResult<Vec<u8>>;
}

pub struct FfmpegFrameExtractor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Uses `FFMPEG_PATH` / `FFPROBE_PATH` when set, otherwise the tools on `PATH`.
    pub fn from_env() -> Self {
        let tool = |key: &str, fallback: &str| {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(fallback))
        };
        Self::new(tool("FFMPEG_PATH", "ffmpeg"), tool("FFPROBE_PATH", "ffprobe"))
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn duration_secs(&self, path: &Path) -> AppResult<f64> {
        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(path)
            .output()
            .await
            .with_context(|| format!("running {}", self.ffprobe.display()))?;
        if !output.status.success() {
            return Err(anyhow!(
                "ffprobe failed for {} (status {})",
                path.display(),
                output.status
            )
            .into());
        }
        let raw = String::from_utf8_lossy(&output.stdout);
        let duration = raw
            .trim()
            .parse::<f64>()
            .with_context(|| format!("parsing duration {:?}", raw.trim()))?;
        Ok(duration)
    }

    async fn frame_jpeg(&self, path: &Path, at_secs: f64) -> AppResult<Vec<u8>> {
        let output = Command::new(&self.ffmpeg)
            .arg("-v")
            .arg("error")
            .arg("-ss")
            .arg(format!("{at_secs:.3}"))
            .arg("-i")
            .arg(path)
            .arg("-frames:v")
            .arg("1")
            .arg("-f")
            .arg("image2pipe")
            .arg("-vcodec")
            .arg("mjpeg")
            .arg("-")
            .output()
            .await
            .with_context(|| format!("running {}", self.ffmpeg.display()))?;
        if !output.status.success() || output.stdout.is_empty() {
            return Err(anyhow!(
                "ffmpeg produced no frame at {at_secs}s for {} (status {})",
                path.display(),
                output.status
            )
            .into());
        }
        Ok(output.stdout)
    }
}

pub async fn sample_frames(extractor: &dyn FrameExtractor, path: &Path) -> AppResult<Vec<String>> {
    let duration = extractor.duration_secs(path).await?;
    let timestamps = sample_timestamps(duration);
    debug!(path = %path.display(), duration, frames = timestamps.len(), "sampling frames");

    let mut frames = Vec::with_capacity(timestamps.len());
    for at in timestamps {
        let jpeg = extractor.frame_jpeg(path, at).await?;
        frames.push(to_data_url(&jpeg));
    }
    Ok(frames)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleReport {
    pub video_id: String,
    pub frames: usize,
    pub sprite_urls: Vec<String>,
}

pub async fn run_sampler(
    extractor: &dyn FrameExtractor,
    rpc: &dyn VideoRpc,
    video_id: &str,
    path: &Path,
) -> AppResult<SampleReport> {
    let frames = sample_frames(extractor, path).await?;
    let results = rpc.upload_sprites(video_id, &frames).await?;
    let sprite_urls = results
        .into_iter()
        .filter_map(|result| result.secure_url)
        .collect::<Vec<_>>();
    info!(video_id, frames = frames.len(), "sprite thumbnails uploaded");
    Ok(SampleReport {
        video_id: video_id.to_string(),
        frames: frames.len(),
        sprite_urls,
    })
}

/// Runs the sampler in the background. A failure is logged and yields `None`;
/// the video record stays as it is.
pub fn spawn_sampler(
    extractor: Arc<dyn FrameExtractor>,
    rpc: Arc<dyn VideoRpc>,
    video_id: String,
    path: PathBuf,
) -> JoinHandle<Option<SampleReport>> {
    tokio::spawn(async move {
        match run_sampler(extractor.as_ref(), rpc.as_ref(), &video_id, &path).await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(video_id = %video_id, path = %path.display(), "thumbnail sampling failed: {err}");
                None
            }
        }
    })
}
