#![forbid(unsafe_code)]

//! Chunked upload pipeline: split the file, stream it to the media host,
//! record the result through the backend, then sample sprite thumbnails.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vidhub::checkpoint::CheckpointStore;
use vidhub::chunker::DEFAULT_CHUNK_SIZE;
use vidhub::completion::{Completion, UploadTarget, complete_upload};
use vidhub::config::{RuntimeOverrides, resolve_runtime_config};
use vidhub::media_host::HttpMediaHost;
use vidhub::rpc::{BackendClient, VideoRpc};
use vidhub::sampler::{FfmpegFrameExtractor, FrameExtractor, spawn_sampler};
use vidhub::uploader::{ChunkedUploader, UploadOptions};

#[derive(Parser, Debug)]
#[command(name = "upload")]
#[command(about = "Upload a video or image to the media host and record it in vidhub")]
struct Cli {
    /// File to upload
    file: PathBuf,

    /// Id of the user the upload belongs to
    #[arg(long)]
    user: String,

    /// Bytes per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,

    /// Upload an image and set it as this video's thumbnail
    #[arg(long, value_name = "VIDEO_ID", conflicts_with_all = ["avatar", "background"])]
    image_for_video: Option<String>,

    /// Upload an image and set it as the user's profile image
    #[arg(long, conflicts_with = "background")]
    avatar: bool,

    /// Upload an image and set it as the user's background image
    #[arg(long)]
    background: bool,

    /// Skip sprite thumbnail sampling after a video upload
    #[arg(long)]
    no_sprites: bool,

    /// Backend base URL (defaults to VIDHUB_BACKEND_URL)
    #[arg(long)]
    backend: Option<String>,
}

impl Cli {
    fn target(&self) -> UploadTarget {
        if let Some(video_id) = &self.image_for_video {
            UploadTarget::VideoThumbnail(video_id.clone())
        } else if self.avatar {
            UploadTarget::UserImage(self.user.clone())
        } else if self.background {
            UploadTarget::UserBackground(self.user.clone())
        } else {
            UploadTarget::NewVideo
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadSummary {
    upload_id: String,
    url: String,
    resumed_from: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sprites: Option<usize>,
    changed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_runtime_config(RuntimeOverrides {
        backend_url: cli.backend.clone(),
        ..RuntimeOverrides::default()
    })?;

    let host = HttpMediaHost::new(config.media_host.clone(), config.request_timeout)
        .context("building media host client")?;
    let rpc: Arc<dyn VideoRpc> = Arc::new(
        BackendClient::new(&config.backend_url, Some(cli.user.clone()), config.request_timeout)
            .context("building backend client")?,
    );
    let uploader = ChunkedUploader::new(Arc::new(host))
        .with_checkpoints(CheckpointStore::new(&config.checkpoint_dir));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("interrupted; the upload can be resumed by running the same command again");
            on_interrupt.cancel();
        }
    });

    let options = UploadOptions {
        intent: cli.target().intent(),
        chunk_size: cli.chunk_size,
        request_timeout: config.request_timeout,
        cancel,
    };
    let extractor: Arc<dyn FrameExtractor> = Arc::new(FfmpegFrameExtractor::from_env());

    let summary = run_pipeline(&cli, &uploader, &options, rpc, extractor).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_pipeline(
    cli: &Cli,
    uploader: &ChunkedUploader,
    options: &UploadOptions,
    rpc: Arc<dyn VideoRpc>,
    extractor: Arc<dyn FrameExtractor>,
) -> Result<UploadSummary> {
    let target = cli.target();
    let report = uploader
        .upload_file(&cli.file, options, |progress| {
            info!(
                upload_id = %progress.upload_id,
                chunk = progress.chunks_sent,
                total = progress.total_chunks,
                "Uploading... {}%",
                progress.percent
            );
        })
        .await
        .with_context(|| format!("uploading {}", cli.file.display()))?;

    let completion = complete_upload(rpc.as_ref(), &report.outcome, &target)
        .await
        .context("recording the upload")?;

    let mut summary = UploadSummary {
        upload_id: report.upload_id.clone(),
        url: report.outcome.secure_url().to_string(),
        resumed_from: report.resumed_from,
        video_id: None,
        sprites: None,
        changed: !matches!(completion, Completion::Unchanged),
    };

    match completion {
        Completion::VideoCreated(video) => {
            summary.video_id = Some(video.id.clone());
            if !cli.no_sprites {
                let handle = spawn_sampler(extractor, rpc, video.id.clone(), cli.file.clone());
                match handle.await {
                    Ok(Some(sampled)) => summary.sprites = Some(sampled.sprite_urls.len()),
                    Ok(None) => warn!(video_id = %video.id, "video saved without sprite thumbnails"),
                    Err(err) => warn!(video_id = %video.id, "sampler task failed: {err}"),
                }
            }
        }
        Completion::VideoUpdated(video) => summary.video_id = Some(video.id),
        Completion::UserUpdated(_) | Completion::Unchanged => {}
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    use async_trait::async_trait;
    use tempfile::{NamedTempFile, TempDir, tempdir};
    use vidhub::error::{AppError, AppResult};
    use vidhub::media_host::{ChunkRequest, MediaHost, MediaHostResponse, UploadIntent};
    use vidhub::rpc::LocalRpc;
    use vidhub::store::{NewUser, Store, User};

    struct LastChunkHost;

    #[async_trait]
    impl MediaHost for LastChunkHost {
        async fn upload_chunk(&self, request: ChunkRequest) -> AppResult<MediaHostResponse> {
            Ok(MediaHostResponse {
                secure_url: request
                    .range
                    .is_last()
                    .then(|| format!("https://cdn.test/{}", request.upload_id)),
                ..Default::default()
            })
        }

        async fn upload_data_url(
            &self,
            _data_url: &str,
            _intent: UploadIntent,
        ) -> AppResult<MediaHostResponse> {
            Ok(MediaHostResponse {
                secure_url: Some("https://cdn.test/sprite.jpg".to_string()),
                ..Default::default()
            })
        }
    }

    struct FixedExtractor {
        duration: Option<f64>,
    }

    #[async_trait]
    impl FrameExtractor for FixedExtractor {
        async fn duration_secs(&self, _path: &Path) -> AppResult<f64> {
            self.duration
                .ok_or_else(|| AppError::Other(anyhow::anyhow!("not a video")))
        }

        async fn frame_jpeg(&self, _path: &Path, _at_secs: f64) -> AppResult<Vec<u8>> {
            Ok(b"jpeg".to_vec())
        }
    }

    struct PipelineContext {
        _dir: TempDir,
        file: NamedTempFile,
        store: Arc<Store>,
        user: User,
    }

    impl PipelineContext {
        async fn new() -> Self {
            let dir = tempdir().unwrap();
            let store = Store::open(&dir.path().join("vidhub.db")).await.unwrap();
            let user = store
                .create_user(&NewUser {
                    name: "Ada".into(),
                    ..Default::default()
                })
                .await
                .unwrap();
            let mut file = NamedTempFile::new().unwrap();
            file.write_all(&vec![7u8; 25]).unwrap();
            Self {
                _dir: dir,
                file,
                store: Arc::new(store),
                user,
            }
        }

        fn cli(&self, extra: &[&str]) -> Cli {
            let mut argv = vec![
                "upload".to_string(),
                self.file.path().display().to_string(),
                "--user".to_string(),
                self.user.id.clone(),
                "--chunk-size".to_string(),
                "10".to_string(),
            ];
            argv.extend(extra.iter().map(|value| value.to_string()));
            Cli::try_parse_from(argv).unwrap()
        }

        fn rpc(&self) -> Arc<dyn VideoRpc> {
            Arc::new(LocalRpc::new(
                self.store.clone(),
                Arc::new(LastChunkHost),
                self.user.id.clone(),
            ))
        }

        fn options(&self, cli: &Cli) -> UploadOptions {
            UploadOptions {
                chunk_size: cli.chunk_size,
                ..UploadOptions::new(cli.target().intent())
            }
        }
    }

    #[test]
    fn flags_select_the_target() {
        let base = ["upload", "clip.mp4", "--user", "u1"];
        let parse = |extra: &[&str]| {
            let argv: Vec<&str> = base.iter().chain(extra.iter()).copied().collect();
            Cli::try_parse_from(argv)
        };
        assert_eq!(parse(&[]).unwrap().target(), UploadTarget::NewVideo);
        assert_eq!(parse(&[]).unwrap().chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(
            parse(&["--image-for-video", "v1"]).unwrap().target(),
            UploadTarget::VideoThumbnail("v1".into())
        );
        assert_eq!(
            parse(&["--avatar"]).unwrap().target(),
            UploadTarget::UserImage("u1".into())
        );
        assert_eq!(
            parse(&["--background"]).unwrap().target(),
            UploadTarget::UserBackground("u1".into())
        );
        assert!(parse(&["--avatar", "--background"]).is_err());
        assert!(parse(&["--avatar", "--image-for-video", "v1"]).is_err());
    }

    #[tokio::test]
    async fn video_upload_creates_record_and_sprites() {
        let ctx = PipelineContext::new().await;
        let cli = ctx.cli(&[]);
        let uploader = ChunkedUploader::new(Arc::new(LastChunkHost));
        let extractor = Arc::new(FixedExtractor {
            duration: Some(75.0),
        });

        let summary = run_pipeline(&cli, &uploader, &ctx.options(&cli), ctx.rpc(), extractor)
            .await
            .unwrap();
        assert_eq!(summary.sprites, Some(3));
        assert!(summary.changed);

        let video_id = summary.video_id.unwrap();
        let video = ctx.store.require_video(&video_id).await.unwrap();
        assert_eq!(video.video_url, summary.url);
        assert_eq!(video.sprite_urls.len(), 3);
        assert_eq!(video.title, "Untitled");
    }

    #[tokio::test]
    async fn sampler_failure_keeps_the_video() {
        let ctx = PipelineContext::new().await;
        let cli = ctx.cli(&[]);
        let uploader = ChunkedUploader::new(Arc::new(LastChunkHost));
        let extractor = Arc::new(FixedExtractor { duration: None });

        let summary = run_pipeline(&cli, &uploader, &ctx.options(&cli), ctx.rpc(), extractor)
            .await
            .unwrap();
        assert!(summary.sprites.is_none());
        let video = ctx
            .store
            .require_video(summary.video_id.as_deref().unwrap())
            .await
            .unwrap();
        assert!(video.sprite_urls.is_empty());
    }

    #[tokio::test]
    async fn avatar_upload_patches_the_profile() {
        let ctx = PipelineContext::new().await;
        let cli = ctx.cli(&["--avatar"]);
        let uploader = ChunkedUploader::new(Arc::new(LastChunkHost));
        let extractor = Arc::new(FixedExtractor { duration: None });

        let summary = run_pipeline(&cli, &uploader, &ctx.options(&cli), ctx.rpc(), extractor)
            .await
            .unwrap();
        assert!(summary.video_id.is_none());
        let user = ctx.store.require_user(&ctx.user.id).await.unwrap();
        assert_eq!(user.image.as_deref(), Some(summary.url.as_str()));
    }
}
