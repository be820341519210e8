//! Sequential chunk uploader.
//!
//! Chunks go out strictly one at a time: chunk n+1 is read and sent only
//! after the host acknowledged chunk n. Any failure aborts the remaining
//! sequence. When a [`CheckpointStore`] is attached, every acknowledged chunk
//! is recorded under the upload id so a later run for the same file continues
//! where the previous one stopped.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointStore, UploadCheckpoint, fingerprint};
use crate::chunker::{
    DEFAULT_CHUNK_SIZE, generate_upload_id, plan_chunks, progress_percent, read_chunk, read_head,
};
use crate::error::{AppError, AppResult};
use crate::media_host::{ChunkRequest, MediaHost, MediaHostResponse, UploadIntent, UploadOutcome};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    pub upload_id: String,
    pub chunks_sent: usize,
    pub total_chunks: usize,
    pub percent: u8,
}

#[derive(Clone, Debug)]
pub struct UploadOptions {
    pub intent: UploadIntent,
    pub chunk_size: u64,
    pub request_timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl UploadOptions {
    pub fn new(intent: UploadIntent) -> Self {
        Self {
            intent,
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReport {
    pub upload_id: String,
    pub outcome: UploadOutcome,
    pub total_chunks: usize,
    pub resumed_from: usize,
}

pub struct ChunkedUploader {
    host: Arc<dyn MediaHost>,
    checkpoints: Option<CheckpointStore>,
}

impl ChunkedUploader {
    pub fn new(host: Arc<dyn MediaHost>) -> Self {
        Self {
            host,
            checkpoints: None,
        }
    }

    pub fn with_checkpoints(mut self, checkpoints: CheckpointStore) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub async fn upload_file<F>(
        &self,
        path: &Path,
        options: &UploadOptions,
        mut on_progress: F,
    ) -> AppResult<UploadReport>
    where
        F: FnMut(&UploadProgress),
    {
        let size = tokio::fs::metadata(path).await?.len();
        let chunks = plan_chunks(size, options.chunk_size)?;
        let total = chunks.len();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        let head = read_head(path, options.chunk_size).await?;
        let fingerprint = fingerprint(&head);

        let resumable = match &self.checkpoints {
            Some(store) => {
                store
                    .find_resumable(size, options.chunk_size, &fingerprint, options.intent)
                    .await?
            }
            None => None,
        };
        let (upload_id, start) = match resumable {
            Some(checkpoint) if checkpoint.chunks_sent < total => {
                info!(
                    upload_id = %checkpoint.upload_id,
                    chunks_sent = checkpoint.chunks_sent,
                    total,
                    "resuming upload"
                );
                (checkpoint.upload_id, checkpoint.chunks_sent)
            }
            _ => (generate_upload_id(), 0),
        };

        let mut checkpoint = UploadCheckpoint {
            upload_id: upload_id.clone(),
            path: path.to_path_buf(),
            size,
            chunk_size: options.chunk_size,
            fingerprint,
            chunks_sent: start,
            intent: options.intent,
            updated_at: String::new(),
        };

        let mut file = File::open(path).await?;
        let mut last_response = MediaHostResponse::default();

        for range in &chunks[start..] {
            if options.cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let bytes = read_chunk(&mut file, range).await?;
            let request = ChunkRequest {
                upload_id: upload_id.clone(),
                intent: options.intent,
                range: *range,
                file_name: file_name.clone(),
                bytes,
            };

            let response = tokio::select! {
                _ = options.cancel.cancelled() => return Err(AppError::Cancelled),
                result = send_with_timeout(self.host.as_ref(), request, options.request_timeout) => result,
            };
            last_response = response.map_err(|err| {
                warn!(upload_id = %upload_id, chunk = range.index + 1, total, "chunk failed: {err}");
                AppError::UploadAborted {
                    chunk: range.index + 1,
                    total,
                    source: Box::new(err),
                }
            })?;

            let sent = range.index + 1;
            if sent < total {
                if let Some(store) = &self.checkpoints {
                    checkpoint.chunks_sent = sent;
                    if let Err(err) = store.save(&checkpoint).await {
                        warn!(upload_id = %upload_id, "failed to write upload checkpoint: {err}");
                    }
                }
            }

            let progress = UploadProgress {
                upload_id: upload_id.clone(),
                chunks_sent: sent,
                total_chunks: total,
                percent: progress_percent(sent, total),
            };
            debug!(upload_id = %upload_id, chunk = sent, total, percent = progress.percent, "chunk acknowledged");
            on_progress(&progress);
        }

        let outcome = UploadOutcome::from_final(options.intent, last_response)?;
        if let Some(store) = &self.checkpoints {
            if let Err(err) = store.remove(&upload_id).await {
                warn!(upload_id = %upload_id, "failed to remove upload checkpoint: {err}");
            }
        }
        info!(upload_id = %upload_id, url = outcome.secure_url(), chunks = total, "upload complete");

        Ok(UploadReport {
            upload_id,
            outcome,
            total_chunks: total,
            resumed_from: start,
        })
    }
}

async fn send_with_timeout(
    host: &dyn MediaHost,
    request: ChunkRequest,
    timeout: Option<Duration>,
) -> AppResult<MediaHostResponse> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, host.upload_chunk(request))
            .await
            .map_err(|_| {
                AppError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("chunk request exceeded {}s", limit.as_secs_f64()),
                ))
            })?,
        None => host.upload_chunk(request).await,
    }
}
