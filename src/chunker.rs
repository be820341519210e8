//! Splits a local file into consecutive byte ranges for chunked upload.

use std::io::SeekFrom;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{AppError, AppResult};

pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// One half-open range `[start, end)` of a file of `total` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub index: usize,
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_last(&self) -> bool {
        self.end == self.total
    }

    /// Value of the `Content-Range` header for this chunk.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end - 1, self.total)
    }
}

pub fn plan_chunks(total: u64, chunk_size: u64) -> AppResult<Vec<ChunkRange>> {
    if chunk_size == 0 {
        return Err(AppError::validation("chunkSize", "must be greater than zero"));
    }
    if total == 0 {
        return Err(AppError::validation("file", "file is empty"));
    }

    let count = total.div_ceil(chunk_size);
    let ranges = (0..count)
        .map(|index| {
            let start = index * chunk_size;
            ChunkRange {
                index: index as usize,
                start,
                end: (start + chunk_size).min(total),
                total,
            }
        })
        .collect();
    Ok(ranges)
}

/// Timestamp token shared by every chunk of one upload.
pub fn generate_upload_id() -> String {
    format!("uqid-{}", Utc::now().timestamp_millis())
}

pub fn progress_percent(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (sent as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

pub async fn read_chunk(file: &mut File, range: &ChunkRange) -> AppResult<Vec<u8>> {
    file.seek(SeekFrom::Start(range.start)).await?;
    let mut buffer = vec![0u8; range.len() as usize];
    file.read_exact(&mut buffer).await?;
    Ok(buffer)
}

/// Reads the first `chunk_size` bytes (or the whole file if shorter).
pub async fn read_head(path: &Path, chunk_size: u64) -> AppResult<Vec<u8>> {
    let mut file = File::open(path).await?;
    let mut buffer = Vec::new();
    (&mut file).take(chunk_size).read_to_end(&mut buffer).await?;
    Ok(buffer)
}
