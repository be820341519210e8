//! Resume checkpoints for chunked uploads, one JSON file per upload id.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::AppResult;
use crate::media_host::UploadIntent;
use crate::store::now_timestamp;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCheckpoint {
    pub upload_id: String,
    pub path: PathBuf,
    pub size: u64,
    pub chunk_size: u64,
    /// blake3 of the first chunk; guards against a different file at the same size.
    pub fingerprint: String,
    pub chunks_sent: usize,
    pub intent: UploadIntent,
    pub updated_at: String,
}

impl UploadCheckpoint {
    pub fn matches(&self, size: u64, chunk_size: u64, fingerprint: &str, intent: UploadIntent) -> bool {
        self.size == size
            && self.chunk_size == chunk_size
            && self.fingerprint == fingerprint
            && self.intent == intent
    }
}

pub fn fingerprint(head: &[u8]) -> String {
    blake3::hash(head).to_hex().to_string()
}

#[derive(Clone, Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, upload_id: &str) -> PathBuf {
        self.dir.join(format!("{upload_id}.json"))
    }

    pub async fn save(&self, checkpoint: &UploadCheckpoint) -> AppResult<()> {
        let mut checkpoint = checkpoint.clone();
        checkpoint.updated_at = now_timestamp();
        write_json_atomic(&self.path_for(&checkpoint.upload_id), &checkpoint).await
    }

    pub async fn load(&self, upload_id: &str) -> AppResult<Option<UploadCheckpoint>> {
        let path = self.path_for(upload_id);
        match tokio::fs::read(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Most recently updated checkpoint for the same file contents, if any.
    /// Unreadable files are skipped. The directory scan runs on the blocking
    /// pool.
    pub async fn find_resumable(
        &self,
        size: u64,
        chunk_size: u64,
        fingerprint: &str,
        intent: UploadIntent,
    ) -> AppResult<Option<UploadCheckpoint>> {
        let dir = self.dir.clone();
        let fingerprint = fingerprint.to_string();
        let found = tokio::task::spawn_blocking(move || {
            scan_resumable(&dir, size, chunk_size, &fingerprint, intent)
        })
        .await
        .context("checkpoint scan task failed")?;
        Ok(found)
    }

    pub async fn remove(&self, upload_id: &str) -> AppResult<()> {
        match tokio::fs::remove_file(self.path_for(upload_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn scan_resumable(
    dir: &Path,
    size: u64,
    chunk_size: u64,
    fingerprint: &str,
    intent: UploadIntent,
) -> Option<UploadCheckpoint> {
    if !dir.is_dir() {
        return None;
    }
    WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("json"))
            .filter_map(|entry| {
                let raw = std::fs::read(entry.path()).ok()?;
                match serde_json::from_slice::<UploadCheckpoint>(&raw) {
                    Ok(checkpoint) => Some(checkpoint),
                    Err(err) => {
                        warn!(path = %entry.path().display(), "ignoring unreadable checkpoint: {err}");
                        None
                    }
                }
            })
            .filter(|checkpoint| checkpoint.matches(size, chunk_size, fingerprint, intent))
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at))
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    let payload = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(&tmp_path, payload).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn checkpoint(upload_id: &str, chunks_sent: usize) -> UploadCheckpoint {
        UploadCheckpoint {
            upload_id: upload_id.to_string(),
            path: PathBuf::from("/videos/clip.mp4"),
            size: 100,
            chunk_size: 10,
            fingerprint: fingerprint(b"0123456789"),
            chunks_sent,
            intent: UploadIntent::Video,
            updated_at: String::new(),
        }
    }

    #[tokio::test]
    async fn save_load_and_remove() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("uploads"));
        store.save(&checkpoint("uqid-1", 3)).await.unwrap();

        let loaded = store.load("uqid-1").await.unwrap().unwrap();
        assert_eq!(loaded.chunks_sent, 3);
        assert!(!loaded.updated_at.is_empty());
        assert!(!store.dir().join("uqid-1.tmp").exists());

        store.remove("uqid-1").await.unwrap();
        assert!(store.load("uqid-1").await.unwrap().is_none());
        store.remove("uqid-1").await.unwrap();
    }

    #[tokio::test]
    async fn finds_only_matching_checkpoints() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(&checkpoint("uqid-1", 2)).await.unwrap();
        let mut image = checkpoint("uqid-2", 4);
        image.intent = UploadIntent::Image;
        store.save(&image).await.unwrap();
        std::fs::write(dir.path().join("garbage.json"), b"{not json").unwrap();

        let fp = fingerprint(b"0123456789");
        let lookup = |size, chunk_size, fp: String, intent| {
            let store = store.clone();
            async move { store.find_resumable(size, chunk_size, &fp, intent).await.unwrap() }
        };
        let found = lookup(100, 10, fp.clone(), UploadIntent::Video).await.unwrap();
        assert_eq!(found.upload_id, "uqid-1");

        assert!(lookup(100, 20, fp.clone(), UploadIntent::Video).await.is_none());
        assert!(lookup(101, 10, fp.clone(), UploadIntent::Video).await.is_none());
        assert!(
            lookup(100, 10, fingerprint(b"other"), UploadIntent::Video)
                .await
                .is_none()
        );
        assert_eq!(
            lookup(100, 10, fp, UploadIntent::Image)
                .await
                .unwrap()
                .upload_id,
            "uqid-2"
        );
    }

    #[tokio::test]
    async fn missing_directory_has_nothing_to_resume() {
        let store = CheckpointStore::new("/nonexistent/vidhub/checkpoints");
        assert!(
            store
                .find_resumable(1, 1, "x", UploadIntent::Video)
                .await
                .unwrap()
                .is_none()
        );
    }
}
