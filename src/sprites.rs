//! Server side of `POST /api/upload/{videoId}`: forwards sampled frames to the
//! media host and appends the resulting URLs to the video's sprite list.

use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::media_host::{MediaHost, MediaHostResponse, UploadIntent};
use crate::store::Store;

pub const DATA_URL_PREFIX: &str = "data:";

pub fn validate_data_urls(data_urls: &[String]) -> AppResult<()> {
    if data_urls.is_empty() {
        return Err(AppError::validation(
            "dataUrls",
            "at least one data URL is required",
        ));
    }
    if let Some(position) = data_urls
        .iter()
        .position(|url| !url.trim_start().starts_with(DATA_URL_PREFIX))
    {
        return Err(AppError::validation(
            "dataUrls",
            format!("entry {position} is not a data URL"),
        ));
    }
    Ok(())
}

/// Uploads every frame in order. Nothing is appended unless all uploads
/// succeed.
pub async fn forward_sprites(
    store: &Store,
    media: &dyn MediaHost,
    video_id: &str,
    data_urls: &[String],
) -> AppResult<Vec<MediaHostResponse>> {
    validate_data_urls(data_urls)?;
    store.require_video(video_id).await?;

    let mut results = Vec::with_capacity(data_urls.len());
    let mut urls = Vec::with_capacity(data_urls.len());
    for (position, data_url) in data_urls.iter().enumerate() {
        let response = media
            .upload_data_url(data_url.trim(), UploadIntent::Image)
            .await
            .inspect_err(|err| {
                warn!(video_id, frame = position, "sprite upload failed: {err}");
            })?;
        let url = response
            .secure_url
            .clone()
            .ok_or_else(|| AppError::MediaHost {
                status: 200,
                body: format!("sprite {position} response carried no secure_url"),
            })?;
        urls.push(url);
        results.push(response);
    }

    let video = store.append_sprite_urls(video_id, &urls).await?;
    info!(
        video_id,
        added = urls.len(),
        total = video.sprite_urls.len(),
        "sprite thumbnails stored"
    );
    Ok(results)
}
