//! What happens once the final chunk has been acknowledged.
//!
//! A video upload creates the video record with every other field at its
//! default. Image uploads patch the record they belong to, sending only the
//! fields that differ from the previously loaded copy.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::media_host::{UploadIntent, UploadOutcome};
use crate::rpc::VideoRpc;
use crate::store::{User, UserPatch, Video, VideoPatch};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadTarget {
    NewVideo,
    VideoThumbnail(String),
    UserImage(String),
    UserBackground(String),
}

impl UploadTarget {
    pub fn intent(&self) -> UploadIntent {
        match self {
            Self::NewVideo => UploadIntent::Video,
            _ => UploadIntent::Image,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    VideoCreated(Video),
    VideoUpdated(Video),
    UserUpdated(User),
    Unchanged,
}

/// Editable fields of the details step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    pub publish: bool,
}

fn changed<T: PartialEq + Clone>(before: &T, after: &T) -> Option<T> {
    (before != after).then(|| after.clone())
}

impl VideoPatch {
    pub fn diff(previous: &Video, desired: &Video) -> Self {
        Self {
            id: previous.id.clone(),
            title: changed(&previous.title, &desired.title),
            description: changed(&previous.description, &desired.description),
            thumbnail_url: changed(&previous.thumbnail_url, &desired.thumbnail_url),
            publish: changed(&previous.publish, &desired.publish),
        }
    }
}

impl UserPatch {
    pub fn diff(previous: &User, desired: &User) -> Self {
        Self {
            id: previous.id.clone(),
            name: changed(&previous.name, &desired.name),
            handle: changed(&previous.handle, &desired.handle).flatten(),
            email: changed(&previous.email, &desired.email).flatten(),
            image: changed(&previous.image, &desired.image).flatten(),
            background_image: changed(&previous.background_image, &desired.background_image)
                .flatten(),
            description: changed(&previous.description, &desired.description).flatten(),
        }
    }
}

pub async fn complete_upload(
    rpc: &dyn VideoRpc,
    outcome: &UploadOutcome,
    target: &UploadTarget,
) -> AppResult<Completion> {
    if outcome.intent() != target.intent() {
        return Err(AppError::validation(
            "intent",
            format!(
                "a {} upload cannot complete a {} target",
                outcome.intent().resource_type(),
                target.intent().resource_type()
            ),
        ));
    }
    let url = outcome.secure_url();

    match target {
        UploadTarget::NewVideo => {
            let video = rpc.create_video(url).await?;
            info!(video_id = %video.id, url, "video record created");
            Ok(Completion::VideoCreated(video))
        }
        UploadTarget::VideoThumbnail(video_id) => {
            let previous = rpc.get_video(video_id).await?;
            let mut desired = previous.clone();
            desired.thumbnail_url = url.to_string();
            let patch = VideoPatch::diff(&previous, &desired);
            if patch.is_empty() {
                return Ok(Completion::Unchanged);
            }
            let video = rpc.update_video(&patch).await?;
            info!(video_id = %video.id, url, "video thumbnail updated");
            Ok(Completion::VideoUpdated(video))
        }
        UploadTarget::UserImage(user_id) | UploadTarget::UserBackground(user_id) => {
            let previous = rpc.get_user(user_id).await?;
            let mut desired = previous.clone();
            if matches!(target, UploadTarget::UserImage(_)) {
                desired.image = Some(url.to_string());
            } else {
                desired.background_image = Some(url.to_string());
            }
            let patch = UserPatch::diff(&previous, &desired);
            if patch.is_empty() {
                return Ok(Completion::Unchanged);
            }
            let user = rpc.update_user(&patch).await?;
            info!(user_id = %user.id, url, "profile image updated");
            Ok(Completion::UserUpdated(user))
        }
    }
}

/// Writes the details step for `previous`. Returns `previous` untouched
/// without calling the backend when nothing changed.
pub async fn apply_video_details(
    rpc: &dyn VideoRpc,
    previous: &Video,
    details: &VideoDetails,
) -> AppResult<Video> {
    let mut desired = previous.clone();
    desired.title = details.title.clone();
    desired.description = details.description.clone();
    if let Some(thumbnail_url) = &details.thumbnail_url {
        desired.thumbnail_url = thumbnail_url.clone();
    }
    desired.publish = details.publish;

    let patch = VideoPatch::diff(previous, &desired);
    if patch.is_empty() {
        return Ok(previous.clone());
    }
    rpc.update_video(&patch).await
}
