//! The calls the upload pipeline makes against the backend.
//!
//! [`BackendClient`] talks to a running `backend` over HTTP; [`LocalRpc`]
//! runs the same operations in process against a [`Store`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::engagement::{FollowOutcome, ReactionOutcome, TargetKind, ViewOutcome};
use crate::error::{AppError, AppResult};
use crate::media_host::{MediaHost, MediaHostResponse};
use crate::sprites::forward_sprites;
use crate::store::{Store, User, UserPatch, Video, VideoPatch};

pub const USER_ID_HEADER: &str = "X-User-Id";

#[async_trait]
pub trait VideoRpc: Send + Sync {
    async fn create_video(&self, video_url: &str) -> AppResult<Video>;
    async fn get_video(&self, id: &str) -> AppResult<Video>;
    async fn update_video(&self, patch: &VideoPatch) -> AppResult<Video>;
    async fn delete_video(&self, id: &str) -> AppResult<()>;
    async fn get_user(&self, id: &str) -> AppResult<User>;
    async fn update_user(&self, patch: &UserPatch) -> AppResult<User>;
    async fn add_like_count(&self, video_id: &str) -> AppResult<ReactionOutcome>;
    async fn add_dislike_count(&self, video_id: &str) -> AppResult<ReactionOutcome>;
    async fn add_view_count(&self, video_id: &str) -> AppResult<ViewOutcome>;
    async fn add_follow(&self, following_id: &str) -> AppResult<FollowOutcome>;
    async fn upload_sprites(
        &self,
        video_id: &str,
        data_urls: &[String],
    ) -> AppResult<Vec<MediaHostResponse>>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct BackendClient {
    base_url: String,
    user_id: Option<String>,
    client: Client,
}

impl BackendClient {
    pub fn new(
        base_url: &str,
        user_id: Option<String>,
        timeout: Option<Duration>,
    ) -> AppResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id,
            client: builder.build()?,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.user_id {
            Some(user_id) => builder.header(USER_ID_HEADER, user_id),
            None => builder,
        }
    }

    fn require_caller(&self) -> AppResult<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| AppError::Forbidden("a signed-in user is required".to_string()))
    }

    async fn check(response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let raw = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&raw)
            .map(|body| body.error)
            .unwrap_or(raw);
        Err(AppError::Rpc {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> AppResult<T> {
        let response = Self::check(builder.send().await?).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VideoRpc for BackendClient {
    async fn create_video(&self, video_url: &str) -> AppResult<Video> {
        self.require_caller()?;
        self.send_json(
            self.request(Method::POST, "/api/videos")
                .json(&json!({ "videoUrl": video_url })),
        )
        .await
    }

    async fn get_video(&self, id: &str) -> AppResult<Video> {
        self.send_json(self.request(Method::GET, &format!("/api/videos/{id}")))
            .await
    }

    async fn update_video(&self, patch: &VideoPatch) -> AppResult<Video> {
        self.require_caller()?;
        self.send_json(
            self.request(Method::PATCH, &format!("/api/videos/{}", patch.id))
                .json(patch),
        )
        .await
    }

    async fn delete_video(&self, id: &str) -> AppResult<()> {
        self.require_caller()?;
        let response = self
            .request(Method::DELETE, &format!("/api/videos/{id}"))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> AppResult<User> {
        self.send_json(self.request(Method::GET, &format!("/api/users/{id}")))
            .await
    }

    async fn update_user(&self, patch: &UserPatch) -> AppResult<User> {
        self.require_caller()?;
        self.send_json(
            self.request(Method::PATCH, &format!("/api/users/{}", patch.id))
                .json(patch),
        )
        .await
    }

    async fn add_like_count(&self, video_id: &str) -> AppResult<ReactionOutcome> {
        self.require_caller()?;
        self.send_json(self.request(Method::POST, &format!("/api/videos/{video_id}/like")))
            .await
    }

    async fn add_dislike_count(&self, video_id: &str) -> AppResult<ReactionOutcome> {
        self.require_caller()?;
        self.send_json(self.request(Method::POST, &format!("/api/videos/{video_id}/dislike")))
            .await
    }

    async fn add_view_count(&self, video_id: &str) -> AppResult<ViewOutcome> {
        self.send_json(self.request(Method::POST, &format!("/api/videos/{video_id}/view")))
            .await
    }

    async fn add_follow(&self, following_id: &str) -> AppResult<FollowOutcome> {
        self.require_caller()?;
        self.send_json(self.request(Method::POST, &format!("/api/users/{following_id}/follow")))
            .await
    }

    async fn upload_sprites(
        &self,
        video_id: &str,
        data_urls: &[String],
    ) -> AppResult<Vec<MediaHostResponse>> {
        self.send_json(
            self.request(Method::POST, &format!("/api/upload/{video_id}"))
                .json(data_urls),
        )
        .await
    }
}

/// In-process implementation acting as `user_id`.
pub struct LocalRpc {
    store: Arc<Store>,
    media: Arc<dyn MediaHost>,
    user_id: String,
}

impl LocalRpc {
    pub fn new(store: Arc<Store>, media: Arc<dyn MediaHost>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            media,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl VideoRpc for LocalRpc {
    async fn create_video(&self, video_url: &str) -> AppResult<Video> {
        self.store.create_video(&self.user_id, video_url).await
    }

    async fn get_video(&self, id: &str) -> AppResult<Video> {
        self.store.require_visible_video(id, Some(&self.user_id)).await
    }

    async fn update_video(&self, patch: &VideoPatch) -> AppResult<Video> {
        self.store.update_video(&self.user_id, patch).await
    }

    async fn delete_video(&self, id: &str) -> AppResult<()> {
        self.store.delete_video(&self.user_id, id).await
    }

    async fn get_user(&self, id: &str) -> AppResult<User> {
        self.store.require_user(id).await
    }

    async fn update_user(&self, patch: &UserPatch) -> AppResult<User> {
        if patch.id != self.user_id {
            return Err(AppError::Forbidden(
                "profiles can only be edited by their owner".to_string(),
            ));
        }
        self.store.update_user(patch).await
    }

    async fn add_like_count(&self, video_id: &str) -> AppResult<ReactionOutcome> {
        self.store
            .require_visible_video(video_id, Some(&self.user_id))
            .await?;
        self.store
            .toggle_like(&self.user_id, TargetKind::Video, video_id)
            .await
    }

    async fn add_dislike_count(&self, video_id: &str) -> AppResult<ReactionOutcome> {
        self.store
            .require_visible_video(video_id, Some(&self.user_id))
            .await?;
        self.store
            .toggle_dislike(&self.user_id, TargetKind::Video, video_id)
            .await
    }

    async fn add_view_count(&self, video_id: &str) -> AppResult<ViewOutcome> {
        self.store
            .require_visible_video(video_id, Some(&self.user_id))
            .await?;
        self.store.record_view(video_id, Some(&self.user_id)).await
    }

    async fn add_follow(&self, following_id: &str) -> AppResult<FollowOutcome> {
        self.store.toggle_follow(&self.user_id, following_id).await
    }

    async fn upload_sprites(
        &self,
        video_id: &str,
        data_urls: &[String],
    ) -> AppResult<Vec<MediaHostResponse>> {
        forward_sprites(&self.store, self.media.as_ref(), video_id, data_urls).await
    }
}
