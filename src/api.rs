//! HTTP surface of the backend.
//!
//! Handlers stay thin: they pull the caller from `X-User-Id`, call into the
//! [`Store`] and map [`AppError`] onto a JSON error body. Signing users in is
//! left to whatever sits in front of this service.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path as AxumPath, State},
    http::{StatusCode, Uri, request::Parts},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::engagement::{
    EngagementSummary, FollowOutcome, FollowSummary, ReactionOutcome, ReactionState, TargetKind,
    ViewOutcome,
};
use crate::error::AppError;
use crate::media_host::{MediaHost, MediaHostResponse};
use crate::playlists::{Playlist, PlaylistWithVideos};
use crate::rpc::USER_ID_HEADER;
use crate::sprites::forward_sprites;
use crate::store::{
    Announcement, Comment, NewUser, Store, User, UserPatch, Video, VideoPatch,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub media: Arc<dyn MediaHost>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    field_errors: BTreeMap<String, Vec<String>>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn field_errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.field_errors
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = match &err {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::MediaHost { .. } | AppError::UploadAborted { .. } => StatusCode::BAD_GATEWAY,
            AppError::Rpc { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {err}");
        }
        Self {
            status,
            message: err.to_string(),
            field_errors: err.field_errors(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = if self.field_errors.is_empty() {
            serde_json::json!({ "error": self.message })
        } else {
            serde_json::json!({ "error": self.message, "fieldErrors": self.field_errors })
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Caller identity taken from the `X-User-Id` header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Viewer(pub Option<String>);

impl Viewer {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self(Some(user_id.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn require(&self) -> ApiResult<&str> {
        self.id()
            .ok_or_else(|| ApiError::unauthorized(format!("{USER_ID_HEADER} header is required")))
    }
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Ok(Self(user_id))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/users/{id}", get(get_user).patch(update_user))
        .route("/api/users/{id}/follow", post(follow_user))
        .route("/api/users/{id}/videos", get(list_user_videos))
        .route("/api/users/{id}/playlists", get(list_user_playlists))
        .route("/api/users/{id}/announcements", get(list_announcements))
        .route("/api/playlists", post(create_playlist))
        .route("/api/playlists/{id}", get(get_playlist).delete(delete_playlist))
        .route(
            "/api/playlists/{id}/videos/{video_id}",
            post(add_playlist_video).delete(remove_playlist_video),
        )
        .route("/api/videos", post(create_video))
        .route(
            "/api/videos/{id}",
            get(get_video).patch(update_video).delete(delete_video),
        )
        .route("/api/videos/{id}/like", post(like_video))
        .route("/api/videos/{id}/dislike", post(dislike_video))
        .route("/api/videos/{id}/view", post(view_video))
        .route(
            "/api/videos/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/api/comments/{id}", delete(delete_comment))
        .route("/api/comments/{id}/like", post(like_comment))
        .route("/api/comments/{id}/dislike", post(dislike_comment))
        .route("/api/announcements", post(create_announcement))
        .route("/api/announcements/{id}/like", post(like_announcement))
        .route("/api/announcements/{id}/dislike", post(dislike_announcement))
        .route("/api/upload/{video_id}", post(upload_sprites))
        .fallback(api_fallback)
        .with_state(state)
}

async fn api_fallback(uri: Uri) -> ApiError {
    ApiError::not_found(format!("endpoint {} not found", uri.path()))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    #[serde(flatten)]
    pub follows: FollowSummary,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoView {
    #[serde(flatten)]
    pub video: Video,
    #[serde(flatten)]
    pub engagement: EngagementSummary,
    pub owner: User,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactedComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub likes: i64,
    pub dislikes: i64,
    pub viewer_reaction: ReactionState,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactedAnnouncement {
    #[serde(flatten)]
    pub announcement: Announcement,
    pub likes: i64,
    pub dislikes: i64,
    pub viewer_reaction: ReactionState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVideoRequest {
    pub video_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlaylistRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommentRequest {
    pub message: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnnouncementRequest {
    pub message: String,
}

async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.store.create_user(&payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<UserProfile>> {
    let user = state.store.require_user(&id).await?;
    let follows = state.store.follow_summary(&id, viewer.id()).await?;
    Ok(Json(UserProfile { user, follows }))
}

async fn update_user(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
    Json(mut patch): Json<UserPatch>,
) -> ApiResult<Json<User>> {
    if viewer.require()? != id {
        return Err(ApiError::forbidden("profiles can only be edited by their owner"));
    }
    patch.id = id;
    Ok(Json(state.store.update_user(&patch).await?))
}

async fn follow_user(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<FollowOutcome>> {
    let follower = viewer.require()?;
    Ok(Json(state.store.toggle_follow(follower, &id).await?))
}

async fn list_user_videos(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<Vec<Video>>> {
    state.store.require_user(&id).await?;
    let own = viewer.id() == Some(id.as_str());
    Ok(Json(state.store.list_user_videos(&id, own).await?))
}

async fn list_user_playlists(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<Vec<Playlist>>> {
    Ok(Json(state.store.list_playlists(&id).await?))
}

async fn create_playlist(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(payload): Json<NewPlaylistRequest>,
) -> ApiResult<(StatusCode, Json<Playlist>)> {
    let owner = viewer.require()?;
    let playlist = state
        .store
        .create_playlist(owner, &payload.title, &payload.description)
        .await?;
    Ok((StatusCode::CREATED, Json(playlist)))
}

async fn get_playlist(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<PlaylistWithVideos>> {
    Ok(Json(state.store.playlist_with_videos(&id).await?))
}

async fn delete_playlist(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<StatusCode> {
    state.store.delete_playlist(viewer.require()?, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_playlist_video(
    State(state): State<AppState>,
    AxumPath((id, video_id)): AxumPath<(String, String)>,
    viewer: Viewer,
) -> ApiResult<Json<PlaylistWithVideos>> {
    let actor = viewer.require()?;
    Ok(Json(
        state.store.add_video_to_playlist(actor, &id, &video_id).await?,
    ))
}

async fn remove_playlist_video(
    State(state): State<AppState>,
    AxumPath((id, video_id)): AxumPath<(String, String)>,
    viewer: Viewer,
) -> ApiResult<Json<PlaylistWithVideos>> {
    let actor = viewer.require()?;
    Ok(Json(
        state
            .store
            .remove_video_from_playlist(actor, &id, &video_id)
            .await?,
    ))
}

async fn create_video(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(payload): Json<NewVideoRequest>,
) -> ApiResult<(StatusCode, Json<Video>)> {
    let owner = viewer.require()?;
    let video = state.store.create_video(owner, &payload.video_url).await?;
    Ok((StatusCode::CREATED, Json(video)))
}

/// Unpublished videos are only visible to their owner; every video-scoped
/// handler answers 404 for them like `get_video` does.
async fn require_visible_video(state: &AppState, id: &str, viewer: &Viewer) -> ApiResult<Video> {
    Ok(state.store.require_visible_video(id, viewer.id()).await?)
}

async fn get_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<VideoView>> {
    let video = require_visible_video(&state, &id, &viewer).await?;
    let engagement = state
        .store
        .engagement_summary(TargetKind::Video, &id, viewer.id())
        .await?;
    let owner = state.store.require_user(&video.user_id).await?;
    Ok(Json(VideoView {
        video,
        engagement,
        owner,
    }))
}

async fn update_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
    Json(mut patch): Json<VideoPatch>,
) -> ApiResult<Json<Video>> {
    let actor = viewer.require()?;
    patch.id = id;
    Ok(Json(state.store.update_video(actor, &patch).await?))
}

async fn delete_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<StatusCode> {
    state.store.delete_video(viewer.require()?, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn react(
    state: &AppState,
    viewer: &Viewer,
    kind: TargetKind,
    id: &str,
    like: bool,
) -> ApiResult<Json<ReactionOutcome>> {
    let user = viewer.require()?;
    match kind {
        TargetKind::Video => {
            require_visible_video(state, id, viewer).await?;
        }
        TargetKind::Comment => {
            if let Some(comment) = state.store.get_comment(id).await? {
                require_visible_video(state, &comment.video_id, viewer).await?;
            }
        }
        TargetKind::Announcement => {}
    }
    let outcome = if like {
        state.store.toggle_like(user, kind, id).await?
    } else {
        state.store.toggle_dislike(user, kind, id).await?
    };
    Ok(Json(outcome))
}

async fn like_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<ReactionOutcome>> {
    react(&state, &viewer, TargetKind::Video, &id, true).await
}

async fn dislike_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<ReactionOutcome>> {
    react(&state, &viewer, TargetKind::Video, &id, false).await
}

async fn view_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<ViewOutcome>> {
    require_visible_video(&state, &id, &viewer).await?;
    Ok(Json(state.store.record_view(&id, viewer.id()).await?))
}

async fn list_comments(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<Vec<ReactedComment>>> {
    require_visible_video(&state, &id, &viewer).await?;
    let comments = state.store.list_comments(&id).await?;
    let mut reacted = Vec::with_capacity(comments.len());
    for comment in comments {
        let summary = state
            .store
            .engagement_summary(TargetKind::Comment, &comment.id, viewer.id())
            .await?;
        reacted.push(ReactedComment {
            comment,
            likes: summary.likes,
            dislikes: summary.dislikes,
            viewer_reaction: summary.viewer_reaction,
        });
    }
    Ok(Json(reacted))
}

async fn create_comment(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
    Json(payload): Json<NewCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let author = viewer.require()?;
    require_visible_video(&state, &id, &viewer).await?;
    let comment = state
        .store
        .create_comment(author, &id, payload.parent_id.as_deref(), &payload.message)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn delete_comment(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<StatusCode> {
    state.store.delete_comment(viewer.require()?, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_comment(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<ReactionOutcome>> {
    react(&state, &viewer, TargetKind::Comment, &id, true).await
}

async fn dislike_comment(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<ReactionOutcome>> {
    react(&state, &viewer, TargetKind::Comment, &id, false).await
}

async fn create_announcement(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(payload): Json<NewAnnouncementRequest>,
) -> ApiResult<(StatusCode, Json<Announcement>)> {
    let author = viewer.require()?;
    let announcement = state
        .store
        .create_announcement(author, &payload.message)
        .await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}

async fn list_announcements(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<Vec<ReactedAnnouncement>>> {
    let announcements = state.store.list_announcements(&id).await?;
    let mut reacted = Vec::with_capacity(announcements.len());
    for announcement in announcements {
        let summary = state
            .store
            .engagement_summary(TargetKind::Announcement, &announcement.id, viewer.id())
            .await?;
        reacted.push(ReactedAnnouncement {
            announcement,
            likes: summary.likes,
            dislikes: summary.dislikes,
            viewer_reaction: summary.viewer_reaction,
        });
    }
    Ok(Json(reacted))
}

async fn like_announcement(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<ReactionOutcome>> {
    react(&state, &viewer, TargetKind::Announcement, &id, true).await
}

async fn dislike_announcement(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    viewer: Viewer,
) -> ApiResult<Json<ReactionOutcome>> {
    react(&state, &viewer, TargetKind::Announcement, &id, false).await
}

/// Upstream media-host failures surface as 500 here, not 502.
async fn upload_sprites(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
    Json(data_urls): Json<Vec<String>>,
) -> ApiResult<Json<Vec<MediaHostResponse>>> {
    match forward_sprites(&state.store, state.media.as_ref(), &video_id, &data_urls).await {
        Ok(results) => Ok(Json(results)),
        Err(err @ (AppError::MediaHost { .. } | AppError::Http(_))) => {
            error!(video_id = %video_id, "sprite upload failed: {err}");
            Err(ApiError::internal(err.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    use crate::error::AppResult;
    use crate::media_host::fake::RecordingHost;
    use crate::playlists::HISTORY_TITLE;
    use crate::rpc::{BackendClient, VideoRpc};
    use crate::store::tests::{create_store, sample_user};

    struct ApiTestContext {
        _temp: tempfile::TempDir,
        host: Arc<RecordingHost>,
        state: AppState,
    }

    impl ApiTestContext {
        async fn new() -> AppResult<Self> {
            Self::with_host(RecordingHost::default()).await
        }

        async fn with_host(host: RecordingHost) -> AppResult<Self> {
            let (temp, store) = create_store().await?;
            let host = Arc::new(host);
            Ok(Self {
                state: AppState {
                    store: Arc::new(store),
                    media: host.clone(),
                },
                host,
                _temp: temp,
            })
        }

        fn store(&self) -> &Store {
            &self.state.store
        }

        async fn published_video(&self, owner: &User) -> AppResult<Video> {
            let video = self.store().create_video(&owner.id, "https://cdn/v.mp4").await?;
            self.store()
                .update_video(
                    &owner.id,
                    &VideoPatch {
                        id: video.id,
                        publish: Some(true),
                        ..Default::default()
                    },
                )
                .await
        }
    }

    async fn body_json(err: ApiError) -> Value {
        let response = err.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn like_toggle_through_handlers() -> AppResult<()> {
        let ctx = ApiTestContext::new().await?;
        let user = sample_user(ctx.store(), "Ada").await?;
        let video = ctx.store().create_video(&user.id, "https://cdn/v.mp4").await?;
        let viewer = Viewer::signed_in(&user.id);

        let Json(liked) = like_video(
            State(ctx.state.clone()),
            AxumPath(video.id.clone()),
            viewer.clone(),
        )
        .await
        .unwrap();
        assert_eq!((liked.state, liked.likes), (ReactionState::Liked, 1));

        let Json(disliked) = dislike_video(
            State(ctx.state.clone()),
            AxumPath(video.id.clone()),
            viewer.clone(),
        )
        .await
        .unwrap();
        assert_eq!((disliked.likes, disliked.dislikes), (0, 1));

        let Json(details) = get_video(State(ctx.state.clone()), AxumPath(video.id.clone()), viewer)
            .await
            .unwrap();
        assert_eq!(details.engagement.dislikes, 1);
        assert_eq!(details.engagement.viewer_reaction, ReactionState::Disliked);
        assert_eq!(details.owner.id, user.id);
        Ok(())
    }

    #[tokio::test]
    async fn anonymous_writes_are_unauthorized() -> AppResult<()> {
        let ctx = ApiTestContext::new().await?;
        let user = sample_user(ctx.store(), "Ada").await?;
        let video = ctx.published_video(&user).await?;

        let err = like_video(
            State(ctx.state.clone()),
            AxumPath(video.id.clone()),
            Viewer::anonymous(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let Json(view) = view_video(State(ctx.state.clone()), AxumPath(video.id.clone()), Viewer::anonymous())
            .await
            .unwrap();
        assert_eq!(view.views, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unpublished_video_is_hidden_from_others() -> AppResult<()> {
        let ctx = ApiTestContext::new().await?;
        let owner = sample_user(ctx.store(), "Ada").await?;
        let video = ctx.store().create_video(&owner.id, "https://cdn/v.mp4").await?;

        let err = get_video(
            State(ctx.state.clone()),
            AxumPath(video.id.clone()),
            Viewer::anonymous(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let ok = get_video(
            State(ctx.state.clone()),
            AxumPath(video.id.clone()),
            Viewer::signed_in(&owner.id),
        )
        .await;
        assert!(ok.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn unpublished_video_is_hidden_from_every_video_handler() -> AppResult<()> {
        let ctx = ApiTestContext::new().await?;
        let owner = sample_user(ctx.store(), "Ada").await?;
        let other = sample_user(ctx.store(), "Bob").await?;
        let video = ctx.store().create_video(&owner.id, "https://cdn/v.mp4").await?;
        let comment = ctx
            .store()
            .create_comment(&owner.id, &video.id, None, "draft notes")
            .await?;
        let playlist = ctx.store().create_playlist(&other.id, "Mix", "").await?;
        let state = || State(ctx.state.clone());
        let id = || AxumPath(video.id.clone());
        let bob = || Viewer::signed_in(&other.id);

        let statuses = [
            view_video(state(), id(), bob()).await.unwrap_err().status(),
            view_video(state(), id(), Viewer::anonymous())
                .await
                .unwrap_err()
                .status(),
            like_video(state(), id(), bob()).await.unwrap_err().status(),
            dislike_video(state(), id(), bob()).await.unwrap_err().status(),
            list_comments(state(), id(), Viewer::anonymous())
                .await
                .unwrap_err()
                .status(),
            create_comment(
                state(),
                id(),
                bob(),
                Json(NewCommentRequest {
                    message: "hi".into(),
                    parent_id: None,
                }),
            )
            .await
            .unwrap_err()
            .status(),
            like_comment(state(), AxumPath(comment.id.clone()), bob())
                .await
                .unwrap_err()
                .status(),
            add_playlist_video(
                state(),
                AxumPath((playlist.id.clone(), video.id.clone())),
                bob(),
            )
            .await
            .unwrap_err()
            .status(),
        ];
        assert!(statuses.iter().all(|status| *status == StatusCode::NOT_FOUND));

        assert_eq!(ctx.store().view_count(&video.id).await?, 0);
        assert_eq!(
            ctx.store().reaction_counts(TargetKind::Video, &video.id).await?,
            (0, 0)
        );
        assert_eq!(ctx.store().list_comments(&video.id).await?.len(), 1);
        assert!(
            ctx.store()
                .list_playlists(&other.id)
                .await?
                .iter()
                .all(|playlist| playlist.title != HISTORY_TITLE)
        );

        let Json(view) = view_video(state(), id(), Viewer::signed_in(&owner.id))
            .await
            .unwrap();
        assert_eq!(view.views, 1);
        Ok(())
    }

    #[tokio::test]
    async fn playlist_title_errors_carry_field_detail() -> AppResult<()> {
        let ctx = ApiTestContext::new().await?;
        let user = sample_user(ctx.store(), "Ada").await?;

        let err = create_playlist(
            State(ctx.state.clone()),
            Viewer::signed_in(&user.id),
            Json(NewPlaylistRequest {
                title: "   ".into(),
                description: String::new(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let body = body_json(err).await;
        assert!(body["fieldErrors"]["title"].is_array());
        assert!(body["error"].as_str().unwrap().contains("title"));
        Ok(())
    }

    #[tokio::test]
    async fn profile_edits_are_owner_only() -> AppResult<()> {
        let ctx = ApiTestContext::new().await?;
        let ada = sample_user(ctx.store(), "Ada").await?;
        let bob = sample_user(ctx.store(), "Bob").await?;

        let err = update_user(
            State(ctx.state.clone()),
            AxumPath(ada.id.clone()),
            Viewer::signed_in(&bob.id),
            Json(UserPatch {
                description: Some("hi".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let Json(updated) = update_user(
            State(ctx.state.clone()),
            AxumPath(ada.id.clone()),
            Viewer::signed_in(&ada.id),
            Json(UserPatch {
                description: Some("hi".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.description.as_deref(), Some("hi"));
        Ok(())
    }

    #[tokio::test]
    async fn sprite_endpoint_status_codes() -> AppResult<()> {
        let ctx = ApiTestContext::with_host(RecordingHost {
            fail_on_data_url: Some(0),
            ..Default::default()
        })
        .await?;
        let user = sample_user(ctx.store(), "Ada").await?;
        let video = ctx.store().create_video(&user.id, "https://cdn/v.mp4").await?;

        let empty = upload_sprites(State(ctx.state.clone()), AxumPath(video.id.clone()), Json(vec![]))
            .await
            .unwrap_err();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let invalid = upload_sprites(
            State(ctx.state.clone()),
            AxumPath(video.id.clone()),
            Json(vec!["not-a-data-url".to_string()]),
        )
        .await
        .unwrap_err();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let missing = upload_sprites(
            State(ctx.state.clone()),
            AxumPath("missing".to_string()),
            Json(vec!["data:image/jpeg;base64,AA".to_string()]),
        )
        .await
        .unwrap_err();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let upstream = upload_sprites(
            State(ctx.state.clone()),
            AxumPath(video.id.clone()),
            Json(vec!["data:image/jpeg;base64,AA".to_string()]),
        )
        .await
        .unwrap_err();
        assert_eq!(upstream.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(ctx.store().require_video(&video.id).await?.sprite_urls.is_empty());
        assert_eq!(ctx.host.recorded_data_urls().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn comments_list_with_counts() -> AppResult<()> {
        let ctx = ApiTestContext::new().await?;
        let ada = sample_user(ctx.store(), "Ada").await?;
        let bob = sample_user(ctx.store(), "Bob").await?;
        let video = ctx.published_video(&ada).await?;

        let (status, Json(comment)) = create_comment(
            State(ctx.state.clone()),
            AxumPath(video.id.clone()),
            Viewer::signed_in(&bob.id),
            Json(NewCommentRequest {
                message: "first".into(),
                parent_id: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        like_comment(
            State(ctx.state.clone()),
            AxumPath(comment.id.clone()),
            Viewer::signed_in(&ada.id),
        )
        .await
        .unwrap();

        let Json(listed) = list_comments(
            State(ctx.state.clone()),
            AxumPath(video.id.clone()),
            Viewer::signed_in(&ada.id),
        )
        .await
        .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].likes, 1);
        assert_eq!(listed[0].viewer_reaction, ReactionState::Liked);
        Ok(())
    }

    #[tokio::test]
    async fn backend_client_round_trip_over_http() -> AppResult<()> {
        let ctx = ApiTestContext::new().await?;
        let ada = sample_user(ctx.store(), "Ada").await?;
        let bob = sample_user(ctx.store(), "Bob").await?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(ctx.state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let base = format!("http://{addr}");
        let client = BackendClient::new(&base, Some(ada.id.clone()), None)?;

        let video = client.create_video("https://cdn/v.mp4").await?;
        assert_eq!(video.user_id, ada.id);
        assert_eq!(client.get_video(&video.id).await?.id, video.id);

        let updated = client
            .update_video(&VideoPatch {
                id: video.id.clone(),
                title: Some("Trip".into()),
                ..Default::default()
            })
            .await?;
        assert_eq!(updated.title, "Trip");

        let like = client.add_like_count(&video.id).await?;
        assert_eq!(like.likes, 1);
        let first = client.add_view_count(&video.id).await?;
        let second = client.add_view_count(&video.id).await?;
        assert_eq!(second.views, 2);
        let history = second.history_playlist_id.clone().unwrap();
        assert_eq!(first.history_playlist_id.as_deref(), Some(history.as_str()));
        let playlist = ctx.store().require_playlist(&history).await?;
        assert_eq!(playlist.title, HISTORY_TITLE);

        let follow = client.add_follow(&bob.id).await?;
        assert_eq!(follow.followers, 1);

        let sprites = client
            .upload_sprites(&video.id, &["data:image/jpeg;base64,AA".to_string()])
            .await?;
        assert_eq!(sprites.len(), 1);

        let user = client.get_user(&ada.id).await?;
        assert_eq!(user.name, ada.name);

        let missing = client.get_video("missing").await.unwrap_err();
        assert!(missing.is_not_found());

        let forbidden = client
            .update_user(&UserPatch {
                id: bob.id.clone(),
                name: Some("Robert".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(forbidden, AppError::Rpc { status: 403, .. }));

        client.delete_video(&video.id).await?;
        assert!(ctx.store().get_video(&video.id).await?.is_none());

        let unknown = reqwest::get(format!("{base}/api/nope")).await?;
        assert_eq!(unknown.status().as_u16(), 404);
        Ok(())
    }
}
