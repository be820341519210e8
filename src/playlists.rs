//! User playlists, including the implicit "Liked Videos" and "History" lists.
//!
//! Well-known playlists are obtained through an idempotent upsert keyed on
//! `(user_id, title)`; the UNIQUE constraint does the deduplication, so two
//! concurrent first-likes cannot create two "Liked Videos" playlists.

use libsql::{Connection, Row, params};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::store::{Store, Video, new_id, now_timestamp, row_to_video};

pub const LIKED_VIDEOS_TITLE: &str = "Liked Videos";
pub const HISTORY_TITLE: &str = "History";
const MAX_TITLE_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistWithVideos {
    #[serde(flatten)]
    pub playlist: Playlist,
    pub videos: Vec<Video>,
}

pub fn is_well_known_title(title: &str) -> bool {
    title == LIKED_VIDEOS_TITLE || title == HISTORY_TITLE
}

/// Validates a user-supplied playlist title. Errors carry the `title` field
/// so forms can show them inline.
pub fn validate_title(raw: &str) -> AppResult<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(AppError::validation("title", "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::validation(
            "title",
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    if is_well_known_title(title) {
        return Err(AppError::validation("title", "is reserved"));
    }
    Ok(title.to_string())
}

/// Returns the id of the user's playlist called `title`, creating it first if
/// needed. Safe to call inside an open transaction.
pub(crate) async fn upsert_well_known(
    conn: &Connection,
    user_id: &str,
    title: &str,
) -> AppResult<String> {
    conn.execute(
        r#"
        INSERT INTO playlists (id, user_id, title, description, created_at)
        VALUES (?1, ?2, ?3, '', ?4)
        ON CONFLICT(user_id, title) DO NOTHING
        "#,
        params![new_id(), user_id, title, now_timestamp()],
    )
    .await?;

    let mut rows = conn
        .query(
            "SELECT id FROM playlists WHERE user_id = ?1 AND title = ?2",
            params![user_id, title],
        )
        .await?;
    let row = rows
        .next()
        .await?
        .ok_or_else(|| AppError::not_found(format!("playlist {title}")))?;
    Ok(row.get(0)?)
}

/// Appends a membership row unconditionally; History relies on this to keep
/// one entry per view.
pub(crate) async fn insert_membership(
    conn: &Connection,
    playlist_id: &str,
    video_id: &str,
) -> AppResult<()> {
    conn.execute(
        r#"
        INSERT INTO playlist_videos (playlist_id, video_id, created_at)
        VALUES (?1, ?2, ?3)
        "#,
        params![playlist_id, video_id, now_timestamp()],
    )
    .await?;
    Ok(())
}

/// Appends a membership row unless the video is already in the playlist.
/// Returns whether a row was written.
pub(crate) async fn insert_membership_once(
    conn: &Connection,
    playlist_id: &str,
    video_id: &str,
) -> AppResult<bool> {
    let written = conn
        .execute(
            r#"
            INSERT INTO playlist_videos (playlist_id, video_id, created_at)
            SELECT ?1, ?2, ?3
            WHERE NOT EXISTS (
                SELECT 1 FROM playlist_videos WHERE playlist_id = ?1 AND video_id = ?2
            )
            "#,
            params![playlist_id, video_id, now_timestamp()],
        )
        .await?;
    Ok(written > 0)
}

pub(crate) async fn remove_membership(
    conn: &Connection,
    playlist_id: &str,
    video_id: &str,
) -> AppResult<u64> {
    Ok(conn
        .execute(
            "DELETE FROM playlist_videos WHERE playlist_id = ?1 AND video_id = ?2",
            params![playlist_id, video_id],
        )
        .await?)
}

impl Store {
    pub async fn create_playlist(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
    ) -> AppResult<Playlist> {
        let title = validate_title(title)?;
        let _guard = self.write_guard().await;
        self.require_user(user_id).await?;
        let id = new_id();
        self.conn()
            .execute(
                r#"
                INSERT INTO playlists (id, user_id, title, description, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    id.as_str(),
                    user_id,
                    title.as_str(),
                    description.trim(),
                    now_timestamp()
                ],
            )
            .await
            .map_err(|err| {
                if err.to_string().contains("UNIQUE constraint failed") {
                    AppError::validation("title", "a playlist with this title already exists")
                } else {
                    AppError::Database(err)
                }
            })?;
        self.require_playlist(&id).await
    }

    /// Get-or-create for "Liked Videos" / "History".
    pub async fn ensure_well_known_playlist(&self, user_id: &str, title: &str) -> AppResult<Playlist> {
        if !is_well_known_title(title) {
            return Err(AppError::validation("title", "is not a well-known playlist"));
        }
        let _guard = self.write_guard().await;
        self.require_user(user_id).await?;
        let id = upsert_well_known(self.conn(), user_id, title).await?;
        self.require_playlist(&id).await
    }

    pub async fn get_playlist(&self, id: &str) -> AppResult<Option<Playlist>> {
        let mut rows = self
            .conn()
            .query(
                r#"
                SELECT id, user_id, title, description, created_at
                FROM playlists
                WHERE id = ?1
                "#,
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_playlist(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn require_playlist(&self, id: &str) -> AppResult<Playlist> {
        self.get_playlist(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("playlist {id}")))
    }

    pub async fn list_playlists(&self, user_id: &str) -> AppResult<Vec<Playlist>> {
        self.require_user(user_id).await?;
        let mut rows = self
            .conn()
            .query(
                r#"
                SELECT id, user_id, title, description, created_at
                FROM playlists
                WHERE user_id = ?1
                ORDER BY created_at ASC, rowid ASC
                "#,
                [user_id],
            )
            .await?;
        let mut playlists = Vec::new();
        while let Some(row) = rows.next().await? {
            playlists.push(row_to_playlist(&row)?);
        }
        Ok(playlists)
    }

    /// Playlist contents in insertion order. History may list a video once
    /// per view.
    pub async fn playlist_with_videos(&self, id: &str) -> AppResult<PlaylistWithVideos> {
        let playlist = self.require_playlist(id).await?;
        let mut rows = self
            .conn()
            .query(
                r#"
                SELECT v.id, v.user_id, v.title, v.description, v.thumbnail_url, v.video_url,
                       v.sprite_urls_json, v.publish, v.created_at
                FROM playlist_videos pv
                JOIN videos v ON v.id = pv.video_id
                WHERE pv.playlist_id = ?1
                ORDER BY pv.id ASC
                "#,
                [id],
            )
            .await?;
        let mut videos = Vec::new();
        while let Some(row) = rows.next().await? {
            videos.push(row_to_video(&row)?);
        }
        Ok(PlaylistWithVideos { playlist, videos })
    }

    pub async fn membership_count(&self, playlist_id: &str, video_id: &str) -> AppResult<i64> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM playlist_videos WHERE playlist_id = ?1 AND video_id = ?2",
                params![playlist_id, video_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    /// Manual adds are refused on both well-known playlists: "Liked Videos"
    /// follows the like state and "History" follows recorded views.
    pub async fn add_video_to_playlist(
        &self,
        actor_id: &str,
        playlist_id: &str,
        video_id: &str,
    ) -> AppResult<PlaylistWithVideos> {
        {
            let _guard = self.write_guard().await;
            let playlist = self.require_owned_playlist(actor_id, playlist_id).await?;
            if is_well_known_title(&playlist.title) {
                return Err(AppError::validation(
                    "title",
                    format!("videos cannot be added to \"{}\" by hand", playlist.title),
                ));
            }
            self.require_visible_video(video_id, Some(actor_id)).await?;
            insert_membership_once(self.conn(), playlist_id, video_id).await?;
        }
        self.playlist_with_videos(playlist_id).await
    }

    pub async fn remove_video_from_playlist(
        &self,
        actor_id: &str,
        playlist_id: &str,
        video_id: &str,
    ) -> AppResult<PlaylistWithVideos> {
        {
            let _guard = self.write_guard().await;
            let playlist = self.require_owned_playlist(actor_id, playlist_id).await?;
            reject_liked_videos_edit(&playlist)?;
            let removed = remove_membership(self.conn(), playlist_id, video_id).await?;
            if removed == 0 {
                return Err(AppError::not_found(format!(
                    "video {video_id} in playlist {playlist_id}"
                )));
            }
        }
        self.playlist_with_videos(playlist_id).await
    }

    /// History can be cleared entry by entry or dropped entirely; the next
    /// view recreates it. "Liked Videos" cannot.
    pub async fn delete_playlist(&self, actor_id: &str, playlist_id: &str) -> AppResult<()> {
        let _guard = self.write_guard().await;
        let playlist = self.require_owned_playlist(actor_id, playlist_id).await?;
        reject_liked_videos_edit(&playlist)?;
        self.conn()
            .execute("DELETE FROM playlists WHERE id = ?1", [playlist_id])
            .await?;
        Ok(())
    }

    async fn require_owned_playlist(&self, actor_id: &str, playlist_id: &str) -> AppResult<Playlist> {
        let playlist = self.require_playlist(playlist_id).await?;
        if playlist.user_id != actor_id {
            return Err(AppError::Forbidden(format!(
                "playlist {playlist_id} belongs to another user"
            )));
        }
        Ok(playlist)
    }
}

/// "Liked Videos" membership moves only with the like row.
fn reject_liked_videos_edit(playlist: &Playlist) -> AppResult<()> {
    if playlist.title == LIKED_VIDEOS_TITLE {
        return Err(AppError::validation(
            "title",
            "\"Liked Videos\" changes only when a like is toggled",
        ));
    }
    Ok(())
}

fn row_to_playlist(row: &Row) -> AppResult<Playlist> {
    Ok(Playlist {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{create_store, sample_user};

    #[test]
    fn validate_title_rejects_blank_long_and_reserved() {
        assert!(validate_title("  ").unwrap_err().field_errors().contains_key("title"));
        assert!(validate_title(&"x".repeat(101)).is_err());
        assert!(validate_title(HISTORY_TITLE).is_err());
        assert_eq!(validate_title("  Road trips ").unwrap(), "Road trips");
    }

    #[tokio::test]
    async fn well_known_playlist_upsert_is_idempotent() -> AppResult<()> {
        let (_dir, store) = create_store().await?;
        let user = sample_user(&store, "Ada").await?;

        let first = store
            .ensure_well_known_playlist(&user.id, LIKED_VIDEOS_TITLE)
            .await?;
        let second = store
            .ensure_well_known_playlist(&user.id, LIKED_VIDEOS_TITLE)
            .await?;
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_playlists(&user.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_user_title_is_a_field_error() -> AppResult<()> {
        let (_dir, store) = create_store().await?;
        let user = sample_user(&store, "Ada").await?;
        store.create_playlist(&user.id, "Mix", "").await?;
        let err = store.create_playlist(&user.id, "Mix", "").await.unwrap_err();
        assert!(err.field_errors().contains_key("title"));
        Ok(())
    }

    #[tokio::test]
    async fn manual_membership_is_not_duplicated() -> AppResult<()> {
        let (_dir, store) = create_store().await?;
        let user = sample_user(&store, "Ada").await?;
        let video = store.create_video(&user.id, "https://m/v.mp4").await?;
        let playlist = store.create_playlist(&user.id, "Mix", "best of").await?;

        store
            .add_video_to_playlist(&user.id, &playlist.id, &video.id)
            .await?;
        let listed = store
            .add_video_to_playlist(&user.id, &playlist.id, &video.id)
            .await?;
        assert_eq!(listed.videos.len(), 1);
        assert_eq!(listed.playlist.description, "best of");

        let listed = store
            .remove_video_from_playlist(&user.id, &playlist.id, &video.id)
            .await?;
        assert!(listed.videos.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn only_the_owner_edits_a_playlist() -> AppResult<()> {
        let (_dir, store) = create_store().await?;
        let owner = sample_user(&store, "Ada").await?;
        let other = sample_user(&store, "Eve").await?;
        let video = store.create_video(&owner.id, "https://m/v.mp4").await?;
        let playlist = store.create_playlist(&owner.id, "Mix", "").await?;

        let err = store
            .add_video_to_playlist(&other.id, &playlist.id, &video.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        Ok(())
    }

    #[tokio::test]
    async fn liked_videos_only_moves_with_the_like() -> AppResult<()> {
        use crate::engagement::{ReactionState, TargetKind};

        let (_dir, store) = create_store().await?;
        let user = sample_user(&store, "Ada").await?;
        let video = store.create_video(&user.id, "https://m/v.mp4").await?;
        let other = store.create_video(&user.id, "https://m/w.mp4").await?;
        store.toggle_like(&user.id, TargetKind::Video, &video.id).await?;
        let liked = store
            .ensure_well_known_playlist(&user.id, LIKED_VIDEOS_TITLE)
            .await?;

        let err = store
            .remove_video_from_playlist(&user.id, &liked.id, &video.id)
            .await
            .unwrap_err();
        assert!(err.field_errors().contains_key("title"));
        let err = store
            .add_video_to_playlist(&user.id, &liked.id, &other.id)
            .await
            .unwrap_err();
        assert!(err.field_errors().contains_key("title"));
        assert!(store.delete_playlist(&user.id, &liked.id).await.is_err());

        assert_eq!(
            store.reaction_state(&user.id, TargetKind::Video, &video.id).await?,
            ReactionState::Liked
        );
        assert_eq!(store.membership_count(&liked.id, &video.id).await?, 1);
        assert_eq!(store.membership_count(&liked.id, &other.id).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn history_entries_can_be_cleared_but_not_added() -> AppResult<()> {
        let (_dir, store) = create_store().await?;
        let user = sample_user(&store, "Ada").await?;
        let video = store.create_video(&user.id, "https://m/v.mp4").await?;
        let view = store.record_view(&video.id, Some(&user.id)).await?;
        let history = view.history_playlist_id.unwrap();

        let err = store
            .add_video_to_playlist(&user.id, &history, &video.id)
            .await
            .unwrap_err();
        assert!(err.field_errors().contains_key("title"));

        let listed = store
            .remove_video_from_playlist(&user.id, &history, &video.id)
            .await?;
        assert!(listed.videos.is_empty());
        store.delete_playlist(&user.id, &history).await?;
        assert!(store.get_playlist(&history).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unpublished_videos_of_others_cannot_be_added() -> AppResult<()> {
        let (_dir, store) = create_store().await?;
        let owner = sample_user(&store, "Ada").await?;
        let other = sample_user(&store, "Eve").await?;
        let video = store.create_video(&owner.id, "https://m/v.mp4").await?;
        let playlist = store.create_playlist(&other.id, "Mix", "").await?;

        let err = store
            .add_video_to_playlist(&other.id, &playlist.id, &video.id)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }
}
