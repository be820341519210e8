//! Relational persistence for vidhub.
//!
//! Everything lives in a single libsql (SQLite-compatible) database. Records
//! mirror what the HTTP API exposes; JSON columns hold the few list-valued
//! fields such as the sprite thumbnail URLs.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use libsql::{Builder, Connection, Row, params};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const DEFAULT_VIDEO_TITLE: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Partial profile update. `None` leaves the stored column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.handle.is_none()
            && self.email.is_none()
            && self.image.is_none()
            && self.background_image.is_none()
            && self.description.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
    pub video_url: String,
    #[serde(default)]
    pub sprite_urls: Vec<String>,
    pub publish: bool,
    pub created_at: String,
}

/// Partial video update. `None` leaves the stored column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPatch {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<bool>,
}

impl VideoPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.thumbnail_url.is_none()
            && self.publish.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub video_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub created_at: String,
}

async fn configure_connection(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            handle TEXT UNIQUE,
            email TEXT UNIQUE,
            image TEXT,
            background_image TEXT,
            description TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title TEXT NOT NULL DEFAULT 'Untitled',
            description TEXT NOT NULL DEFAULT '',
            thumbnail_url TEXT NOT NULL DEFAULT '',
            video_url TEXT NOT NULL,
            sprite_urls_json TEXT NOT NULL DEFAULT '[]',
            publish INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS announcements (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            parent_id TEXT REFERENCES comments(id) ON DELETE CASCADE,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        -- One row per (user, target) on the like axis; absence means neutral.
        CREATE TABLE IF NOT EXISTS reactions (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            target_kind TEXT NOT NULL CHECK (target_kind IN ('video', 'comment', 'announcement')),
            target_id TEXT NOT NULL,
            state TEXT NOT NULL CHECK (state IN ('LIKE', 'DISLIKE')),
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, target_kind, target_id)
        );

        CREATE TABLE IF NOT EXISTS follows (
            follower_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            following_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            PRIMARY KEY (follower_id, following_id),
            CHECK (follower_id <> following_id)
        );

        CREATE TABLE IF NOT EXISTS views (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS playlists (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            UNIQUE (user_id, title)
        );

        CREATE TABLE IF NOT EXISTS playlist_videos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            playlist_id TEXT NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
            video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_videos_user ON videos(user_id);
        CREATE INDEX IF NOT EXISTS idx_comments_video ON comments(video_id);
        CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
        CREATE INDEX IF NOT EXISTS idx_announcements_user ON announcements(user_id);
        CREATE INDEX IF NOT EXISTS idx_reactions_target ON reactions(target_kind, target_id, state);
        CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id);
        CREATE INDEX IF NOT EXISTS idx_views_video ON views(video_id);
        CREATE INDEX IF NOT EXISTS idx_playlist_videos_playlist ON playlist_videos(playlist_id, video_id);
        "#,
    )
    .await?;
    Ok(())
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Maps SQLite uniqueness failures onto `Conflict` so callers can tell a
/// taken handle apart from a broken database.
pub(crate) fn conflict_on_unique(err: libsql::Error, what: &str) -> AppError {
    if err.to_string().contains("UNIQUE constraint failed") {
        AppError::Conflict(format!("{what} already exists"))
    } else {
        AppError::Database(err)
    }
}

fn required_text(field: &str, value: &str, max_len: usize) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(field, "must not be empty"));
    }
    if trimmed.chars().count() > max_len {
        return Err(AppError::validation(
            field,
            format!("must be at most {max_len} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn optional_handle(value: Option<&str>) -> AppResult<Option<String>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let handle = required_text("handle", raw, 50)?;
    if handle.chars().any(char::is_whitespace) {
        return Err(AppError::validation("handle", "must not contain whitespace"));
    }
    Ok(Some(handle))
}

/// Wrapper around the SQLite-compatible connection.
///
/// Reads go straight to the connection. Every write takes `write_lock` first:
/// the connection is shared, so a statement issued while another caller's
/// transaction is open would commit or roll back with that transaction.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    write_lock: Mutex<()>,
}

impl Store {
    /// Opens (and if necessary creates) the database and ensures the expected
    /// schema exists.
    pub async fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self {
            conn,
            write_lock: Mutex::new(()),
        })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) async fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    pub async fn create_user(&self, new_user: &NewUser) -> AppResult<User> {
        let name = required_text("name", &new_user.name, 100)?;
        let handle = optional_handle(new_user.handle.as_deref())?;
        let email = new_user
            .email
            .as_deref()
            .map(|email| required_text("email", email, 254))
            .transpose()?;
        let id = new_id();

        let _guard = self.write_guard().await;
        self.conn
            .execute(
                r#"
                INSERT INTO users (id, name, handle, email, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    id.as_str(),
                    name.as_str(),
                    handle.as_deref(),
                    email.as_deref(),
                    now_timestamp()
                ],
            )
            .await
            .map_err(|err| conflict_on_unique(err, "handle or email"))?;

        self.require_user(&id).await
    }

    pub async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, name, handle, email, image, background_image,
                       description, created_at
                FROM users
                WHERE id = ?1
                "#,
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn require_user(&self, id: &str) -> AppResult<User> {
        self.get_user(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {id}")))
    }

    /// Writes only the columns present in `patch`.
    pub async fn update_user(&self, patch: &UserPatch) -> AppResult<User> {
        let _guard = self.write_guard().await;
        let current = self.require_user(&patch.id).await?;
        if patch.is_empty() {
            return Ok(current);
        }
        let name = patch
            .name
            .as_deref()
            .map(|name| required_text("name", name, 100))
            .transpose()?;
        let handle = optional_handle(patch.handle.as_deref())?;

        self.conn
            .execute(
                r#"
                UPDATE users SET
                    name = COALESCE(?2, name),
                    handle = COALESCE(?3, handle),
                    email = COALESCE(?4, email),
                    image = COALESCE(?5, image),
                    background_image = COALESCE(?6, background_image),
                    description = COALESCE(?7, description)
                WHERE id = ?1
                "#,
                params![
                    patch.id.as_str(),
                    name.as_deref(),
                    handle.as_deref(),
                    patch.email.as_deref(),
                    patch.image.as_deref(),
                    patch.background_image.as_deref(),
                    patch.description.as_deref()
                ],
            )
            .await
            .map_err(|err| conflict_on_unique(err, "handle or email"))?;

        self.require_user(&patch.id).await
    }

    /// Creates a video owned by `user_id` with every field except the URL at
    /// its default: "Untitled", empty description and thumbnail, unpublished.
    pub async fn create_video(&self, user_id: &str, video_url: &str) -> AppResult<Video> {
        let video_url = required_text("videoUrl", video_url, 2048)?;
        let _guard = self.write_guard().await;
        self.require_user(user_id).await?;
        let id = new_id();

        self.conn
            .execute(
                r#"
                INSERT INTO videos (id, user_id, title, video_url, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    id.as_str(),
                    user_id,
                    DEFAULT_VIDEO_TITLE,
                    video_url.as_str(),
                    now_timestamp()
                ],
            )
            .await?;

        self.require_video(&id).await
    }

    pub async fn get_video(&self, id: &str) -> AppResult<Option<Video>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, user_id, title, description, thumbnail_url, video_url,
                       sprite_urls_json, publish, created_at
                FROM videos
                WHERE id = ?1
                "#,
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_video(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn require_video(&self, id: &str) -> AppResult<Video> {
        self.get_video(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("video {id}")))
    }

    /// Like [`Store::require_video`], but an unpublished video only exists
    /// for its owner.
    pub async fn require_visible_video(&self, id: &str, viewer_id: Option<&str>) -> AppResult<Video> {
        let video = self.require_video(id).await?;
        if !video.publish && viewer_id != Some(video.user_id.as_str()) {
            return Err(AppError::not_found(format!("video {id}")));
        }
        Ok(video)
    }

    /// Lists a user's videos, newest first. Unpublished videos are only
    /// included when `include_unpublished` is set (the owner's own view).
    pub async fn list_user_videos(
        &self,
        user_id: &str,
        include_unpublished: bool,
    ) -> AppResult<Vec<Video>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, user_id, title, description, thumbnail_url, video_url,
                       sprite_urls_json, publish, created_at
                FROM videos
                WHERE user_id = ?1 AND (publish = 1 OR ?2 = 1)
                ORDER BY created_at DESC, rowid DESC
                "#,
                params![user_id, include_unpublished as i64],
            )
            .await?;
        let mut videos = Vec::new();
        while let Some(row) = rows.next().await? {
            videos.push(row_to_video(&row)?);
        }
        Ok(videos)
    }

    /// Applies `patch` on behalf of `actor_id`, who must own the video.
    pub async fn update_video(&self, actor_id: &str, patch: &VideoPatch) -> AppResult<Video> {
        let _guard = self.write_guard().await;
        let current = self.require_video(&patch.id).await?;
        if current.user_id != actor_id {
            return Err(AppError::Forbidden(format!(
                "video {} belongs to another user",
                patch.id
            )));
        }
        if patch.is_empty() {
            return Ok(current);
        }
        let title = patch
            .title
            .as_deref()
            .map(|title| required_text("title", title, 100))
            .transpose()?;

        self.conn
            .execute(
                r#"
                UPDATE videos SET
                    title = COALESCE(?2, title),
                    description = COALESCE(?3, description),
                    thumbnail_url = COALESCE(?4, thumbnail_url),
                    publish = COALESCE(?5, publish)
                WHERE id = ?1
                "#,
                params![
                    patch.id.as_str(),
                    title.as_deref(),
                    patch.description.as_deref(),
                    patch.thumbnail_url.as_deref(),
                    patch.publish.map(i64::from)
                ],
            )
            .await?;

        self.require_video(&patch.id).await
    }

    /// Deletes a video together with its engagement rows. Comments, views and
    /// playlist memberships go through `ON DELETE CASCADE`; reactions are
    /// polymorphic and are removed explicitly.
    pub async fn delete_video(&self, actor_id: &str, id: &str) -> AppResult<()> {
        let _guard = self.write_guard().await;
        let video = self.require_video(id).await?;
        if video.user_id != actor_id {
            return Err(AppError::Forbidden(format!(
                "video {id} belongs to another user"
            )));
        }

        let tx = self.conn.transaction().await?;
        tx.execute(
            r#"
            DELETE FROM reactions
            WHERE target_kind = 'comment'
              AND target_id IN (SELECT id FROM comments WHERE video_id = ?1)
            "#,
            [id],
        )
        .await?;
        tx.execute(
            "DELETE FROM reactions WHERE target_kind = 'video' AND target_id = ?1",
            [id],
        )
        .await?;
        tx.execute("DELETE FROM videos WHERE id = ?1", [id]).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Appends sprite thumbnail URLs to the video. Existing entries are never
    /// replaced, so repeated sampling keeps growing the list.
    pub async fn append_sprite_urls(&self, id: &str, urls: &[String]) -> AppResult<Video> {
        let _guard = self.write_guard().await;
        let mut video = self.require_video(id).await?;
        video.sprite_urls.extend(urls.iter().cloned());
        let sprite_urls_json = serde_json::to_string(&video.sprite_urls)?;
        self.conn
            .execute(
                "UPDATE videos SET sprite_urls_json = ?2 WHERE id = ?1",
                params![id, sprite_urls_json],
            )
            .await?;
        Ok(video)
    }

    /// Creates a comment; replies must point at a comment on the same video.
    pub async fn create_comment(
        &self,
        user_id: &str,
        video_id: &str,
        parent_id: Option<&str>,
        message: &str,
    ) -> AppResult<Comment> {
        let message = required_text("message", message, 5000)?;
        let _guard = self.write_guard().await;
        self.require_user(user_id).await?;
        self.require_video(video_id).await?;
        if let Some(parent_id) = parent_id {
            let parent = self
                .get_comment(parent_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("comment {parent_id}")))?;
            if parent.video_id != video_id {
                return Err(AppError::validation(
                    "parentId",
                    "reply must belong to the same video",
                ));
            }
        }

        let id = new_id();
        self.conn
            .execute(
                r#"
                INSERT INTO comments (id, video_id, user_id, parent_id, message, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    id.as_str(),
                    video_id,
                    user_id,
                    parent_id,
                    message.as_str(),
                    now_timestamp()
                ],
            )
            .await?;

        self.get_comment(&id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("comment {id}")))
    }

    pub async fn get_comment(&self, id: &str) -> AppResult<Option<Comment>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, video_id, user_id, parent_id, message, created_at
                FROM comments
                WHERE id = ?1
                "#,
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_comment(&row)?)),
            None => Ok(None),
        }
    }

    /// Every comment of a video in posting order; threads are rebuilt by the
    /// caller from `parent_id`.
    pub async fn list_comments(&self, video_id: &str) -> AppResult<Vec<Comment>> {
        self.require_video(video_id).await?;
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, video_id, user_id, parent_id, message, created_at
                FROM comments
                WHERE video_id = ?1
                ORDER BY created_at ASC, rowid ASC
                "#,
                [video_id],
            )
            .await?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next().await? {
            comments.push(row_to_comment(&row)?);
        }
        Ok(comments)
    }

    pub async fn delete_comment(&self, actor_id: &str, id: &str) -> AppResult<()> {
        let _guard = self.write_guard().await;
        let comment = self
            .get_comment(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("comment {id}")))?;
        if comment.user_id != actor_id {
            return Err(AppError::Forbidden(format!(
                "comment {id} belongs to another user"
            )));
        }

        let tx = self.conn.transaction().await?;
        tx.execute(
            r#"
            WITH RECURSIVE thread(id) AS (
                SELECT ?1
                UNION ALL
                SELECT comments.id FROM comments JOIN thread ON comments.parent_id = thread.id
            )
            DELETE FROM reactions
            WHERE target_kind = 'comment' AND target_id IN (SELECT id FROM thread)
            "#,
            [id],
        )
        .await?;
        tx.execute("DELETE FROM comments WHERE id = ?1", [id]).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn create_announcement(&self, user_id: &str, message: &str) -> AppResult<Announcement> {
        let message = required_text("message", message, 5000)?;
        let _guard = self.write_guard().await;
        self.require_user(user_id).await?;
        let id = new_id();
        self.conn
            .execute(
                r#"
                INSERT INTO announcements (id, user_id, message, created_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![id.as_str(), user_id, message.as_str(), now_timestamp()],
            )
            .await?;
        self.get_announcement(&id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("announcement {id}")))
    }

    pub async fn get_announcement(&self, id: &str) -> AppResult<Option<Announcement>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, message, created_at FROM announcements WHERE id = ?1",
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_announcement(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_announcements(&self, user_id: &str) -> AppResult<Vec<Announcement>> {
        self.require_user(user_id).await?;
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, user_id, message, created_at
                FROM announcements
                WHERE user_id = ?1
                ORDER BY created_at DESC, rowid DESC
                "#,
                [user_id],
            )
            .await?;
        let mut announcements = Vec::new();
        while let Some(row) = rows.next().await? {
            announcements.push(row_to_announcement(&row)?);
        }
        Ok(announcements)
    }
}

fn row_to_user(row: &Row) -> AppResult<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        handle: row.get(2)?,
        email: row.get(3)?,
        image: row.get(4)?,
        background_image: row.get(5)?,
        description: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Column order must match the SELECT statements in `get_video` and
/// `list_user_videos`.
pub(crate) fn row_to_video(row: &Row) -> AppResult<Video> {
    let sprite_urls_json: String = row.get(6)?;
    let sprite_urls: Vec<String> = serde_json::from_str(&sprite_urls_json)?;
    Ok(Video {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        thumbnail_url: row.get(4)?,
        video_url: row.get(5)?,
        sprite_urls,
        publish: row.get::<i64>(7)? != 0,
        created_at: row.get(8)?,
    })
}

fn row_to_comment(row: &Row) -> AppResult<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        video_id: row.get(1)?,
        user_id: row.get(2)?,
        parent_id: row.get(3)?,
        message: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_announcement(row: &Row) -> AppResult<Announcement> {
    Ok(Announcement {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message: row.get(2)?,
        created_at: row.get(3)?,
    })
}
