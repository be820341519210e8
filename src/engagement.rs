//! Engagement counter: like/dislike, follow and view tracking.
//!
//! The like axis keeps a single row per `(user, target)` whose `state`
//! column is either `LIKE` or `DISLIKE`; absence means neutral. Every toggle
//! is one upsert or delete inside a write transaction, so like and dislike can
//! never coexist for the same pair. Counts are always computed at read time.

use libsql::{Connection, params, params::IntoParams};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::playlists::{
    HISTORY_TITLE, LIKED_VIDEOS_TITLE, insert_membership, insert_membership_once,
    remove_membership, upsert_well_known,
};
use crate::store::{Store, now_timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Video,
    Comment,
    Announcement,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Comment => "comment",
            Self::Announcement => "announcement",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Like,
    Dislike,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionState {
    #[default]
    None,
    Liked,
    Disliked,
}

impl ReactionState {
    /// Toggle semantics: repeating the current reaction clears it, anything
    /// else switches to the requested reaction.
    pub fn apply(self, action: ReactionAction) -> Self {
        match (self, action) {
            (Self::Liked, ReactionAction::Like) => Self::None,
            (_, ReactionAction::Like) => Self::Liked,
            (Self::Disliked, ReactionAction::Dislike) => Self::None,
            (_, ReactionAction::Dislike) => Self::Disliked,
        }
    }

    fn from_column(value: Option<&str>) -> Self {
        match value {
            Some("LIKE") => Self::Liked,
            Some("DISLIKE") => Self::Disliked,
            _ => Self::None,
        }
    }

    fn column(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Liked => Some("LIKE"),
            Self::Disliked => Some("DISLIKE"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowState {
    #[default]
    None,
    Following,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionOutcome {
    pub state: ReactionState,
    pub likes: i64,
    pub dislikes: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowOutcome {
    pub state: FollowState,
    pub followers: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewOutcome {
    pub views: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_playlist_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSummary {
    pub likes: i64,
    pub dislikes: i64,
    pub views: i64,
    pub viewer_reaction: ReactionState,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowSummary {
    pub followers: i64,
    pub following: i64,
    pub viewer_follows: bool,
}

async fn count_rows(conn: &Connection, sql: &str, params: impl IntoParams) -> AppResult<i64> {
    let mut rows = conn.query(sql, params).await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

async fn current_reaction(
    conn: &Connection,
    user_id: &str,
    kind: TargetKind,
    target_id: &str,
) -> AppResult<ReactionState> {
    let mut rows = conn
        .query(
            r#"
            SELECT state FROM reactions
            WHERE user_id = ?1 AND target_kind = ?2 AND target_id = ?3
            "#,
            params![user_id, kind.as_str(), target_id],
        )
        .await?;
    let state: Option<String> = match rows.next().await? {
        Some(row) => Some(row.get(0)?),
        None => None,
    };
    Ok(ReactionState::from_column(state.as_deref()))
}

impl Store {
    async fn require_target(&self, kind: TargetKind, target_id: &str) -> AppResult<()> {
        let exists = match kind {
            TargetKind::Video => self.get_video(target_id).await?.is_some(),
            TargetKind::Comment => self.get_comment(target_id).await?.is_some(),
            TargetKind::Announcement => self.get_announcement(target_id).await?.is_some(),
        };
        if exists {
            Ok(())
        } else {
            Err(AppError::not_found(format!("{} {target_id}", kind.as_str())))
        }
    }

    /// Applies a like or dislike toggle for `user_id` on the target.
    ///
    /// For videos the user's "Liked Videos" playlist follows the like state
    /// in the same transaction: entering `Liked` adds the video, leaving it
    /// removes the video.
    pub async fn toggle_reaction(
        &self,
        user_id: &str,
        kind: TargetKind,
        target_id: &str,
        action: ReactionAction,
    ) -> AppResult<ReactionOutcome> {
        let (previous, next) = {
            let _guard = self.write_guard().await;
            self.require_user(user_id).await?;
            self.require_target(kind, target_id).await?;
            let tx = self.conn().transaction().await?;
            let previous = current_reaction(&tx, user_id, kind, target_id).await?;
            let next = previous.apply(action);

            match next.column() {
                Some(state) => {
                    tx.execute(
                        r#"
                        INSERT INTO reactions (user_id, target_kind, target_id, state, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                        ON CONFLICT(user_id, target_kind, target_id) DO UPDATE SET
                            state = excluded.state,
                            updated_at = excluded.updated_at
                        "#,
                        params![user_id, kind.as_str(), target_id, state, now_timestamp()],
                    )
                    .await?;
                }
                None => {
                    tx.execute(
                        r#"
                        DELETE FROM reactions
                        WHERE user_id = ?1 AND target_kind = ?2 AND target_id = ?3
                        "#,
                        params![user_id, kind.as_str(), target_id],
                    )
                    .await?;
                }
            }

            let was_liked = previous == ReactionState::Liked;
            let is_liked = next == ReactionState::Liked;
            if kind == TargetKind::Video && was_liked != is_liked {
                let playlist_id = upsert_well_known(&tx, user_id, LIKED_VIDEOS_TITLE).await?;
                if is_liked {
                    insert_membership_once(&tx, &playlist_id, target_id).await?;
                } else {
                    remove_membership(&tx, &playlist_id, target_id).await?;
                }
            }

            tx.commit().await?;
            (previous, next)
        };

        let (likes, dislikes) = self.reaction_counts(kind, target_id).await?;
        debug!(
            user_id,
            target = kind.as_str(),
            target_id,
            ?previous,
            ?next,
            likes,
            dislikes,
            "reaction toggled"
        );
        Ok(ReactionOutcome {
            state: next,
            likes,
            dislikes,
        })
    }

    pub async fn toggle_like(
        &self,
        user_id: &str,
        kind: TargetKind,
        target_id: &str,
    ) -> AppResult<ReactionOutcome> {
        self.toggle_reaction(user_id, kind, target_id, ReactionAction::Like)
            .await
    }

    pub async fn toggle_dislike(
        &self,
        user_id: &str,
        kind: TargetKind,
        target_id: &str,
    ) -> AppResult<ReactionOutcome> {
        self.toggle_reaction(user_id, kind, target_id, ReactionAction::Dislike)
            .await
    }

    pub async fn reaction_state(
        &self,
        user_id: &str,
        kind: TargetKind,
        target_id: &str,
    ) -> AppResult<ReactionState> {
        current_reaction(self.conn(), user_id, kind, target_id).await
    }

    /// `(likes, dislikes)` for a target, counted from the reaction rows.
    pub async fn reaction_counts(&self, kind: TargetKind, target_id: &str) -> AppResult<(i64, i64)> {
        let mut rows = self
            .conn()
            .query(
                r#"
                SELECT
                    COALESCE(SUM(CASE WHEN state = 'LIKE' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN state = 'DISLIKE' THEN 1 ELSE 0 END), 0)
                FROM reactions
                WHERE target_kind = ?1 AND target_id = ?2
                "#,
                params![kind.as_str(), target_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok((row.get(0)?, row.get(1)?)),
            None => Ok((0, 0)),
        }
    }

    /// Follows `following_id` if not yet following, unfollows otherwise.
    pub async fn toggle_follow(&self, follower_id: &str, following_id: &str) -> AppResult<FollowOutcome> {
        if follower_id == following_id {
            return Err(AppError::validation("followingId", "cannot follow yourself"));
        }
        self.require_user(follower_id).await?;
        self.require_user(following_id).await?;

        let state = {
            let _guard = self.write_guard().await;
            let tx = self.conn().transaction().await?;
            let removed = tx
                .execute(
                    "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                    params![follower_id, following_id],
                )
                .await?;
            let state = if removed > 0 {
                FollowState::None
            } else {
                tx.execute(
                    r#"
                    INSERT INTO follows (follower_id, following_id, created_at)
                    VALUES (?1, ?2, ?3)
                    "#,
                    params![follower_id, following_id, now_timestamp()],
                )
                .await?;
                FollowState::Following
            };
            tx.commit().await?;
            state
        };

        let followers = count_rows(
            self.conn(),
            "SELECT COUNT(*) FROM follows WHERE following_id = ?1",
            [following_id],
        )
        .await?;
        debug!(follower_id, following_id, ?state, followers, "follow toggled");
        Ok(FollowOutcome { state, followers })
    }

    /// Records one view. Every call adds a VIEW row; authenticated viewers
    /// also get a History entry, one per call, without deduplication.
    pub async fn record_view(&self, video_id: &str, viewer_id: Option<&str>) -> AppResult<ViewOutcome> {
        let history_playlist_id = {
            let _guard = self.write_guard().await;
            self.require_video(video_id).await?;
            if let Some(viewer_id) = viewer_id {
                self.require_user(viewer_id).await?;
            }
            let tx = self.conn().transaction().await?;
            tx.execute(
                "INSERT INTO views (video_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![video_id, viewer_id, now_timestamp()],
            )
            .await?;
            let history = match viewer_id {
                Some(viewer_id) => {
                    let playlist_id = upsert_well_known(&tx, viewer_id, HISTORY_TITLE).await?;
                    insert_membership(&tx, &playlist_id, video_id).await?;
                    Some(playlist_id)
                }
                None => None,
            };
            tx.commit().await?;
            history
        };

        let views = self.view_count(video_id).await?;
        Ok(ViewOutcome {
            views,
            history_playlist_id,
        })
    }

    pub async fn view_count(&self, video_id: &str) -> AppResult<i64> {
        count_rows(
            self.conn(),
            "SELECT COUNT(*) FROM views WHERE video_id = ?1",
            [video_id],
        )
        .await
    }

    /// Counts for a target plus the viewer's own reaction. Views are only
    /// tracked for videos and read as zero elsewhere.
    pub async fn engagement_summary(
        &self,
        kind: TargetKind,
        target_id: &str,
        viewer_id: Option<&str>,
    ) -> AppResult<EngagementSummary> {
        let (likes, dislikes) = self.reaction_counts(kind, target_id).await?;
        let views = match kind {
            TargetKind::Video => self.view_count(target_id).await?,
            _ => 0,
        };
        let viewer_reaction = match viewer_id {
            Some(viewer_id) => self.reaction_state(viewer_id, kind, target_id).await?,
            None => ReactionState::None,
        };
        Ok(EngagementSummary {
            likes,
            dislikes,
            views,
            viewer_reaction,
        })
    }

    pub async fn follow_summary(&self, user_id: &str, viewer_id: Option<&str>) -> AppResult<FollowSummary> {
        let followers = count_rows(
            self.conn(),
            "SELECT COUNT(*) FROM follows WHERE following_id = ?1",
            [user_id],
        )
        .await?;
        let following = count_rows(
            self.conn(),
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
            [user_id],
        )
        .await?;
        let viewer_follows = match viewer_id {
            Some(viewer_id) => {
                count_rows(
                    self.conn(),
                    "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                    params![viewer_id, user_id],
                )
                .await?
                    > 0
            }
            None => false,
        };
        Ok(FollowSummary {
            followers,
            following,
            viewer_follows,
        })
    }
}
