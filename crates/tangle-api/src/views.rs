//! Row-to-view conversion. Rows store ids and timestamps as text; corrupt
//! fields are logged and defaulted rather than failing a whole listing.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use tangle_db::models::{LikeRow, ReplyRow, ThreadRow, UserRow};
use tangle_types::models::{LikeView, ReplyView, ThreadView, UserSummary};

pub fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub fn parse_timestamp(raw: &str, what: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt {} timestamp '{}': {}", what, raw, e);
        DateTime::default()
    })
}

pub fn parse_images(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Corrupt images column '{}': {}", raw, e);
        vec![]
    })
}

pub fn user_summary(row: &UserRow) -> UserSummary {
    UserSummary {
        id: parse_id(&row.id, "user"),
        username: row.username.clone(),
        fullname: row.fullname.clone(),
        profile_picture: row.profile_picture.clone(),
        bio: row.bio.clone(),
        created_at: parse_timestamp(&row.created_at, "user"),
    }
}

pub fn like_view(row: &LikeRow) -> LikeView {
    LikeView {
        id: parse_id(&row.id, "like"),
        user_id: parse_id(&row.user_id, "like user"),
    }
}

pub fn reply_view(row: &ReplyRow) -> ReplyView {
    ReplyView {
        id: parse_id(&row.id, "reply"),
        thread_id: parse_id(&row.thread_id, "reply thread"),
        author_id: parse_id(&row.author_id, "reply author"),
        content: row.content.clone(),
        images: parse_images(&row.images),
        created_at: parse_timestamp(&row.created_at, "reply"),
    }
}

pub fn thread_view(
    row: &ThreadRow,
    author: Option<&UserRow>,
    likes: &[LikeRow],
    replies: &[ReplyRow],
) -> ThreadView {
    ThreadView {
        id: parse_id(&row.id, "thread"),
        content: row.content.clone(),
        images: parse_images(&row.images),
        author_id: parse_id(&row.author_id, "thread author"),
        author: author.map(user_summary),
        created_at: parse_timestamp(&row.created_at, "thread"),
        likes: likes.iter().map(like_view).collect(),
        replies: replies.iter().map(reply_view).collect(),
    }
}
