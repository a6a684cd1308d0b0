use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public slice of a user record. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub profile_picture: String,
    pub bio: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeView {
    pub id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyView {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A thread hydrated with its author, likes, and replies: the shape every
/// listing and point-lookup endpoint returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadView {
    pub id: Uuid,
    pub content: String,
    pub images: Vec<String>,
    pub author_id: Uuid,
    pub author: Option<UserSummary>,
    pub created_at: DateTime<Utc>,
    pub likes: Vec<LikeView>,
    pub replies: Vec<ReplyView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_items: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadPage {
    pub data: Vec<ThreadView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPage {
    pub data: Vec<UserSummary>,
    pub pagination: Pagination,
}

/// The exact document cached per feed page under `threads_page_<n>`.
/// Stored serialized; the reconciler decodes it on every cache hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPage {
    pub message: String,
    pub data: Vec<ThreadView>,
    pub pagination: Pagination,
}

/// A user profile as returned by the point lookup: the public summary plus
/// relation counts and the raw follow edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: UserSummary,
    pub email: String,
    pub thread_count: i64,
    pub reply_count: i64,
    pub like_count: i64,
    pub followers: Vec<Uuid>,
    pub following: Vec<Uuid>,
}
