/// Database row types. These map directly to SQLite rows.
/// Distinct from the tangle-types API views to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub password: String,
    pub profile_picture: String,
    pub bio: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ThreadRow {
    pub id: String,
    pub author_id: String,
    pub content: String,
    /// JSON array of media URLs, stored as text.
    pub images: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ReplyRow {
    pub id: String,
    pub thread_id: String,
    pub author_id: String,
    pub content: String,
    pub images: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct LikeRow {
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct FollowRow {
    pub id: String,
    pub follower_id: String,
    pub followee_id: String,
    pub created_at: String,
}
