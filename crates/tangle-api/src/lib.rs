pub mod auth;
pub mod error;
pub mod feed;
pub mod follows;
pub mod likes;
pub mod middleware;
pub mod pagination;
pub mod replies;
pub mod threads;
pub mod users;
pub mod validate;
pub mod views;

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use tangle_cache::PageCache;
use tangle_db::Database;
use tangle_media::MediaStore;
use tangle_queue::ThreadQueue;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

/// Everything request-scope code needs, built once during startup and
/// injected. No global connection state, no lazy per-request bring-up.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub cache: Arc<PageCache>,
    pub media: Arc<MediaStore>,
    pub queue: ThreadQueue,
    pub jwt_secret: String,
    /// How long a queued-create request waits for its consumer ack before
    /// answering 202.
    pub queue_wait: Duration,
}

/// Run blocking database work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal(e)
        })?
        .map_err(ApiError::internal)
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use tangle_db::models::UserRow;
    use tangle_db::now_rfc3339;
    use tangle_queue::QueueReceiver;
    use tangle_types::api::Claims;
    use uuid::Uuid;

    pub async fn state() -> (tempfile::TempDir, AppState, QueueReceiver) {
        let tmp = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(PageCache::new());
        let media = Arc::new(
            MediaStore::new(tmp.path().join("media"), "/uploads".into())
                .await
                .unwrap(),
        );
        let (queue, receiver) = ThreadQueue::new();
        let state = Arc::new(AppStateInner {
            db,
            cache,
            media,
            queue,
            jwt_secret: "test-secret".into(),
            queue_wait: Duration::from_secs(2),
        });
        (tmp, state, receiver)
    }

    pub fn seed_user(state: &AppState, name: &str) -> (UserRow, Claims) {
        let row = UserRow {
            id: Uuid::new_v4().to_string(),
            username: format!("user_{name}"),
            fullname: name.to_string(),
            email: format!("{name}@example.com"),
            password: "hash".into(),
            profile_picture: String::new(),
            bio: String::new(),
            created_at: now_rfc3339(),
        };
        state.db.create_user(&row).unwrap();
        let claims = Claims {
            sub: row.id.parse().unwrap(),
            username: row.username.clone(),
            exp: usize::MAX,
        };
        (row, claims)
    }
}
