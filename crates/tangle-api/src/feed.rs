//! Paginated thread listings: the plain path and the read-through cached
//! path with staleness reconciliation.
//!
//! A cache hit is never trusted blindly. The handler re-reads the same page
//! window from the store and compares the snapshot field by field: item
//! count, total count, total pages, then per-index `content` and the image
//! URL lists element-wise. Likes, replies, and author fields are left out of
//! the comparison on purpose: a like or reply landing on a cached page does
//! not invalidate it. The extra store read on every hit buys self-healing
//! without a version/ETag scheme. Any mismatch evicts the entry, and the
//! uncached path rebuilds and recaches the page.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{Extension, Json, extract::Path, extract::State, http::StatusCode};
use tracing::{debug, info, warn};

use tangle_cache::{DEFAULT_EXPIRATION, page_key};
use tangle_db::Database;
use tangle_db::models::{LikeRow, ReplyRow};
use tangle_types::api::{Claims, Envelope};
use tangle_types::models::{CachedPage, ThreadPage, ThreadView};

use crate::error::ApiError;
use crate::pagination::{self, parse_page};
use crate::views::thread_view;
use crate::{AppState, blocking};

const CACHED_PAGE_MESSAGE: &str = "Find All Cached Threads Success";

/// One page window of hydrated threads plus fresh totals, straight from the
/// store.
pub(crate) async fn fetch_page(
    db: &Arc<Database>,
    page: i64,
) -> Result<(Vec<ThreadView>, i64, i64), ApiError> {
    let db = db.clone();
    let (rows, total, likes, replies, authors) = blocking(move || {
        let (limit, offset) = pagination::window(page);
        let rows = db.list_threads(limit, offset)?;
        let total = db.count_threads()?;

        let thread_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let likes = db.likes_for_threads(&thread_ids)?;
        let replies = db.replies_for_threads(&thread_ids)?;

        let mut author_ids: Vec<String> = rows.iter().map(|r| r.author_id.clone()).collect();
        author_ids.sort();
        author_ids.dedup();
        let authors = db.users_by_ids(&author_ids)?;

        Ok((rows, total, likes, replies, authors))
    })
    .await?;

    // Group likes/replies by thread and authors by id, then build views in
    // row order.
    let mut like_map: HashMap<String, Vec<LikeRow>> = HashMap::new();
    for like in likes {
        like_map.entry(like.thread_id.clone()).or_default().push(like);
    }
    let mut reply_map: HashMap<String, Vec<ReplyRow>> = HashMap::new();
    for reply in replies {
        reply_map.entry(reply.thread_id.clone()).or_default().push(reply);
    }
    let author_map: HashMap<String, _> =
        authors.into_iter().map(|u| (u.id.clone(), u)).collect();

    let views = rows
        .iter()
        .map(|row| {
            thread_view(
                row,
                author_map.get(&row.author_id),
                like_map.get(&row.id).map_or(&[][..], |v| v.as_slice()),
                reply_map.get(&row.id).map_or(&[][..], |v| v.as_slice()),
            )
        })
        .collect();

    Ok((views, total, pagination::total_pages(total)))
}

/// Is the cached snapshot still a faithful picture of the store?
///
/// Compared: item count, total count, total pages, and per-index `content`
/// plus element-wise `images`. Nothing else; see the module docs.
pub fn snapshot_matches(
    cached: &CachedPage,
    fresh: &[ThreadView],
    total: i64,
    total_pages: i64,
) -> bool {
    cached.data.len() == fresh.len()
        && cached.pagination.total_items == total
        && cached.pagination.total_pages == total_pages
        && cached.data.iter().zip(fresh).all(|(c, f)| {
            c.content == f.content
                && c.images.len() == f.images.len()
                && c.images.iter().zip(&f.images).all(|(a, b)| a == b)
        })
}

/// GET /threads/page/{page}: the uncached listing.
pub async fn list_threads(
    State(state): State<AppState>,
    Path(page): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<ThreadPage>>), ApiError> {
    let page = parse_page(&page);
    let (threads, total, total_pages) = fetch_page(&state.db, page).await?;
    pagination::ensure_in_range(page, total_pages)?;

    let body = ThreadPage {
        data: threads,
        pagination: pagination::build(total, page),
    };
    Ok((
        StatusCode::OK,
        Json(Envelope::ok("Find All Threads Success", body)),
    ))
}

/// GET /threads/cached/{page}: read-through cache with reconciliation.
pub async fn list_threads_cached(
    State(state): State<AppState>,
    Path(page): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<ThreadPage>>), ApiError> {
    let page = parse_page(&page);
    let key = page_key(page);

    if let Some(blob) = state.cache.get(&key).await {
        match serde_json::from_str::<CachedPage>(&blob) {
            Ok(cached) => {
                let (fresh, total, total_pages) = fetch_page(&state.db, page).await?;
                if snapshot_matches(&cached, &fresh, total, total_pages) {
                    debug!(page, "cached page still matches the store");
                    let body = ThreadPage {
                        data: cached.data,
                        pagination: cached.pagination,
                    };
                    return Ok((
                        StatusCode::OK,
                        Json(Envelope::ok(CACHED_PAGE_MESSAGE, body)),
                    ));
                }
                info!(page, "cached page is stale, evicting");
                state.cache.delete(&key).await;
            }
            Err(e) => {
                // Corrupt entry: treat as a miss and self-heal.
                warn!(page, error = %e, "corrupt cache entry, evicting");
                state.cache.delete(&key).await;
            }
        }
    }

    let (threads, total, total_pages) = fetch_page(&state.db, page).await?;
    pagination::ensure_in_range(page, total_pages)?;

    let pagination = pagination::build(total, page);
    let document = CachedPage {
        message: CACHED_PAGE_MESSAGE.to_string(),
        data: threads.clone(),
        pagination: pagination.clone(),
    };
    let blob = serde_json::to_string(&document).map_err(ApiError::internal)?;
    state.cache.set(&key, blob, DEFAULT_EXPIRATION).await;

    let body = ThreadPage {
        data: threads,
        pagination,
    };
    Ok((
        StatusCode::OK,
        Json(Envelope::ok("Find All Threads Success", body)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{seed_user, state};
    use tangle_db::models::ThreadRow;
    use tangle_db::now_rfc3339;
    use uuid::Uuid;

    fn insert_thread(state: &AppState, author_id: &str, content: &str, images: &[&str]) -> String {
        let id = Uuid::new_v4().to_string();
        state
            .db
            .insert_thread(&ThreadRow {
                id: id.clone(),
                author_id: author_id.to_string(),
                content: content.to_string(),
                images: serde_json::to_string(images).unwrap(),
                created_at: now_rfc3339(),
            })
            .unwrap();
        id
    }

    fn sample_view(content: &str, images: &[&str]) -> ThreadView {
        ThreadView {
            id: Uuid::new_v4(),
            content: content.to_string(),
            images: images.iter().map(|s| s.to_string()).collect(),
            author_id: Uuid::new_v4(),
            author: None,
            created_at: Default::default(),
            likes: vec![],
            replies: vec![],
        }
    }

    fn cached_doc(fresh: &[ThreadView], total: i64) -> CachedPage {
        CachedPage {
            message: CACHED_PAGE_MESSAGE.into(),
            data: fresh.to_vec(),
            pagination: pagination::build(total, 1),
        }
    }

    #[test]
    fn snapshot_comparison_scope() {
        let fresh = vec![sample_view("hello", &["/uploads/a"])];
        let cached = cached_doc(&fresh, 1);
        assert!(snapshot_matches(&cached, &fresh, 1, 1));

        // A like landing on the page does NOT invalidate the snapshot.
        let mut liked = fresh.clone();
        liked[0].likes.push(tangle_types::models::LikeView {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        });
        assert!(snapshot_matches(&cached, &liked, 1, 1));

        // Content change does.
        let mut edited = fresh.clone();
        edited[0].content = "edited".into();
        assert!(!snapshot_matches(&cached, &edited, 1, 1));

        // Image change does.
        let mut reimaged = fresh.clone();
        reimaged[0].images = vec!["/uploads/b".into()];
        assert!(!snapshot_matches(&cached, &reimaged, 1, 1));

        // So do count and page-total drift.
        assert!(!snapshot_matches(&cached, &[], 0, 0));
        assert!(!snapshot_matches(&cached, &fresh, 2, 1));
        assert!(!snapshot_matches(&cached, &fresh, 1, 2));
    }

    #[tokio::test]
    async fn empty_store_404s_page_one() {
        let (_tmp, state, _rx) = state().await;
        let (_, claims) = seed_user(&state, "alice");

        let err = list_threads(
            State(state.clone()),
            Path("1".into()),
            Extension(claims.clone()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = list_threads_cached(State(state), Path("1".into()), Extension(claims))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn page_past_the_end_404s() {
        let (_tmp, state, _rx) = state().await;
        let (user, claims) = seed_user(&state, "alice");
        insert_thread(&state, &user.id, "only one", &[]);

        let err = list_threads(State(state), Path("2".into()), Extension(claims))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn cached_read_matches_store_truth() {
        let (_tmp, state, _rx) = state().await;
        let (user, claims) = seed_user(&state, "alice");
        insert_thread(&state, &user.id, "hello", &["/uploads/a"]);

        // First read populates the cache.
        let (status, Json(first)) = list_threads_cached(
            State(state.clone()),
            Path("1".into()),
            Extension(claims.clone()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(state.cache.get(&page_key(1)).await.is_some());

        // Second read is served from the cache and still matches the store.
        let (_, Json(second)) =
            list_threads_cached(State(state.clone()), Path("1".into()), Extension(claims))
                .await
                .unwrap();
        assert_eq!(second.message, CACHED_PAGE_MESSAGE);
        let data = second.data.unwrap();
        assert_eq!(data.data[0].content, "hello");
        assert_eq!(data.data[0].images, vec!["/uploads/a".to_string()]);
        assert_eq!(
            data.data[0].content,
            first.data.unwrap().data[0].content
        );
    }

    #[tokio::test]
    async fn edit_between_reads_is_detected_and_healed() {
        let (_tmp, state, _rx) = state().await;
        let (user, claims) = seed_user(&state, "alice");
        let thread_id = insert_thread(&state, &user.id, "original", &[]);

        list_threads_cached(
            State(state.clone()),
            Path("1".into()),
            Extension(claims.clone()),
        )
        .await
        .unwrap();

        state.db.update_thread(&thread_id, "rewritten", "[]").unwrap();

        let (_, Json(envelope)) =
            list_threads_cached(State(state.clone()), Path("1".into()), Extension(claims))
                .await
                .unwrap();
        let data = envelope.data.unwrap();
        // Never the stale content.
        assert_eq!(data.data[0].content, "rewritten");

        // And the cache was repopulated with the healed page.
        let blob = state.cache.get(&page_key(1)).await.unwrap();
        let recached: CachedPage = serde_json::from_str(&blob).unwrap();
        assert_eq!(recached.data[0].content, "rewritten");
    }

    #[tokio::test]
    async fn like_between_reads_keeps_the_snapshot() {
        let (_tmp, state, _rx) = state().await;
        let (user, claims) = seed_user(&state, "alice");
        let thread_id = insert_thread(&state, &user.id, "hello", &[]);

        list_threads_cached(
            State(state.clone()),
            Path("1".into()),
            Extension(claims.clone()),
        )
        .await
        .unwrap();

        state
            .db
            .toggle_like(&Uuid::new_v4().to_string(), &thread_id, &user.id)
            .unwrap();

        let (_, Json(envelope)) =
            list_threads_cached(State(state.clone()), Path("1".into()), Extension(claims))
                .await
                .unwrap();
        // Served from the snapshot: the like is invisible to the cached page.
        assert_eq!(envelope.message, CACHED_PAGE_MESSAGE);
        assert!(envelope.data.unwrap().data[0].likes.is_empty());
    }

    #[tokio::test]
    async fn corrupt_cache_entry_is_evicted_and_refetched() {
        let (_tmp, state, _rx) = state().await;
        let (user, claims) = seed_user(&state, "alice");
        insert_thread(&state, &user.id, "hello", &[]);

        state
            .cache
            .set(&page_key(1), "{not json".into(), DEFAULT_EXPIRATION)
            .await;

        let (status, Json(envelope)) =
            list_threads_cached(State(state.clone()), Path("1".into()), Extension(claims))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope.data.unwrap().data[0].content, "hello");

        // The bad blob is gone, replaced by a decodable document.
        let blob = state.cache.get(&page_key(1)).await.unwrap();
        assert!(serde_json::from_str::<CachedPage>(&blob).is_ok());
    }

    #[tokio::test]
    async fn non_numeric_page_defaults_to_one() {
        let (_tmp, state, _rx) = state().await;
        let (user, claims) = seed_user(&state, "alice");
        insert_thread(&state, &user.id, "hello", &[]);

        let (status, Json(envelope)) =
            list_threads(State(state), Path("garbage".into()), Extension(claims))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope.data.unwrap().pagination.current_page, 1);
    }
}
