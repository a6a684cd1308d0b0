use axum::{Extension, Json, extract::Path, extract::State, http::StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{error, info};
use uuid::Uuid;

use tangle_db::models::{ThreadRow, UserRow};
use tangle_db::now_rfc3339;
use tangle_media::MediaStore;
use tangle_queue::{QueueError, QueueMessage};
use tangle_types::api::{AddThreadRequest, Claims, Envelope, UpdateThreadRequest};
use tangle_types::models::ThreadView;

use crate::error::ApiError;
use crate::validate;
use crate::views::{parse_images, thread_view};
use crate::{AppState, blocking};

/// Decode and push every inline image to the media store. Any single
/// failure fails the whole write; no partial publish.
pub(crate) async fn upload_images(
    media: &MediaStore,
    images: &[String],
) -> Result<Vec<String>, ApiError> {
    let mut urls = Vec::with_capacity(images.len());
    for (index, encoded) in images.iter().enumerate() {
        let bytes = B64
            .decode(encoded)
            .map_err(|_| ApiError::Validation(format!("Image {index} is not valid base64")))?;
        let url = media.store_inline(&bytes).await.map_err(|e| {
            error!("media upload failed: {}", e);
            ApiError::internal(e)
        })?;
        urls.push(url);
    }
    Ok(urls)
}

/// Best-effort removal of stored media behind a set of URLs.
pub(crate) async fn delete_media(media: &MediaStore, urls: &[String]) {
    for url in urls {
        if let Some(public_id) = MediaStore::public_id(url) {
            media.delete(public_id).await.ok();
        }
    }
}

async fn require_user(state: &AppState, id: Uuid) -> Result<UserRow, ApiError> {
    let db = state.db.clone();
    blocking(move || db.get_user_by_id(&id.to_string()))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

async fn require_thread(state: &AppState, id: &str) -> Result<ThreadRow, ApiError> {
    let db = state.db.clone();
    let id = id.to_string();
    blocking(move || db.get_thread(&id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Thread not found".into()))
}

/// GET /threads/{thread_id}
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<ThreadView>>), ApiError> {
    let id = validate::uuid_v4(&thread_id)?;

    let row = require_thread(&state, &id.to_string()).await?;
    let db = state.db.clone();
    let key = row.id.clone();
    let author_id = row.author_id.clone();
    let (author, likes, replies) = blocking(move || {
        let author = db.get_user_by_id(&author_id)?;
        let likes = db.likes_for_threads(std::slice::from_ref(&key))?;
        let replies = db.replies_for_threads(std::slice::from_ref(&key))?;
        Ok((author, likes, replies))
    })
    .await?;

    let view = thread_view(&row, author.as_ref(), &likes, &replies);
    Ok((
        StatusCode::OK,
        Json(Envelope::ok("Find Thread By Id Success", view)),
    ))
}

/// POST /threads: synchronous create.
pub async fn add_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddThreadRequest>,
) -> Result<(StatusCode, Json<Envelope<ThreadView>>), ApiError> {
    validate::thread_content(&req.content)?;
    let author = require_user(&state, claims.sub).await?;

    let image_urls = upload_images(&state.media, &req.images).await?;

    let row = ThreadRow {
        id: Uuid::new_v4().to_string(),
        author_id: author.id.clone(),
        content: req.content,
        images: serde_json::to_string(&image_urls).map_err(ApiError::internal)?,
        created_at: now_rfc3339(),
    };
    let db = state.db.clone();
    let insert = row.clone();
    blocking(move || db.insert_thread(&insert)).await?;
    info!(thread_id = %row.id, "thread created");

    let view = thread_view(&row, Some(&author), &[], &[]);
    Ok((
        StatusCode::CREATED,
        Json(Envelope::created("Add Thread Success", view)),
    ))
}

/// POST /threads/queue: create through the ingestion queue.
///
/// The handler uploads media, publishes one message to the durable queue,
/// and parks on its correlation waiter. It answers 201 only after the
/// consumer has persisted the row; a wait past the deadline answers 202.
pub async fn add_thread_queued(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddThreadRequest>,
) -> Result<(StatusCode, Json<Envelope<ThreadView>>), ApiError> {
    validate::thread_content(&req.content)?;
    let author = require_user(&state, claims.sub).await?;

    // Media must be fully uploaded before anything is enqueued.
    let image_urls = upload_images(&state.media, &req.images).await?;

    let message = QueueMessage {
        content: req.content,
        image: image_urls,
        user: claims.sub,
    };
    let waiter = state
        .queue
        .publish(&message)
        .await
        .map_err(ApiError::internal)?;

    match waiter.wait(state.queue_wait).await {
        Ok(row) => {
            let view = thread_view(&row, Some(&author), &[], &[]);
            Ok((
                StatusCode::CREATED,
                Json(Envelope::created("Add Thread From Queue Success", view)),
            ))
        }
        Err(QueueError::Timeout) => Ok((
            StatusCode::ACCEPTED,
            Json(Envelope::accepted("Thread accepted, still processing")),
        )),
        Err(e) => Err(ApiError::internal(e)),
    }
}

/// PUT /threads/{thread_id}, owner only. Empty content keeps the old
/// content; a provided image list replaces the stored media. The edit
/// refreshes `created_at`, resurfacing the thread.
pub async fn update_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateThreadRequest>,
) -> Result<(StatusCode, Json<Envelope<ThreadView>>), ApiError> {
    let id = validate::uuid_v4(&thread_id)?;
    let author = require_user(&state, claims.sub).await?;
    let row = require_thread(&state, &id.to_string()).await?;

    if row.author_id != author.id {
        return Err(ApiError::Forbidden("You are not the owner of this thread".into()));
    }

    let content = match req.content {
        Some(content) if !content.is_empty() => content,
        _ => row.content.clone(),
    };

    let images_json = match req.images {
        Some(images) => {
            let new_urls = upload_images(&state.media, &images).await?;
            delete_media(&state.media, &parse_images(&row.images)).await;
            serde_json::to_string(&new_urls).map_err(ApiError::internal)?
        }
        None => row.images.clone(),
    };

    let db = state.db.clone();
    let update_id = row.id.clone();
    blocking(move || db.update_thread(&update_id, &content, &images_json)).await?;

    let updated = require_thread(&state, &row.id).await?;
    let view = thread_view(&updated, Some(&author), &[], &[]);
    Ok((
        StatusCode::OK,
        Json(Envelope::ok("Update Thread Success", view)),
    ))
}

/// DELETE /threads/{thread_id}, owner only. Stored media goes first.
pub async fn delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<ThreadView>>), ApiError> {
    let id = validate::uuid_v4(&thread_id)?;
    let author = require_user(&state, claims.sub).await?;
    let row = require_thread(&state, &id.to_string()).await?;

    if row.author_id != author.id {
        return Err(ApiError::Forbidden("You are not the owner of this thread".into()));
    }

    delete_media(&state.media, &parse_images(&row.images)).await;

    let db = state.db.clone();
    let delete_id = row.id.clone();
    blocking(move || db.delete_thread(&delete_id)).await?;
    info!(thread_id = %row.id, "thread deleted");

    let view = thread_view(&row, Some(&author), &[], &[]);
    Ok((
        StatusCode::OK,
        Json(Envelope::ok("Delete Thread Success", view)),
    ))
}
