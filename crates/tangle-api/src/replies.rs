use axum::{Extension, Json, extract::Path, extract::State, http::StatusCode};
use tracing::info;
use uuid::Uuid;

use tangle_db::models::ReplyRow;
use tangle_db::now_rfc3339;
use tangle_types::api::{AddReplyRequest, Claims, Envelope, UpdateReplyRequest};
use tangle_types::models::ReplyView;

use crate::error::ApiError;
use crate::threads::{delete_media, upload_images};
use crate::validate;
use crate::views::{parse_images, reply_view};
use crate::{AppState, blocking};

async fn require_reply(state: &AppState, id: &str) -> Result<ReplyRow, ApiError> {
    let db = state.db.clone();
    let id = id.to_string();
    blocking(move || db.get_reply(&id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Reply not found".into()))
}

async fn ensure_user_exists(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    let db = state.db.clone();
    let exists = blocking(move || db.user_exists(&id.to_string())).await?;
    if !exists {
        return Err(ApiError::NotFound("User not found".into()));
    }
    Ok(())
}

async fn ensure_thread_exists(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    let db = state.db.clone();
    let exists = blocking(move || Ok(db.get_thread(&id.to_string())?.is_some())).await?;
    if !exists {
        return Err(ApiError::NotFound("Thread not found".into()));
    }
    Ok(())
}

/// POST /threads/{thread_id}/replies
pub async fn add_reply(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddReplyRequest>,
) -> Result<(StatusCode, Json<Envelope<ReplyView>>), ApiError> {
    let thread_id = validate::uuid_v4(&thread_id)?;
    ensure_user_exists(&state, claims.sub).await?;
    ensure_thread_exists(&state, thread_id).await?;
    validate::thread_content(&req.content)?;

    let image_urls = upload_images(&state.media, &req.images).await?;

    let row = ReplyRow {
        id: Uuid::new_v4().to_string(),
        thread_id: thread_id.to_string(),
        author_id: claims.sub.to_string(),
        content: req.content,
        images: serde_json::to_string(&image_urls).map_err(ApiError::internal)?,
        created_at: now_rfc3339(),
    };
    let db = state.db.clone();
    let insert = row.clone();
    blocking(move || db.insert_reply(&insert)).await?;
    info!(reply_id = %row.id, thread_id = %row.thread_id, "reply created");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::created("Add Reply Success", reply_view(&row))),
    ))
}

/// PUT /threads/{thread_id}/replies/{reply_id}, owner only. Empty content
/// keeps the old content; a provided image list replaces the stored media.
pub async fn update_reply(
    State(state): State<AppState>,
    Path((thread_id, reply_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateReplyRequest>,
) -> Result<(StatusCode, Json<Envelope<ReplyView>>), ApiError> {
    let thread_id = validate::uuid_v4(&thread_id)?;
    let reply_id = validate::uuid_v4(&reply_id)?;
    ensure_user_exists(&state, claims.sub).await?;
    ensure_thread_exists(&state, thread_id).await?;
    let row = require_reply(&state, &reply_id.to_string()).await?;

    if row.author_id != claims.sub.to_string() {
        return Err(ApiError::Forbidden("You are not the owner of this reply".into()));
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
    blocking(move || db.update_reply(&update_id, &content, &images_json)).await?;

    let updated = require_reply(&state, &row.id).await?;
    Ok((
        StatusCode::OK,
        Json(Envelope::ok("Update Reply Success", reply_view(&updated))),
    ))
}

/// DELETE /replies/{reply_id}, owner only. Stored media goes first.
pub async fn delete_reply(
    State(state): State<AppState>,
    Path(reply_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<ReplyView>>), ApiError> {
    let reply_id = validate::uuid_v4(&reply_id)?;
    ensure_user_exists(&state, claims.sub).await?;
    let row = require_reply(&state, &reply_id.to_string()).await?;

    if row.author_id != claims.sub.to_string() {
        return Err(ApiError::Forbidden("You are not the owner of this reply".into()));
    }

    delete_media(&state.media, &parse_images(&row.images)).await;

    let db = state.db.clone();
    let delete_id = row.id.clone();
    blocking(move || db.delete_reply(&delete_id)).await?;
    info!(reply_id = %row.id, "reply deleted");

    Ok((
        StatusCode::OK,
        Json(Envelope::ok("Delete Reply Success", reply_view(&row))),
    ))
}
