use axum::{Extension, Json, extract::Path, extract::State, http::StatusCode};
use uuid::Uuid;

use tangle_types::api::{Claims, Envelope, ToggleResponse};

use crate::error::ApiError;
use crate::validate;
use crate::{AppState, blocking};

/// POST /threads/{thread_id}/like is a toggle. Exactly one like row exists
/// per (user, thread) pair at any time.
pub async fn like(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<ToggleResponse>>), ApiError> {
    let thread_id = validate::uuid_v4(&thread_id)?;

    let db = state.db.clone();
    let user_id = claims.sub.to_string();
    let exists = blocking(move || db.user_exists(&user_id)).await?;
    if !exists {
        return Err(ApiError::NotFound("User not found".into()));
    }

    let db = state.db.clone();
    let thread_key = thread_id.to_string();
    let thread = blocking(move || db.get_thread(&thread_key)).await?;
    if thread.is_none() {
        return Err(ApiError::NotFound("Thread not found".into()));
    }

    let db = state.db.clone();
    let like_id = Uuid::new_v4().to_string();
    let user_id = claims.sub.to_string();
    let thread_key = thread_id.to_string();
    let added = blocking(move || db.toggle_like(&like_id, &thread_key, &user_id)).await?;

    let message = if added {
        "Like Thread Success"
    } else {
        "Undo Like Thread Success"
    };
    Ok((
        StatusCode::OK,
        Json(Envelope::ok(message, ToggleResponse { added })),
    ))
}
