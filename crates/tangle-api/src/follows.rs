use axum::{Extension, Json, extract::Path, extract::State, http::StatusCode};
use uuid::Uuid;

use tangle_types::api::{Claims, Envelope, ToggleResponse};

use crate::error::ApiError;
use crate::validate;
use crate::{AppState, blocking};

/// POST /users/{user_id}/follow is a toggle on the directed edge from the
/// caller to the target. Following twice unfollows; a third call re-follows.
pub async fn follow(
    State(state): State<AppState>,
    Path(followee_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<ToggleResponse>>), ApiError> {
    let followee_id = validate::uuid_v4(&followee_id)?;

    if followee_id == claims.sub {
        return Err(ApiError::Validation("You cannot follow yourself".into()));
    }

    let db = state.db.clone();
    let followee_key = followee_id.to_string();
    let exists = blocking(move || db.user_exists(&followee_key)).await?;
    if !exists {
        return Err(ApiError::NotFound("User not found".into()));
    }

    let db = state.db.clone();
    let follower_key = claims.sub.to_string();
    let exists = blocking(move || db.user_exists(&follower_key)).await?;
    if !exists {
        return Err(ApiError::NotFound("User not found".into()));
    }

    let db = state.db.clone();
    let edge_id = Uuid::new_v4().to_string();
    let follower_key = claims.sub.to_string();
    let followee_key = followee_id.to_string();
    let added =
        blocking(move || db.toggle_follow(&edge_id, &follower_key, &followee_key)).await?;

    if added {
        Ok((
            StatusCode::CREATED,
            Json(Envelope::created("Follow User Success", ToggleResponse { added })),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(Envelope::ok("You unfollowed this user", ToggleResponse { added })),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{seed_user, state};

    #[tokio::test]
    async fn follow_toggles() {
        let (_tmp, state, _rx) = state().await;
        let (_, alice) = seed_user(&state, "alice");
        let (bob, _) = seed_user(&state, "bob");

        let (status, Json(first)) = follow(
            State(state.clone()),
            Path(bob.id.clone()),
            Extension(alice.clone()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(first.data.unwrap().added);

        let (status, Json(second)) = follow(
            State(state.clone()),
            Path(bob.id.clone()),
            Extension(alice.clone()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(!second.data.unwrap().added);

        let (_, Json(third)) = follow(State(state), Path(bob.id), Extension(alice))
            .await
            .unwrap();
        assert!(third.data.unwrap().added);
    }

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let (_tmp, state, _rx) = state().await;
        let (alice_row, alice) = seed_user(&state, "alice");

        let err = follow(State(state), Path(alice_row.id), Extension(alice))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn follow_missing_user_404s() {
        let (_tmp, state, _rx) = state().await;
        let (_, alice) = seed_user(&state, "alice");

        let err = follow(
            State(state),
            Path(uuid::Uuid::new_v4().to_string()),
            Extension(alice),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
