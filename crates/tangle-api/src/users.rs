use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

use tangle_db::models::UserRow;
use tangle_types::api::{Claims, Envelope, PageQuery, UpdateProfileRequest};
use tangle_types::models::{UserPage, UserProfile, UserSummary};

use crate::error::ApiError;
use crate::pagination::{self, parse_page};
use crate::validate;
use crate::views::{parse_id, user_summary};
use crate::{AppState, blocking};

async fn require_user(state: &AppState, id: Uuid) -> Result<UserRow, ApiError> {
    let db = state.db.clone();
    blocking(move || db.get_user_by_id(&id.to_string()))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

/// GET /users?page=
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<UserPage>>), ApiError> {
    let page = parse_page(query.page.as_deref().unwrap_or(""));

    let db = state.db.clone();
    let (rows, total) = blocking(move || {
        let (limit, offset) = pagination::window(page);
        let rows = db.list_users(limit, offset)?;
        let total = db.count_users()?;
        Ok((rows, total))
    })
    .await?;

    pagination::ensure_in_range(page, pagination::total_pages(total))?;

    let body = UserPage {
        data: rows.iter().map(user_summary).collect(),
        pagination: pagination::build(total, page),
    };
    Ok((
        StatusCode::OK,
        Json(Envelope::ok("Find All Users Success", body)),
    ))
}

/// GET /users/suggested: up to five users the caller does not follow yet.
pub async fn suggested_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<Vec<UserSummary>>>), ApiError> {
    let db = state.db.clone();
    let caller = claims.sub.to_string();
    let rows = blocking(move || db.suggested_users(&caller, 5)).await?;

    Ok((
        StatusCode::OK,
        Json(Envelope::ok(
            "Find Suggested Users Success",
            rows.iter().map(user_summary).collect(),
        )),
    ))
}

/// GET /users/{user_id}: profile with relation counts and follow edges.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<UserProfile>>), ApiError> {
    let user_id = validate::uuid_v4(&user_id)?;
    let row = require_user(&state, user_id).await?;

    let db = state.db.clone();
    let key = row.id.clone();
    let (thread_count, reply_count, like_count, followers, following) = blocking(move || {
        let thread_count = db.count_threads_by_author(&key)?;
        let reply_count = db.count_replies_by_author(&key)?;
        let like_count = db.count_likes_by_user(&key)?;
        let followers = db.followers_of(&key)?;
        let following = db.following_of(&key)?;
        Ok((thread_count, reply_count, like_count, followers, following))
    })
    .await?;

    let profile = UserProfile {
        user: user_summary(&row),
        email: row.email.clone(),
        thread_count,
        reply_count,
        like_count,
        followers: followers
            .iter()
            .map(|edge| parse_id(&edge.follower_id, "follower"))
            .collect(),
        following: following
            .iter()
            .map(|edge| parse_id(&edge.followee_id, "followee"))
            .collect(),
    };
    Ok((
        StatusCode::OK,
        Json(Envelope::ok("Find User By Id Success", profile)),
    ))
}

/// PUT /users/{user_id}, self only.
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<(StatusCode, Json<Envelope<UserSummary>>), ApiError> {
    let user_id = validate::uuid_v4(&user_id)?;
    if user_id != claims.sub {
        return Err(ApiError::Forbidden("You can only update your own profile".into()));
    }
    validate::profile_update(&req)?;

    let row = require_user(&state, user_id).await?;

    let fullname = match &req.fullname {
        Some(fullname) if !fullname.is_empty() => fullname.clone(),
        _ => row.fullname.clone(),
    };
    // An explicit empty bio clears it.
    let bio = req.bio.clone().unwrap_or_else(|| row.bio.clone());
    let password = match &req.password {
        Some(password) => {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map_err(ApiError::internal)?
                .to_string()
        }
        None => row.password.clone(),
    };

    let db = state.db.clone();
    let key = row.id.clone();
    blocking(move || db.update_user(&key, &fullname, &bio, &password)).await?;

    let updated = require_user(&state, user_id).await?;
    Ok((
        StatusCode::OK,
        Json(Envelope::ok("Update User Success", user_summary(&updated))),
    ))
}

/// DELETE /users/{user_id}, self only. One transaction removes follow
/// edges in both directions, likes, replies, threads, then the user.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<UserSummary>>), ApiError> {
    let user_id = validate::uuid_v4(&user_id)?;
    if user_id != claims.sub {
        return Err(ApiError::Forbidden("You can only delete your own account".into()));
    }

    let row = require_user(&state, user_id).await?;

    let db = state.db.clone();
    let key = row.id.clone();
    let deleted = blocking(move || db.delete_user_cascade(&key)).await?;
    if !deleted {
        return Err(ApiError::NotFound("User not found".into()));
    }
    info!(user_id = %row.id, "user deleted with cascade");

    Ok((
        StatusCode::OK,
        Json(Envelope::ok("Delete User Success", user_summary(&row))),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{seed_user, state};

    #[tokio::test]
    async fn listing_empty_users_404s_page_one() {
        let (_tmp, state, _rx) = state().await;
        let (_, claims) = seed_user(&state, "alice");

        // One user exists, so page 1 is fine but page 2 is not.
        let (status, Json(envelope)) = list_users(
            State(state.clone()),
            Query(PageQuery { page: None }),
            Extension(claims.clone()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope.data.unwrap().pagination.total_items, 1);

        let err = list_users(
            State(state),
            Query(PageQuery { page: Some("2".into()) }),
            Extension(claims),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn profile_reflects_relations() {
        let (_tmp, state, _rx) = state().await;
        let (alice_row, alice) = seed_user(&state, "alice");
        let (bob_row, _) = seed_user(&state, "bob");

        state
            .db
            .toggle_follow(&Uuid::new_v4().to_string(), &bob_row.id, &alice_row.id)
            .unwrap();

        let (_, Json(envelope)) = get_user(
            State(state),
            Path(alice_row.id.clone()),
            Extension(alice),
        )
        .await
        .unwrap();
        let profile = envelope.data.unwrap();
        assert_eq!(profile.followers.len(), 1);
        assert_eq!(profile.followers[0].to_string(), bob_row.id);
        assert!(profile.following.is_empty());
    }

    #[tokio::test]
    async fn update_is_self_only() {
        let (_tmp, state, _rx) = state().await;
        let (alice_row, _) = seed_user(&state, "alice");
        let (_, bob) = seed_user(&state, "bob");

        let err = update_user(
            State(state),
            Path(alice_row.id),
            Extension(bob),
            Json(UpdateProfileRequest {
                bio: Some("not yours".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn update_applies_bio_and_keeps_fullname() {
        let (_tmp, state, _rx) = state().await;
        let (alice_row, alice) = seed_user(&state, "alice");

        let (_, Json(envelope)) = update_user(
            State(state),
            Path(alice_row.id),
            Extension(alice),
            Json(UpdateProfileRequest {
                bio: Some("rustacean".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        let updated = envelope.data.unwrap();
        assert_eq!(updated.bio, "rustacean");
        assert_eq!(updated.fullname, "alice");
    }

    #[tokio::test]
    async fn delete_cascades_and_is_self_only() {
        let (_tmp, state, _rx) = state().await;
        let (alice_row, alice) = seed_user(&state, "alice");
        let (bob_row, _bob) = seed_user(&state, "bob");

        state
            .db
            .toggle_follow(&Uuid::new_v4().to_string(), &alice_row.id, &bob_row.id)
            .unwrap();

        let err = delete_user(
            State(state.clone()),
            Path(bob_row.id.clone()),
            Extension(alice.clone()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let (status, _) = delete_user(
            State(state.clone()),
            Path(alice_row.id.clone()),
            Extension(alice),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(state.db.get_user_by_id(&alice_row.id).unwrap().is_none());
        assert!(state.db.followers_of(&bob_row.id).unwrap().is_empty());

        // bob is untouched
        assert!(state.db.get_user_by_id(&bob_row.id).unwrap().is_some());
    }
}
