use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use tangle_db::models::UserRow;
use tangle_db::now_rfc3339;
use tangle_types::api::{Claims, Envelope, LoginRequest, LoginResponse, RegisterRequest};
use tangle_types::models::UserSummary;

use crate::error::ApiError;
use crate::validate;
use crate::views::user_summary;
use crate::{AppState, blocking};

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Envelope<UserSummary>>), ApiError> {
    validate::register(&req)?;

    let db = state.db.clone();
    let email = req.email.clone();
    if blocking(move || db.email_registered(&email)).await? {
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(ApiError::internal)?
        .to_string();

    let user_id = Uuid::new_v4();
    let row = UserRow {
        id: user_id.to_string(),
        username: derive_username(user_id, &req.fullname),
        fullname: req.fullname,
        email: req.email,
        password: password_hash,
        profile_picture: String::new(),
        bio: String::new(),
        created_at: now_rfc3339(),
    };

    let db = state.db.clone();
    let insert = row.clone();
    blocking(move || db.create_user(&insert)).await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::created("Register Success", user_summary(&row))),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<(StatusCode, Json<Envelope<LoginResponse>>), ApiError> {
    validate::login(&req)?;

    let db = state.db.clone();
    let email = req.email.clone();
    let user = blocking(move || db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::Conflict("Email is not registered".into()))?;

    let parsed_hash = PasswordHash::new(&user.password).map_err(ApiError::internal)?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Conflict("Incorrect password".into()))?;

    let user_id: Uuid = user.id.parse().map_err(ApiError::internal)?;
    let token = create_token(&state.jwt_secret, user_id, &user.username)
        .map_err(ApiError::internal)?;

    Ok((
        StatusCode::OK,
        Json(Envelope::ok(
            "Login Success",
            LoginResponse {
                user_id,
                username: user.username,
                token,
            },
        )),
    ))
}

/// GET /auth/check: does the token still belong to a live user?
pub async fn check(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<(StatusCode, Json<Envelope<UserSummary>>), ApiError> {
    let db = state.db.clone();
    let user = blocking(move || db.get_user_by_id(&claims.sub.to_string()))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok((
        StatusCode::OK,
        Json(Envelope::ok("User has a valid token", user_summary(&user))),
    ))
}

/// `user_<first 8 uuid chars>_<fullname with underscores>`
fn derive_username(id: Uuid, fullname: &str) -> String {
    let uuid_part: String = id.to_string().chars().take(8).collect();
    format!("user_{}_{}", uuid_part, fullname.replace(' ', "_"))
}

fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::state;

    fn register_body(name: &str) -> RegisterRequest {
        RegisterRequest {
            fullname: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', "")),
            password: "Sup3rSecret".into(),
        }
    }

    #[tokio::test]
    async fn register_then_login_roundtrip() {
        let (_tmp, state, _rx) = state().await;

        let (status, Json(envelope)) = register(
            State(state.clone()),
            Json(register_body("Alice Wonder")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        let user = envelope.data.unwrap();
        assert!(user.username.starts_with("user_"));
        assert!(user.username.ends_with("Alice_Wonder"));

        let (status, Json(login_env)) = login(
            State(state),
            Json(LoginRequest {
                email: "alicewonder@example.com".into(),
                password: "Sup3rSecret".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        let session = login_env.data.unwrap();
        assert_eq!(session.user_id, user.id);
        assert!(!session.token.is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (_tmp, state, _rx) = state().await;

        register(State(state.clone()), Json(register_body("Alice")))
            .await
            .unwrap();
        let err = register(State(state), Json(register_body("Alice")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn wrong_password_is_a_conflict() {
        let (_tmp, state, _rx) = state().await;
        register(State(state.clone()), Json(register_body("Alice")))
            .await
            .unwrap();

        let err = login(
            State(state),
            Json(LoginRequest {
                email: "alice@example.com".into(),
                password: "Wr0ngPassword".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn weak_password_is_rejected() {
        let (_tmp, state, _rx) = state().await;
        let err = register(
            State(state),
            Json(RegisterRequest {
                fullname: "Alice".into(),
                email: "alice@example.com".into(),
                password: "weak".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn username_derivation() {
        let id: Uuid = "a1a2a3a4-b1b2-4c1c-8d3d-e1e2e3e4e5e6".parse().unwrap();
        assert_eq!(derive_username(id, "Alice Wonder"), "user_a1a2a3a4_Alice_Wonder");
    }
}
