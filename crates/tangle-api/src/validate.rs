//! Request-body and identifier validation. Everything here rejects before
//! any store access happens.

use uuid::{Uuid, Variant};

use tangle_types::api::{LoginRequest, RegisterRequest, UpdateProfileRequest};

use crate::error::ApiError;

/// Strict UUID v4: version nibble 4 and RFC 4122 variant. Anything else is
/// a 400, never a lookup.
pub fn uuid_v4(raw: &str) -> Result<Uuid, ApiError> {
    let id = Uuid::try_parse(raw).map_err(|_| ApiError::Validation("Invalid UUID".into()))?;
    if id.get_version_num() != 4 || !matches!(id.get_variant(), Variant::RFC4122) {
        return Err(ApiError::Validation("Invalid UUID".into()));
    }
    Ok(id)
}

pub fn thread_content(content: &str) -> Result<(), ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::Validation("Content is required".into()));
    }
    Ok(())
}

pub fn register(req: &RegisterRequest) -> Result<(), ApiError> {
    if req.fullname.trim().is_empty() {
        return Err(ApiError::Validation("Fullname is required".into()));
    }
    if !email_ok(&req.email) {
        return Err(ApiError::Validation("Email must be a valid email address".into()));
    }
    if !password_policy(&req.password) {
        return Err(ApiError::Validation(PASSWORD_RULE.into()));
    }
    Ok(())
}

pub fn login(req: &LoginRequest) -> Result<(), ApiError> {
    if req.email.trim().is_empty() {
        return Err(ApiError::Validation("Email is required".into()));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("Password is required".into()));
    }
    Ok(())
}

pub fn profile_update(req: &UpdateProfileRequest) -> Result<(), ApiError> {
    if let Some(password) = &req.password {
        if !password_policy(password) {
            return Err(ApiError::Validation(PASSWORD_RULE.into()));
        }
    }
    Ok(())
}

const PASSWORD_RULE: &str = "Password must be at least 8 characters long and contain at least one lowercase letter, one uppercase letter, and one number";

/// At least 8 alphanumeric characters with one lowercase, one uppercase,
/// and one digit.
pub fn password_policy(password: &str) -> bool {
    password.len() >= 8
        && password.chars().all(|c| c.is_ascii_alphanumeric())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

fn email_ok(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    domain.split('.').count() >= 2 && domain.split('.').all(|part| !part.is_empty())
}
