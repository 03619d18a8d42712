use actix_web::error::{ErrorForbidden, ErrorInternalServerError, ErrorUnauthorized};
use actix_web::{Error, HttpRequest};
use uuid::Uuid;

use super::jwt::validate_token;
use super::model::Claims;
use crate::AppState;

/// Extract token from Authorization header
fn extract_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

/// Validate token from HttpRequest and return claims
pub fn validate_request_token(req: &HttpRequest) -> Result<Claims, Error> {
    let token =
        extract_token(req).ok_or_else(|| ErrorUnauthorized("Missing authorization token"))?;

    validate_token(&token).map_err(|e| {
        log::warn!("Token validation failed: {:?}", e);
        ErrorUnauthorized("Invalid or expired token")
    })
}

/// Validate the request token and return the caller's user id.
pub fn authenticated_user(req: &HttpRequest) -> Result<Uuid, Error> {
    let claims = validate_request_token(req)?;
    claims
        .user_id()
        .ok_or_else(|| ErrorUnauthorized("Token subject is not a user"))
}

/// Like [`authenticated_user`], but the caller must also hold the admin role.
pub async fn require_admin(req: &HttpRequest, state: &AppState) -> Result<Uuid, Error> {
    let user_id = authenticated_user(req)?;

    let is_admin = state.is_admin(&user_id).await.map_err(|e| {
        log::error!("Failed to look up roles for {}: {:?}", user_id, e);
        ErrorInternalServerError("Failed to verify role")
    })?;

    if !is_admin {
        log::warn!("User {} attempted an admin operation", user_id);
        return Err(ErrorForbidden("Admin role required"));
    }

    Ok(user_id)
}
