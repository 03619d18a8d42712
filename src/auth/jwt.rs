use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use std::env;

use super::model::Claims;

pub const DEFAULT_JWT_SECRET: &str = "office-forms-jwt-secret-change-in-production";
const ACCESS_TOKEN_EXPIRY_SECONDS: i64 = 60 * 60; // 1 hour

fn get_jwt_secret() -> String {
    env::var("SUPABASE_JWT_SECRET").unwrap_or_else(|_| {
        log::warn!("SUPABASE_JWT_SECRET not set, using default secret. SET THIS IN PRODUCTION!");
        DEFAULT_JWT_SECRET.to_string()
    })
}

/// Issue an access token signed with the shared secret.
///
/// Production tokens come from the auth provider; this is used by tooling and tests.
pub fn generate_access_token(
    user_id: &str,
    email: Option<&str>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.map(str::to_string),
        role: Some("authenticated".to_string()),
        exp: now + ACCESS_TOKEN_EXPIRY_SECONDS as usize,
        iat: now,
    };

    let secret = get_jwt_secret();
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Validate and decode a token
pub fn validate_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let secret = get_jwt_secret();
    let mut validation = Validation::default();
    // Provider tokens carry an audience we do not pin.
    validation.validate_aud = false;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(token_data.claims)
}
