use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role stored in `user_roles` for users allowed to manage other users' documents.
pub const ADMIN_ROLE: &str = "admin";

/// JWT claims issued by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

impl Claims {
    /// The subject as a user id. Tokens for non-user subjects have none.
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}
