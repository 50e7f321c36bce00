use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::config::ConfigError;
use crate::error::ApiError;
use crate::schema::{Id, User, UserRole};

use super::permissions::ActionType;

/// Signing key plus token lifetime, shared by every request.
#[derive(Clone)]
pub struct SessionKey {
    key: Hmac<Sha256>,
    ttl: Duration,
}

impl SessionKey {
    pub fn new(secret: &str, ttl_hours: i64) -> Result<Self, ConfigError> {
        let key = Hmac::new_from_slice(secret.as_bytes()).map_err(|e| ConfigError::Invalid {
            key: String::from("SECRET_KEY"),
            info: e.to_string(),
        })?;

        Ok(Self {
            key,
            ttl: Duration::hours(ttl_hours),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, role: UserRole, ttl: Duration) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + ttl).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), ApiError> {
        if !action.authenticate(self) {
            return Err(ApiError::Forbidden(String::from(
                "You do not have permission to perform this action.",
            )));
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            username: value.username,
            role: value.role,
        }
    }
}

pub fn generate_jwt_session(user: &User, key: &SessionKey) -> Result<String, ApiError> {
    let claims = JwtSessionData::new(user.id, user.username.to_owned(), user.role, key.ttl);

    claims
        .sign_with_key(&key.key)
        .map_err(|e| ApiError::Internal(format!("Failed to sign session: {e}")))
}

pub fn verify_jwt_session(token: &str, key: &SessionKey) -> Result<JwtSessionData, ApiError> {
    let session: JwtSessionData = token
        .verify_with_key(&key.key)
        .map_err(|_| ApiError::Unauthorized(String::from("Invalid token.")))?;

    let now = Local::now().timestamp();
    if (session.exp - now).is_negative() {
        return Err(ApiError::Unauthorized(String::from("Token expired.")));
    }

    Ok(session)
}
