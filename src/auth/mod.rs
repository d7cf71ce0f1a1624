use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Pk;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Pk,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Pk, role: impl Into<String>, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            user_id,
            role: role.into(),
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),

    #[error("JWT secret not configured")]
    InvalidSecret,
}

pub fn generate_jwt(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let token_data = decode::<Claims>(token, &decoding_key, &Validation::default())
        .map_err(|e| JwtError::InvalidToken(e.to_string()))?;

    Ok(token_data.claims)
}

/// Identity of whoever issued the request; anonymous when `id` is `None`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Caller {
    pub id: Option<Pk>,
    pub role: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: impl Into<Pk>, role: impl Into<String>) -> Self {
        Self { id: Some(id.into()), role: Some(role.into()) }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }
}

impl From<Claims> for Caller {
    fn from(claims: Claims) -> Self {
        Self { id: Some(claims.user_id), role: Some(claims.role) }
    }
}

/// Maps a caller to the role its policies are resolved under
pub trait Authenticator: Send + Sync {
    fn authenticated_role(&self, caller: &Caller) -> String;
}

/// Trusts the role carried in verified token claims
#[derive(Debug, Clone)]
pub struct ClaimsAuthenticator {
    anonymous_role: String,
}

impl ClaimsAuthenticator {
    pub fn new(anonymous_role: impl Into<String>) -> Self {
        Self { anonymous_role: anonymous_role.into() }
    }
}

impl Default for ClaimsAuthenticator {
    fn default() -> Self {
        Self::new("anonymous")
    }
}

impl Authenticator for ClaimsAuthenticator {
    fn authenticated_role(&self, caller: &Caller) -> String {
        match (&caller.id, &caller.role) {
            (Some(_), Some(role)) => role.clone(),
            _ => self.anonymous_role.clone(),
        }
    }
}

impl<F> Authenticator for F
where
    F: Fn(&Caller) -> String + Send + Sync,
{
    fn authenticated_role(&self, caller: &Caller) -> String {
        self(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_jwt_round_trip_carries_role() {
        let claims = Claims::new(json!(42), "admin", 1);
        let token = generate_jwt(&claims, "secret").unwrap();
        let decoded = validate_jwt(&token, "secret").unwrap();
        assert_eq!(decoded.user_id, json!(42));
        assert_eq!(Caller::from(decoded), Caller::user(42, "admin"));
        assert!(validate_jwt(&token, "other").is_err());
    }

    #[test]
    fn test_anonymous_callers_get_anonymous_role() {
        let auth = ClaimsAuthenticator::new("guest");
        assert_eq!(auth.authenticated_role(&Caller::anonymous()), "guest");
        assert_eq!(auth.authenticated_role(&Caller::user(1, "user")), "user");
    }
}
