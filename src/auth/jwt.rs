//! Bearer token issuance/verification (spec.md §6).
//!
//! Open Question resolved (spec.md §9): the source's `verify_token`
//! rejects any token whose `type` claim isn't `"access"`, which makes the
//! `/refresh` handler's downstream `token_type == "refresh"` check dead
//! code — grounded at
//! `original_source/backend/core/infrastructure/auth/security.py`. Here
//! `verify_access_token` and `verify_refresh_token` are symmetric: each
//! checks its own expected `type` claim.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn sign(user_id: i64, token_type: TokenType, ttl: Duration, secret: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + ttl).timestamp(),
        token_type,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn create_access_token(user_id: i64, secret: &str, expire_minutes: i64) -> anyhow::Result<String> {
    sign(
        user_id,
        TokenType::Access,
        Duration::minutes(expire_minutes),
        secret,
    )
}

pub fn create_refresh_token(user_id: i64, secret: &str, expire_days: i64) -> anyhow::Result<String> {
    sign(
        user_id,
        TokenType::Refresh,
        Duration::days(expire_days),
        secret,
    )
}

fn verify(token: &str, secret: &str, expected: TokenType) -> Option<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    if data.claims.token_type != expected {
        return None;
    }
    Some(data.claims)
}

pub fn verify_access_token(token: &str, secret: &str) -> Option<Claims> {
    verify(token, secret, TokenType::Access)
}

pub fn verify_refresh_token(token: &str, secret: &str) -> Option<Claims> {
    verify(token, secret, TokenType::Refresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn access_token_round_trips_and_rejects_as_refresh() {
        let token = create_access_token(42, SECRET, 30).unwrap();
        let claims = verify_access_token(&token, SECRET).expect("valid access token");
        assert_eq!(claims.sub, "42");
        assert!(verify_refresh_token(&token, SECRET).is_none());
    }

    #[test]
    fn refresh_token_round_trips_and_rejects_as_access() {
        let token = create_refresh_token(7, SECRET, 7).unwrap();
        assert!(verify_refresh_token(&token, SECRET).is_some());
        assert!(verify_access_token(&token, SECRET).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_access_token(1, SECRET, 30).unwrap();
        assert!(verify_access_token(&token, "other-secret").is_none());
    }
}
