use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

/// Mints and verifies bearer tokens of the form `user_id.expiry.signature`
/// where the signature is a hex sha256 over the payload and the server
/// secret. The token carries the caller identity; nothing is stored
/// server-side.
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    expiry_hours: i64,
}

impl TokenService {
    pub fn new(secret: impl Into<String>, expiry_hours: i64) -> Self {
        Self {
            secret: secret.into(),
            expiry_hours,
        }
    }

    pub fn issue(&self, user_id: Uuid) -> String {
        let expires_at = (Utc::now() + Duration::hours(self.expiry_hours)).timestamp();
        let payload = format!("{}.{}", user_id, expires_at);
        let signature = self.sign(&payload);
        format!("{}.{}", payload, signature)
    }

    /// The caller's user id, if the token is well-formed, untampered, and
    /// unexpired.
    pub fn verify(&self, token: &str) -> Option<Uuid> {
        let (payload, signature) = token.rsplit_once('.')?;
        if self.sign(payload) != signature {
            return None;
        }

        let (user_id, expires_at) = payload.split_once('.')?;
        let expires_at: i64 = expires_at.parse().ok()?;
        if expires_at < Utc::now().timestamp() {
            return None;
        }

        Uuid::parse_str(user_id).ok()
    }

    fn sign(&self, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b".");
        hasher.update(payload.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Hash a password as `salt$digest`, both hex, with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    format!("{}${}", hex::encode(salt), hex::encode(digest(&salt, password)))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        // Sentinel hashes (e.g. the FX user's) carry no salt separator and
        // can never verify.
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    hex::encode(digest(&salt, password)) == digest_hex
}

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

/// Axum extractor resolving the bearer token to the caller's user id.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(ApiError::unauthorized)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(ApiError::unauthorized)?;

        let user_id = state
            .tokens
            .verify(token)
            .ok_or_else(ApiError::unauthorized)?;

        Ok(AuthUser(user_id))
    }
}
