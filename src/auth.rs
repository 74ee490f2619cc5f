//! Bearer token authentication.
//!
//! Tokens are opaque strings minted by `pagewise token create`. Only a
//! SHA-256 digest is stored in `api_tokens`; the plaintext is printed once
//! at mint time and cannot be recovered. Requests authenticate with
//! `Authorization: Bearer <token>`, and any failure on that path (missing
//! header, malformed value, unknown token) maps to the same
//! [`ChatError::Unauthenticated`] so callers cannot probe which part failed.

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::ChatError;
use crate::store::now_ms;

/// Hex SHA-256 digest of a token, as stored in `api_tokens.token_hash`.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Mint a new token for `user_id` and return its plaintext form.
pub async fn create_token(pool: &SqlitePool, user_id: &str) -> Result<String, sqlx::Error> {
    let token = format!("pw_{}", Uuid::new_v4().simple());

    sqlx::query("INSERT INTO api_tokens (token_hash, user_id, created_at) VALUES (?, ?, ?)")
        .bind(hash_token(&token))
        .bind(user_id)
        .bind(now_ms())
        .execute(pool)
        .await?;

    Ok(token)
}

/// Resolve a plaintext token to its user id, or `None` if unknown.
pub async fn resolve_token(
    pool: &SqlitePool,
    token: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT user_id FROM api_tokens WHERE token_hash = ?")
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authenticate an incoming request, returning the caller's user id.
pub async fn authenticate(pool: &SqlitePool, headers: &HeaderMap) -> Result<String, ChatError> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ChatError::Unauthenticated)?;

    let token = bearer_token(header_value).ok_or(ChatError::Unauthenticated)?;

    let user_id = resolve_token(pool, token).await?;
    user_id.ok_or(ChatError::Unauthenticated)
}
