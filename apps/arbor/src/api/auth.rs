//! # Identity Token Extraction
//!
//! The HTTP layer does not authenticate. It forwards the caller's token to
//! the engine, which looks it up through the unique index on `User.token`
//! when permissions are enforced.
//!
//! ```text
//! Authorization: Bearer <token>
//! ```

use axum::http::{HeaderMap, header};

/// The token from the `Authorization` header.
///
/// Accepts `Bearer <token>` and a raw `<token>`. Missing, empty or
/// non-ASCII headers yield `None`.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then(|| token.to_string())
}
