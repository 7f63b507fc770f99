// SPDX-License-Identifier: GPL-3.0-or-later
//! HTTP Basic Auth (spec §6). A no-op when no password is configured;
//! otherwise every request under `/api/v1` must present a matching
//! username/password pair, compared in constant time so response timing
//! cannot be used to brute-force the credential byte by byte.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cratedig_config::AuthConfig;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::state::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.is_enabled() {
        return next.run(request).await;
    }

    match headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(decode_basic)
    {
        Some((user, pass)) if credentials_match(&state.auth, &user, &pass) => {
            next.run(request).await
        }
        _ => {
            debug!(target: "auth", "rejected request with missing or invalid credentials");
            unauthorized()
        }
    }
}

fn decode_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn credentials_match(auth: &AuthConfig, user: &str, pass: &str) -> bool {
    let expected_user = auth.username.as_deref().unwrap_or("");
    let expected_pass = auth.password.as_deref().unwrap_or("");
    let user_ok: bool = expected_user.as_bytes().ct_eq(user.as_bytes()).into();
    let pass_ok: bool = expected_pass.as_bytes().ct_eq(pass.as_bytes()).into();
    user_ok & pass_ok
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Basic realm=\"cratedig\"")],
        "Unauthorized",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_basic_splits_user_and_pass() {
        let header = format!("Basic {}", BASE64.encode("alice:secret"));
        let (user, pass) = decode_basic(&header).unwrap();
        assert_eq!(user, "alice");
        assert_eq!(pass, "secret");
    }

    #[test]
    fn decode_basic_rejects_non_basic_schemes() {
        assert!(decode_basic("Bearer abc123").is_none());
    }

    #[test]
    fn credentials_match_requires_both_fields() {
        let auth = AuthConfig {
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
        };
        assert!(credentials_match(&auth, "alice", "secret"));
        assert!(!credentials_match(&auth, "alice", "wrong"));
        assert!(!credentials_match(&auth, "bob", "secret"));
    }
}
