// Service credential for the task service's post-commit hooks. End-user
// tokens are never accepted here.

use std::sync::Arc;

use anyhow::ensure;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{ErrorCode, RelayError};

const MIN_HOOK_SECRET_BYTES: usize = 32;

/// Shared secret the task service presents as `Authorization: Bearer <secret>`.
pub struct HookSecret(Vec<u8>);

impl HookSecret {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        ensure!(
            secret.len() >= MIN_HOOK_SECRET_BYTES,
            "hook secret must be at least {MIN_HOOK_SECRET_BYTES} bytes"
        );
        Ok(Self(secret.as_bytes().to_vec()))
    }

    /// Compares without short-circuiting on the first differing byte.
    fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.as_bytes();
        candidate.len() == self.0.len()
            && self.0.iter().zip(candidate).fold(0u8, |diff, (left, right)| diff | (left ^ right))
                == 0
    }
}

impl std::fmt::Debug for HookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HookSecret(..)")
    }
}

pub async fn require_hook_secret(
    State(secret): State<Arc<HookSecret>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("Bearer"))
        .map(|(_, token)| token.trim());

    match presented {
        Some(token) if secret.matches(token) => next.run(request).await,
        Some(_) => RelayError::new(ErrorCode::AuthInvalidToken, "invalid hook credential")
            .into_response(),
        None => RelayError::new(ErrorCode::AuthInvalidToken, "missing hook credential")
            .into_response(),
    }
}
