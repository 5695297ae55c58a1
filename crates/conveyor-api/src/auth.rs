//! System-claim extraction for machine endpoints.
//!
//! Workers register with a shared system token. The layer attaches a
//! verdict to every request; handlers that require the system claim check
//! it and answer 403 otherwise.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;

/// Authentication verdict attached to each request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthClaims {
    /// The caller presented the system token.
    pub system: bool,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Middleware attaching [`AuthClaims`] to the request extensions.
pub async fn attach_claims(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let system = match (&state.system_token, bearer_token(request.headers())) {
        (Some(expected), Some(presented)) => expected == presented,
        _ => false,
    };

    request.extensions_mut().insert(AuthClaims { system });
    next.run(request).await
}
