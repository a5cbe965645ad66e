//! Relay access token check

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

use crate::app::AppState;

/// `?auth=` query parameter, as sent by hosted-relay clients
#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    auth: Option<String>,
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing auth token")]
    MissingToken,

    #[error("Invalid auth token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

/// Middleware requiring the configured relay token, when one is set
pub async fn require_token(
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if let Some(expected) = state.config.relay_auth.as_deref() {
        let token = query.auth.ok_or(AuthError::MissingToken)?;
        if token != expected {
            debug!(path = %request.uri().path(), "Rejected relay request with bad token");
            return Err(AuthError::InvalidToken);
        }
    }
    Ok(next.run(request).await)
}
