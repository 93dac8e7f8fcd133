use axum::{http::StatusCode, response::IntoResponse, Json};

use super::{
    metrics::{record_auth_failure, record_rate_limit_hit},
    types::AuthError,
};

#[derive(Debug)]
pub(crate) enum AuthFailure {
    InvalidRequest,
    MissingToken,
    InvalidToken,
    ForbiddenOrigin,
    RateLimited,
    Internal,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::MissingToken => record_auth_failure("missing_token"),
            Self::InvalidToken => record_auth_failure("invalid_token"),
            Self::ForbiddenOrigin => record_auth_failure("forbidden_origin"),
            Self::RateLimited => record_rate_limit_hit("http", "auth_failure"),
            Self::InvalidRequest | Self::Internal => {}
        }

        match self {
            Self::InvalidRequest => (
                StatusCode::BAD_REQUEST,
                Json(AuthError {
                    error: "invalid_request",
                }),
            )
                .into_response(),
            Self::MissingToken => (
                StatusCode::UNAUTHORIZED,
                Json(AuthError {
                    error: "missing_token",
                }),
            )
                .into_response(),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                Json(AuthError {
                    error: "invalid_token",
                }),
            )
                .into_response(),
            Self::ForbiddenOrigin => (
                StatusCode::FORBIDDEN,
                Json(AuthError {
                    error: "origin_not_allowed",
                }),
            )
                .into_response(),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(AuthError {
                    error: "rate_limited",
                }),
            )
                .into_response(),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AuthError {
                    error: "internal_error",
                }),
            )
                .into_response(),
        }
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_span_list(true)
        .init();
}
