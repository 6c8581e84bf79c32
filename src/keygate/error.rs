use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use super::{client::HandshakeError, session::SessionError};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("direct client '{0}' must be added before central clients")]
    InvalidRegistrationOrder(String),
    #[error("client '{0}' is already registered")]
    DuplicateClient(String),
    #[error("at least one authentication client must be registered")]
    EmptyRegistry,
    #[error("invalid logout url pattern: {0}")]
    InvalidLogoutPattern(#[from] regex::Error),
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
    #[error("handshake with client '{client}' failed: {source}")]
    HandshakeFailure {
        client: String,
        #[source]
        source: HandshakeError,
    },
    #[error("csrf token rejected")]
    CsrfRejected,
    #[error("no authenticated profile")]
    ProfileMissing,
    #[error("malformed remembered url '{url}': {reason}")]
    MalformedRedirectState { url: String, reason: String },
    #[error("logout step failed: {0}")]
    LogoutPartialFailure(String),
    #[error("session store error: {0}")]
    Session(#[from] SessionError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            Self::HandshakeFailure { source, .. } => source.into_response(),
            Self::CsrfRejected => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            Self::ProfileMissing => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_rejected_is_forbidden() {
        let response = GatewayError::CsrfRejected.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn profile_missing_is_unauthorized() {
        let response = GatewayError::ProfileMissing.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn handshake_failure_keeps_provider_status() {
        let err = GatewayError::HandshakeFailure {
            client: "sso".to_string(),
            source: HandshakeError::new(StatusCode::BAD_GATEWAY, "provider down"),
        };
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn session_errors_are_internal() {
        let err = GatewayError::from(SessionError::Unavailable("locked".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn registration_order_message_names_client() {
        let err = GatewayError::InvalidRegistrationOrder("basic".to_string());
        assert!(err.to_string().contains("'basic'"));
    }
}
