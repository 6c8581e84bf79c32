//! Authentication clients.
//!
//! A client is either *direct* (credentials are checked on every request, no
//! redirect) or *central* (the browser is sent to an external identity source
//! and comes back on the callback path). The two capabilities are separate
//! traits; [`AuthenticationClient`] tags which one a registered client has.

use async_trait::async_trait;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};
use thiserror::Error;

use super::context::RequestContext;

/// Authenticated identity produced by a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub client_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl UserProfile {
    #[must_use]
    pub fn new(id: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_name: client_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Error raised by a client outside the callback handshake.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Session(#[from] super::session::SessionError),
}

/// Provider-side rejection of a callback; returned to the browser as-is.
#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct HandshakeError {
    pub status: StatusCode,
    pub message: String,
}

impl HandshakeError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// Stateless credential check evaluated on every request.
#[async_trait]
pub trait CredentialChecker: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `Ok(None)` when the request carries no credentials for this client.
    async fn authenticate(&self, ctx: &RequestContext) -> Result<Option<UserProfile>, ClientError>;
}

/// Redirect-based login against an external identity source.
#[async_trait]
pub trait ChallengeRedirector: Send + Sync {
    fn name(&self) -> &str;

    /// Build the provider login URL the browser is redirected to.
    ///
    /// `callback_url` is absolute and already carries the `client_name` parameter.
    async fn challenge(
        &self,
        ctx: &mut RequestContext,
        callback_url: &str,
    ) -> Result<String, ClientError>;

    /// Validate the provider's callback and produce the authenticated profile.
    async fn complete(&self, ctx: &mut RequestContext) -> Result<UserProfile, HandshakeError>;

    /// Provider logout URL, if the provider supports central logout.
    async fn logout_url(
        &self,
        _ctx: &RequestContext,
        _profile: &UserProfile,
        _target_url: &str,
    ) -> Result<Option<String>, ClientError> {
        Ok(None)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientKind {
    Direct,
    Central,
}

#[derive(Clone)]
pub enum AuthenticationClient {
    Direct(Arc<dyn CredentialChecker>),
    Central(Arc<dyn ChallengeRedirector>),
}

impl AuthenticationClient {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Direct(client) => client.name(),
            Self::Central(client) => client.name(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ClientKind {
        match self {
            Self::Direct(_) => ClientKind::Direct,
            Self::Central(_) => ClientKind::Central,
        }
    }
}

impl fmt::Debug for AuthenticationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationClient")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_serializes_without_empty_attributes() {
        let profile = UserProfile::new("alice", "sso");
        let json = serde_json::to_string(&profile).unwrap_or_default();
        assert_eq!(json, r#"{"id":"alice","client_name":"sso"}"#);
    }

    #[test]
    fn profile_round_trips_attributes() {
        let profile = UserProfile::new("alice", "sso").with_attribute("email", "a@example.com");
        let json = serde_json::to_string(&profile).unwrap_or_default();
        let decoded: Option<UserProfile> = serde_json::from_str(&json).ok();
        assert_eq!(decoded, Some(profile));
    }

    #[test]
    fn handshake_error_response_is_unmodified() {
        let response = HandshakeError::new(StatusCode::BAD_REQUEST, "state mismatch").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
