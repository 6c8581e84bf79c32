//! Direct client checking `Authorization: Bearer <token>` against a static
//! token table.

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::debug;

use super::{
    client::{ClientError, CredentialChecker, UserProfile},
    context::RequestContext,
};

pub struct BearerTokenClient {
    name: String,
    tokens: Vec<(String, SecretString)>,
}

impl BearerTokenClient {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tokens: Vec::new(),
        }
    }

    /// Accept `token` as proof of identity for `subject`.
    #[must_use]
    pub fn with_token(mut self, subject: impl Into<String>, token: SecretString) -> Self {
        self.tokens.push((subject.into(), token));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn subject_for(&self, presented: &str) -> Option<&str> {
        // Compare against every entry so timing does not reveal the match position.
        let mut found = None;
        for (subject, token) in &self.tokens {
            let matched: bool = token
                .expose_secret()
                .as_bytes()
                .ct_eq(presented.as_bytes())
                .into();
            if matched && found.is_none() {
                found = Some(subject.as_str());
            }
        }
        found
    }
}

#[async_trait]
impl CredentialChecker for BearerTokenClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authenticate(&self, ctx: &RequestContext) -> Result<Option<UserProfile>, ClientError> {
        let Some(token) = extract_bearer_token(ctx) else {
            return Ok(None);
        };
        match self.subject_for(token) {
            Some(subject) => Ok(Some(UserProfile::new(subject, self.name.as_str()))),
            None => {
                debug!("Unknown bearer token presented to {}", self.name);
                Err(ClientError::InvalidCredentials(
                    "unknown bearer token".to_string(),
                ))
            }
        }
    }
}

fn extract_bearer_token(ctx: &RequestContext) -> Option<&str> {
    let trimmed = ctx.request_header(AUTHORIZATION.as_str())?.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
