//! Security stage: every protected request passes through [`guard`].
//!
//! 1. Direct clients are tried in registration order, then the session.
//! 2. Without a profile, browser navigations are sent to a central client;
//!    XHR calls and direct-only setups get `401`.
//! 3. All configured authorizers run in order; any refusal is a `403`.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};
use url::form_urlencoded;

use super::session_profiles;
use crate::keygate::{
    client::{AuthenticationClient, ChallengeRedirector, UserProfile},
    context::RequestContext,
    error::GatewayError,
    session::REQUESTED_URL_KEY,
    GatewayState, CLIENT_NAME_PARAM,
};

/// Request extension carrying the profiles that passed the security stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthenticatedProfiles(pub Vec<UserProfile>);

impl AuthenticatedProfiles {
    #[must_use]
    pub fn primary(&self) -> Option<&UserProfile> {
        self.0.first()
    }
}

#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn guard(
    Extension(state): Extension<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let mut ctx = state.context(&parts);
    let config = state.config();

    let mut profiles = direct_profiles(&state, &ctx).await;
    if profiles.is_empty() {
        profiles = session_profiles(&ctx);
    }

    if profiles.is_empty() {
        if !ctx.is_xhr() {
            if let Some(client) = challenge_client(&state, &ctx) {
                return challenge(&state, ctx, client).await;
            }
        }
        debug!("No profile for {}", ctx.uri().path());
        return ctx.finish(GatewayError::ProfileMissing);
    }

    for (name, authorizer) in config.authorizers() {
        if !authorizer.is_authorized(&mut ctx, &profiles) {
            warn!("Authorizer {name} denied {} {}", ctx.method(), ctx.uri().path());
            return ctx.finish(GatewayError::CsrfRejected);
        }
    }

    parts.extensions.insert(AuthenticatedProfiles(profiles));
    let response = next.run(Request::from_parts(parts, body)).await;
    ctx.finish(response)
}

/// First profile produced by a direct client; failures fall through to the next one.
async fn direct_profiles(state: &GatewayState, ctx: &RequestContext) -> Vec<UserProfile> {
    for client in state.config().clients().clients() {
        let AuthenticationClient::Direct(checker) = client else {
            continue;
        };
        match checker.authenticate(ctx).await {
            Ok(Some(profile)) => {
                debug!("Authenticated {} with direct client {}", profile.id, checker.name());
                return vec![profile];
            }
            Ok(None) => {}
            Err(err) => warn!("Direct client {} rejected credentials: {err}", checker.name()),
        }
    }
    Vec::new()
}

/// The central client named by `client_name`, otherwise the first one.
fn challenge_client(
    state: &GatewayState,
    ctx: &RequestContext,
) -> Option<Arc<dyn ChallengeRedirector>> {
    let clients = state.config().clients();
    if !clients.has_central_clients() {
        return None;
    }
    let requested = ctx
        .request_parameter(CLIENT_NAME_PARAM)
        .and_then(|name| clients.find(name));
    let fallback = || {
        clients.clients().iter().find_map(|client| match client {
            AuthenticationClient::Central(redirector) => Some(redirector),
            AuthenticationClient::Direct(_) => None,
        })
    };

    match requested {
        Some(AuthenticationClient::Central(redirector)) => Some(redirector.clone()),
        _ => fallback().cloned(),
    }
}

async fn challenge(
    state: &GatewayState,
    mut ctx: RequestContext,
    client: Arc<dyn ChallengeRedirector>,
) -> Response {
    let requested_url = ctx.full_request_url();
    if let Err(err) = ctx.session_set(REQUESTED_URL_KEY, requested_url) {
        error!("Failed to remember requested url: {err}");
        return ctx.finish(GatewayError::from(err));
    }

    let callback = callback_url(
        &ctx.absolute_url(state.settings().callback_url()),
        client.name(),
    );
    match client.challenge(&mut ctx, &callback).await {
        Ok(location) => {
            debug!("Redirecting to {} for login", client.name());
            ctx.finish(super::found(&location))
        }
        Err(err) => {
            error!("Challenge with {} failed: {err}", client.name());
            ctx.finish(GatewayError::ProfileMissing)
        }
    }
}

/// `callback` with `client_name=<name>` appended to its query.
fn callback_url(callback: &str, client_name: &str) -> String {
    let param: String = form_urlencoded::Serializer::new(String::new())
        .append_pair(CLIENT_NAME_PARAM, client_name)
        .finish();
    let separator = if callback.contains('?') { '&' } else { '?' };
    format!("{callback}{separator}{param}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_url_appends_client_name() {
        assert_eq!(
            callback_url("https://host/app/callback", "oidc"),
            "https://host/app/callback?client_name=oidc"
        );
        assert_eq!(
            callback_url("https://host/cb?tenant=a", "my client"),
            "https://host/cb?tenant=a&client_name=my+client"
        );
    }

    #[test]
    fn primary_profile_is_first() {
        let profiles = AuthenticatedProfiles(vec![
            UserProfile::new("alice", "oidc"),
            UserProfile::new("bob", "token"),
        ]);
        assert_eq!(profiles.primary().map(|p| p.id.as_str()), Some("alice"));
        assert!(AuthenticatedProfiles::default().primary().is_none());
    }
}
