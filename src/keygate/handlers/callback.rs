use axum::{
    extract::{Extension, Request},
    http::StatusCode,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use super::{found, save_session_profile};
use crate::keygate::{
    client::{AuthenticationClient, HandshakeError},
    error::GatewayError,
    redirect::{resolve_redirect_target, HASH_LOCATION_PARAM},
    session::REQUESTED_URL_KEY,
    GatewayState, CLIENT_NAME_PARAM,
};

/// Complete a central login and send the browser back where it started.
///
/// XHR callers get `200` with the fresh CSRF token in headers; browsers get a
/// `302` to the remembered URL (or the default URL).
#[instrument(skip_all)]
pub async fn callback(Extension(state): Extension<Arc<GatewayState>>, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    let mut ctx = state.context(&parts);
    let config = state.config();
    let clients = config.clients();

    let client_name = ctx.request_parameter(CLIENT_NAME_PARAM).map(ToString::to_string);
    let selected = match client_name.as_deref() {
        Some(name) => clients.find(name),
        None => clients.default_client(),
    };
    let client = match selected {
        Some(AuthenticationClient::Central(client)) => client.clone(),
        Some(AuthenticationClient::Direct(client)) => {
            warn!("Callback requested for direct client {}", client.name());
            return ctx.finish(GatewayError::HandshakeFailure {
                client: client.name().to_string(),
                source: HandshakeError::unauthorized("direct clients have no callback"),
            });
        }
        None => {
            let name = client_name.unwrap_or_default();
            warn!("Callback requested for unknown client '{name}'");
            return ctx.finish(GatewayError::HandshakeFailure {
                client: name,
                source: HandshakeError::unauthorized("unknown client"),
            });
        }
    };

    let profile = match client.complete(&mut ctx).await {
        Ok(profile) => profile,
        Err(err) => {
            warn!("Callback for {} failed: {err}", client.name());
            return ctx.finish(GatewayError::HandshakeFailure {
                client: client.name().to_string(),
                source: err,
            });
        }
    };
    debug!("Authenticated {} with {}", profile.id, client.name());

    // New identity, new session id.
    if let Err(err) = ctx.renew_session() {
        error!("Failed to renew session: {err}");
        return ctx.finish(GatewayError::from(err));
    }
    if let Err(err) = save_session_profile(&mut ctx, profile) {
        error!("Failed to save profile: {err}");
        return ctx.finish(GatewayError::from(err));
    }

    let requested_url = ctx.session_get(REQUESTED_URL_KEY).unwrap_or_else(|err| {
        error!("Failed to read remembered url: {err}");
        None
    });
    if let Err(err) = ctx.session_remove(REQUESTED_URL_KEY) {
        error!("Failed to clear remembered url: {err}");
    }

    let target = resolve_redirect_target(
        requested_url.as_deref(),
        state.settings().base_url(),
        ctx.request_parameter(HASH_LOCATION_PARAM),
    )
    .unwrap_or_else(|| state.settings().default_url().to_string());

    config.csrf_issue().issue_with_header(&mut ctx);

    if ctx.is_xhr() {
        ctx.finish(StatusCode::OK)
    } else {
        ctx.finish(found(&target))
    }
}
