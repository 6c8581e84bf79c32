use axum::{
    extract::{Extension, Request},
    response::{Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use super::{found, session_profiles};
use crate::keygate::{
    client::{AuthenticationClient, UserProfile},
    context::RequestContext,
    error::GatewayError,
    GatewayState,
};

pub const URL_PARAM: &str = "url";

/// End the local session and, when enabled, the central one.
///
/// The `url` parameter is honored only when it is a safe redirect target that
/// fully matches the configured logout URL pattern; anything else falls back to
/// the default logout URL.
#[instrument(skip_all)]
pub async fn logout(Extension(state): Extension<Arc<GatewayState>>, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    let mut ctx = state.context(&parts);
    let settings = state.settings();

    let requested = ctx
        .request_parameter(URL_PARAM)
        .filter(|url| !url.trim().is_empty());
    let redirect_url = match requested {
        Some(url) if state.allows_logout_url(url) => url.to_string(),
        Some(url) => {
            debug!("Ignoring logout url '{url}' not allowed");
            settings.logout_url().to_string()
        }
        None => settings.logout_url().to_string(),
    };

    let profiles = session_profiles(&ctx);

    if settings.local_logout() {
        if let Err(err) = ctx.destroy_session() {
            error!("{}", GatewayError::LogoutPartialFailure(err.to_string()));
        }
    }

    let central = if settings.central_logout() {
        central_logout_url(&state, &ctx, &profiles, &redirect_url).await
    } else {
        None
    };
    let location = central.unwrap_or(redirect_url);

    if ctx.is_xhr() {
        ctx.finish(Json(json!({ "redirect_url": location })))
    } else {
        ctx.finish(found(&location))
    }
}

/// Logout URL from the first central client that offers one.
async fn central_logout_url(
    state: &GatewayState,
    ctx: &RequestContext,
    profiles: &[UserProfile],
    redirect_url: &str,
) -> Option<String> {
    let target = ctx.absolute_url(redirect_url);
    for profile in profiles {
        let Some(AuthenticationClient::Central(client)) =
            state.config().clients().find(&profile.client_name)
        else {
            continue;
        };
        match client.logout_url(ctx, profile, &target).await {
            Ok(Some(url)) => {
                debug!("Central logout through {}", client.name());
                return Some(url);
            }
            Ok(None) => {}
            Err(err) => error!(
                "{}",
                GatewayError::LogoutPartialFailure(format!("{}: {err}", client.name()))
            ),
        }
    }
    None
}
