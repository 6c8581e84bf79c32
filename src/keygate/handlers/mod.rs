pub mod callback;
pub use self::callback::callback;

pub mod health;
pub use self::health::health;

pub mod logout;
pub use self::logout::logout;

pub mod me;
pub use self::me::me;

pub mod security;
pub use self::security::{guard, AuthenticatedProfiles};

// common functions for the stages
use axum::{
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

use super::{
    client::UserProfile,
    context::RequestContext,
    session::{SessionError, PROFILES_KEY},
};

/// Profiles saved by a completed callback; empty when none or unreadable.
pub(crate) fn session_profiles(ctx: &RequestContext) -> Vec<UserProfile> {
    match ctx.session_get(PROFILES_KEY) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            error!("Discarding unreadable session profiles: {err}");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(err) => {
            error!("Failed to load session profiles: {err}");
            Vec::new()
        }
    }
}

/// Store `profile`, replacing any previous profile from the same client.
pub(crate) fn save_session_profile(
    ctx: &mut RequestContext,
    profile: UserProfile,
) -> Result<(), SessionError> {
    let mut profiles = session_profiles(ctx);
    profiles.retain(|existing| existing.client_name != profile.client_name);
    profiles.push(profile);
    let raw = serde_json::to_string(&profiles)
        .map_err(|err| SessionError::Unavailable(err.to_string()))?;
    ctx.session_set(PROFILES_KEY, raw)
}

/// `302 Found` to `location`.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

pub async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}
