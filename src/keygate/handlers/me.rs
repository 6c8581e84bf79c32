use axum::{
    extract::Extension,
    response::{IntoResponse, Json},
};

use super::AuthenticatedProfiles;

/// Profiles of the caller, as established by the security stage.
pub async fn me(Extension(profiles): Extension<AuthenticatedProfiles>) -> impl IntoResponse {
    Json(profiles.0)
}
