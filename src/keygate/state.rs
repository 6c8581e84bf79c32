//! Gateway state shared by every request worker.

use axum::http::request::Parts;
use regex::Regex;
use std::sync::Arc;

use super::{
    config::{ConfigProvider, GatewayConfig},
    context::RequestContext,
    error::GatewayError,
    redirect::is_safe_redirect_target,
    registry::ClientRegistry,
    session::SessionStore,
    settings::{AppSettings, GatewaySettings},
};

pub struct GatewayState {
    config: ConfigProvider,
    settings: Arc<GatewaySettings>,
    sessions: Arc<dyn SessionStore>,
    logout_pattern: Regex,
}

impl GatewayState {
    /// Resolve settings and take ownership of the sealed registry.
    ///
    /// # Errors
    /// Returns an error if the base URL or the logout URL pattern is invalid.
    pub fn new(
        registry: ClientRegistry,
        settings: &dyn AppSettings,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, GatewayError> {
        let settings = GatewaySettings::from_settings(settings)?;
        // Patterns must match the whole URL, not a substring of it.
        let logout_pattern = Regex::new(&format!("^(?:{})$", settings.logout_url_pattern()))?;

        Ok(Self {
            config: ConfigProvider::new(registry),
            settings: Arc::new(settings),
            sessions,
            logout_pattern,
        })
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        self.config.get()
    }

    #[must_use]
    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    #[must_use]
    pub fn logout_pattern(&self) -> &Regex {
        &self.logout_pattern
    }

    /// A requested post-logout URL is honored only when it stays on its
    /// apparent origin and fully matches the configured pattern.
    #[must_use]
    pub fn allows_logout_url(&self, url: &str) -> bool {
        is_safe_redirect_target(url) && self.logout_pattern.is_match(url)
    }

    #[must_use]
    pub fn context(&self, parts: &Parts) -> RequestContext {
        RequestContext::new(parts, self.settings.clone(), self.sessions.clone())
    }
}
