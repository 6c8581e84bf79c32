//! Application settings consumed by the gateway.

use std::collections::HashMap;
use url::Url;

use super::error::GatewayError;

pub const BASE_URL: &str = "application.base-url";
pub const AUTH_CALLBACK_URL: &str = "auth.callback.url";
pub const AUTH_LOGOUT_URL: &str = "auth.logout.url";
pub const AUTH_LOGOUT_URL_PATTERN: &str = "auth.logout.url.pattern";
pub const AUTH_LOGOUT_LOCAL: &str = "auth.logout.local";
pub const AUTH_LOGOUT_CENTRAL: &str = "auth.logout.central";
/// Serve `/health` without authentication.
pub const HEALTH_PUBLIC: &str = "application.health.public";

/// Relative URLs only.
pub const DEFAULT_LOGOUT_URL_PATTERN: &str = r"^(\/|\/[^\/].*)$";

/// Key/value settings lookup.
pub trait AppSettings: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(value) => match value.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => default,
            },
            None => default,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapSettings {
    values: HashMap<String, String>,
}

impl MapSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }
}

impl AppSettings for MapSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Settings resolved once at startup.
#[derive(Clone, Debug)]
pub struct GatewaySettings {
    base_url: Option<String>,
    base_path: String,
    callback_url: String,
    logout_url: String,
    logout_url_pattern: String,
    local_logout: bool,
    central_logout: bool,
    public_health: bool,
}

impl GatewaySettings {
    /// Resolve gateway settings.
    ///
    /// # Errors
    /// Returns an error if the base URL is set but cannot be parsed.
    pub fn from_settings(settings: &dyn AppSettings) -> Result<Self, GatewayError> {
        let base_url = non_blank(settings.get(BASE_URL)).map(|url| url.trim_end_matches('/').to_string());
        let base_path = match &base_url {
            Some(url) => Url::parse(url)
                .map_err(|err| GatewayError::InvalidSetting {
                    key: BASE_URL.to_string(),
                    reason: err.to_string(),
                })?
                .path()
                .trim_end_matches('/')
                .to_string(),
            None => String::new(),
        };

        let callback_url = non_blank(settings.get(AUTH_CALLBACK_URL))
            .unwrap_or_else(|| format!("{base_path}/callback"));

        let logout_url = non_blank(settings.get(AUTH_LOGOUT_URL))
            .or_else(|| non_blank(Some(base_path.clone())))
            .unwrap_or_else(|| ".".to_string());

        let logout_url_pattern = non_blank(settings.get(AUTH_LOGOUT_URL_PATTERN))
            .unwrap_or_else(|| DEFAULT_LOGOUT_URL_PATTERN.to_string());

        Ok(Self {
            base_url,
            base_path,
            callback_url,
            logout_url,
            logout_url_pattern,
            local_logout: settings.get_bool(AUTH_LOGOUT_LOCAL, true),
            central_logout: settings.get_bool(AUTH_LOGOUT_CENTRAL, false),
            public_health: settings.get_bool(HEALTH_PUBLIC, true),
        })
    }

    /// Absolute base URL without trailing slash, if configured.
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Path of the base URL; `/` when the gateway is mounted at the root.
    #[must_use]
    pub fn context_path(&self) -> &str {
        if self.base_path.is_empty() {
            "/"
        } else {
            &self.base_path
        }
    }

    #[must_use]
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    #[must_use]
    pub fn logout_url(&self) -> &str {
        &self.logout_url
    }

    #[must_use]
    pub fn logout_url_pattern(&self) -> &str {
        &self.logout_url_pattern
    }

    #[must_use]
    pub fn local_logout(&self) -> bool {
        self.local_logout
    }

    #[must_use]
    pub fn central_logout(&self) -> bool {
        self.central_logout
    }

    #[must_use]
    pub fn public_health(&self) -> bool {
        self.public_health
    }

    /// Where a completed callback lands when nothing was remembered.
    #[must_use]
    pub fn default_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or("/")
    }

    /// Cookies are marked `Secure` only when served over HTTPS.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url
            .as_deref()
            .is_some_and(|url| url.starts_with("https://"))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_base_url() -> Result<(), GatewayError> {
        let settings = GatewaySettings::from_settings(&MapSettings::new())?;
        assert_eq!(settings.base_url(), None);
        assert_eq!(settings.context_path(), "/");
        assert_eq!(settings.callback_url(), "/callback");
        assert_eq!(settings.logout_url(), ".");
        assert_eq!(settings.logout_url_pattern(), DEFAULT_LOGOUT_URL_PATTERN);
        assert!(settings.local_logout());
        assert!(!settings.central_logout());
        assert!(settings.public_health());
        assert_eq!(settings.default_url(), "/");
        assert!(!settings.secure_cookies());
        Ok(())
    }

    #[test]
    fn derives_urls_from_base_url() -> Result<(), GatewayError> {
        let map = MapSettings::new().with(BASE_URL, "https://erp.example.com/app/");
        let settings = GatewaySettings::from_settings(&map)?;
        assert_eq!(settings.base_url(), Some("https://erp.example.com/app"));
        assert_eq!(settings.context_path(), "/app");
        assert_eq!(settings.callback_url(), "/app/callback");
        assert_eq!(settings.logout_url(), "/app");
        assert_eq!(settings.default_url(), "https://erp.example.com/app");
        assert!(settings.secure_cookies());
        Ok(())
    }

    #[test]
    fn explicit_settings_win() -> Result<(), GatewayError> {
        let map = MapSettings::new()
            .with(BASE_URL, "http://localhost:8080")
            .with(AUTH_CALLBACK_URL, "https://sso.example.com/cb")
            .with(AUTH_LOGOUT_URL, "/bye")
            .with(AUTH_LOGOUT_URL_PATTERN, "https://example\\.com/.*")
            .with(AUTH_LOGOUT_LOCAL, "false")
            .with(AUTH_LOGOUT_CENTRAL, "true")
            .with(HEALTH_PUBLIC, "off");
        let settings = GatewaySettings::from_settings(&map)?;
        assert!(!settings.public_health());
        assert_eq!(settings.callback_url(), "https://sso.example.com/cb");
        assert_eq!(settings.logout_url(), "/bye");
        assert_eq!(settings.logout_url_pattern(), "https://example\\.com/.*");
        assert!(!settings.local_logout());
        assert!(settings.central_logout());
        Ok(())
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let map = MapSettings::new().with(BASE_URL, "not a url");
        assert!(matches!(
            GatewaySettings::from_settings(&map),
            Err(GatewayError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn get_bool_falls_back_on_garbage() {
        let map = MapSettings::new().with(AUTH_LOGOUT_LOCAL, "maybe");
        assert!(map.get_bool(AUTH_LOGOUT_LOCAL, true));
        assert!(!map.get_bool(AUTH_LOGOUT_CENTRAL, false));
        assert_eq!(map.get_or("missing", "fallback"), "fallback");
    }
}
