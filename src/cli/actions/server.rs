use crate::keygate::{
    self,
    bearer::BearerTokenClient,
    handlers,
    registry::{ClientInfo, ClientRegistry, ClientRegistryBuilder},
    session::MemorySessionStore,
    settings::{
        MapSettings, AUTH_CALLBACK_URL, AUTH_LOGOUT_CENTRAL, AUTH_LOGOUT_LOCAL, AUTH_LOGOUT_URL,
        AUTH_LOGOUT_URL_PATTERN, BASE_URL, HEALTH_PUBLIC,
    },
    GatewayState,
};
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::info;

pub const BEARER_CLIENT_NAME: &str = "token";

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub base_url: Option<String>,
    pub callback_url: Option<String>,
    pub logout_url: Option<String>,
    pub logout_url_pattern: Option<String>,
    pub logout_local: bool,
    pub logout_central: bool,
    pub session_ttl: u64,
    pub public_health: bool,
    pub bearer_tokens: Vec<(String, SecretString)>,
}

impl Args {
    fn settings(&self) -> MapSettings {
        let mut settings = MapSettings::new();
        for (key, value) in [
            (BASE_URL, &self.base_url),
            (AUTH_CALLBACK_URL, &self.callback_url),
            (AUTH_LOGOUT_URL, &self.logout_url),
            (AUTH_LOGOUT_URL_PATTERN, &self.logout_url_pattern),
        ] {
            if let Some(value) = value {
                settings.set(key, value.as_str());
            }
        }
        settings.set(AUTH_LOGOUT_LOCAL, self.logout_local.to_string());
        settings.set(AUTH_LOGOUT_CENTRAL, self.logout_central.to_string());
        settings.set(HEALTH_PUBLIC, self.public_health.to_string());
        settings
    }

    fn registry(&self) -> Result<ClientRegistry> {
        let mut builder = ClientRegistryBuilder::new();
        if !self.bearer_tokens.is_empty() {
            let client = self
                .bearer_tokens
                .iter()
                .fold(BearerTokenClient::new(BEARER_CLIENT_NAME), |client, (subject, token)| {
                    client.with_token(subject.as_str(), token.clone())
                });
            builder.add_direct_client(Arc::new(client))?;

            let mut info = ClientInfo::new();
            info.insert("type".to_string(), "bearer".to_string());
            info.insert("subjects".to_string(), self.bearer_tokens.len().to_string());
            builder.set_client_info(BEARER_CLIENT_NAME, info);
        }
        builder
            .build()
            .context("no authentication client configured, use --bearer-token")
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the gateway configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let registry = args.registry()?;
    let state = GatewayState::new(
        registry,
        &args.settings(),
        Arc::new(MemorySessionStore::with_ttl(Duration::from_secs(
            args.session_ttl,
        ))),
    )
    .context("invalid gateway settings")?;

    keygate::new(args.port, Arc::new(state), protected()).await
}

/// Application routes served behind the security stage.
pub fn protected() -> Router {
    Router::new().route("/me", get(handlers::me))
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "base_url",
            args.base_url.clone().unwrap_or_else(|| "none".to_string()),
        ),
        (
            "callback_url",
            args.callback_url
                .clone()
                .unwrap_or_else(|| "default".to_string()),
        ),
        (
            "logout_url",
            args.logout_url
                .clone()
                .unwrap_or_else(|| "default".to_string()),
        ),
        ("logout_local", args.logout_local.to_string()),
        ("logout_central", args.logout_central.to_string()),
        ("session_ttl", format!("{}s", args.session_ttl)),
        ("public_health", args.public_health.to_string()),
        ("bearer_subjects", args.bearer_tokens.len().to_string()),
    ];
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("keygate {}\n\nStartup configuration:", env!("CARGO_PKG_VERSION"));
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygate::settings::AppSettings;

    fn args(tokens: Vec<(String, SecretString)>) -> Args {
        Args {
            port: 8080,
            base_url: Some("https://erp.example.com/app".to_string()),
            callback_url: None,
            logout_url: None,
            logout_url_pattern: None,
            logout_local: true,
            logout_central: false,
            session_ttl: 600,
            public_health: false,
            bearer_tokens: tokens,
        }
    }

    #[test]
    fn test_settings_only_carry_given_values() {
        let settings = args(Vec::new()).settings();
        assert_eq!(
            settings.get(BASE_URL).as_deref(),
            Some("https://erp.example.com/app")
        );
        assert_eq!(settings.get(AUTH_CALLBACK_URL), None);
        assert!(settings.get_bool(AUTH_LOGOUT_LOCAL, false));
        assert!(!settings.get_bool(AUTH_LOGOUT_CENTRAL, true));
        assert!(!settings.get_bool(HEALTH_PUBLIC, true));
    }

    #[test]
    fn test_registry_requires_a_client() {
        assert!(args(Vec::new()).registry().is_err());
    }

    #[test]
    fn test_registry_with_bearer_tokens() -> Result<()> {
        let registry = args(vec![(
            "ci".to_string(),
            SecretString::from("abc".to_string()),
        )])
        .registry()?;
        assert!(registry.is_direct(BEARER_CLIENT_NAME));
        assert_eq!(
            registry
                .client_info(BEARER_CLIENT_NAME)
                .and_then(|info| info.get("subjects"))
                .map(String::as_str),
            Some("1")
        );
        Ok(())
    }
}
