//! The shared gateway configuration.
//!
//! [`ConfigProvider`] owns the sealed registry and builds the
//! [`GatewayConfig`] on first access. Every later call returns the same
//! instance; there is no rebuild path, so all clients must be registered
//! before the provider is created.

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::debug;

use super::{
    csrf::{Authorizer, CsrfIssue, CsrfVerify, CSRF_ISSUE_AUTHORIZER, CSRF_VERIFY_AUTHORIZER},
    registry::ClientRegistry,
};

pub struct GatewayConfig {
    clients: Arc<ClientRegistry>,
    authorizers: IndexMap<String, Arc<dyn Authorizer>>,
    csrf_issue: Arc<CsrfIssue>,
}

impl GatewayConfig {
    fn build(clients: Arc<ClientRegistry>) -> Self {
        let csrf_issue = Arc::new(CsrfIssue);
        let mut authorizers: IndexMap<String, Arc<dyn Authorizer>> = IndexMap::new();
        authorizers.insert(CSRF_ISSUE_AUTHORIZER.to_string(), csrf_issue.clone());
        authorizers.insert(CSRF_VERIFY_AUTHORIZER.to_string(), Arc::new(CsrfVerify));

        debug!(
            "Gateway config built: clients={}, authorizers={}",
            clients.joined_names(),
            authorizers.keys().cloned().collect::<Vec<_>>().join(",")
        );

        Self {
            clients,
            authorizers,
            csrf_issue,
        }
    }

    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Authorizers in evaluation order.
    #[must_use]
    pub fn authorizers(&self) -> &IndexMap<String, Arc<dyn Authorizer>> {
        &self.authorizers
    }

    #[must_use]
    pub fn authorizer(&self, name: &str) -> Option<&Arc<dyn Authorizer>> {
        self.authorizers.get(name)
    }

    #[must_use]
    pub fn csrf_issue(&self) -> &CsrfIssue {
        &self.csrf_issue
    }
}

pub struct ConfigProvider {
    registry: Arc<ClientRegistry>,
    config: OnceCell<GatewayConfig>,
}

impl ConfigProvider {
    #[must_use]
    pub fn new(registry: ClientRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            config: OnceCell::new(),
        }
    }

    /// The process-wide config; built by the first caller, shared afterwards.
    pub fn get(&self) -> &GatewayConfig {
        self.config
            .get_or_init(|| GatewayConfig::build(self.registry.clone()))
    }
}
