//! Client registration.
//!
//! Registration is two-phase: the embedding application fills a
//! [`ClientRegistryBuilder`] at startup, then seals it into an immutable
//! [`ClientRegistry`] that every request worker shares. Direct clients must be
//! added before any central client, so a stateless credential check can never
//! end up registered behind a redirect challenge.

use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;
use tracing::info;

use super::{
    client::{AuthenticationClient, ChallengeRedirector, ClientKind, CredentialChecker},
    error::GatewayError,
};

/// Display metadata for a client (title, icon, ...).
pub type ClientInfo = IndexMap<String, String>;

#[derive(Debug, Default)]
pub struct ClientRegistryBuilder {
    clients: Vec<AuthenticationClient>,
    direct_names: IndexSet<String>,
    central_names: IndexSet<String>,
    info: IndexMap<String, ClientInfo>,
}

impl ClientRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a direct client.
    ///
    /// # Errors
    /// `InvalidRegistrationOrder` once any central client has been added,
    /// `DuplicateClient` if the name is taken.
    pub fn add_direct_client(
        &mut self,
        client: Arc<dyn CredentialChecker>,
    ) -> Result<&mut Self, GatewayError> {
        let name = client.name().to_string();
        if !self.central_names.is_empty() {
            return Err(GatewayError::InvalidRegistrationOrder(name));
        }
        self.ensure_unique(&name)?;
        self.clients.push(AuthenticationClient::Direct(client));
        self.direct_names.insert(name.clone());
        info!("Added direct client: {}", name);
        Ok(self)
    }

    /// Append a central client.
    ///
    /// # Errors
    /// `DuplicateClient` if the name is taken.
    pub fn add_central_client(
        &mut self,
        client: Arc<dyn ChallengeRedirector>,
    ) -> Result<&mut Self, GatewayError> {
        let name = client.name().to_string();
        self.ensure_unique(&name)?;
        self.clients.push(AuthenticationClient::Central(client));
        self.central_names.insert(name.clone());
        info!("Added central client: {}", name);
        Ok(self)
    }

    /// Attach display metadata to a client name.
    pub fn set_client_info(&mut self, name: impl Into<String>, info: ClientInfo) -> &mut Self {
        self.info.insert(name.into(), info);
        self
    }

    /// Seal the registry.
    ///
    /// # Errors
    /// `EmptyRegistry` when no client was added.
    pub fn build(self) -> Result<ClientRegistry, GatewayError> {
        if self.clients.is_empty() {
            return Err(GatewayError::EmptyRegistry);
        }
        Ok(ClientRegistry {
            clients: self.clients,
            direct_names: self.direct_names,
            central_names: self.central_names,
            info: self.info,
        })
    }

    fn ensure_unique(&self, name: &str) -> Result<(), GatewayError> {
        if self.direct_names.contains(name) || self.central_names.contains(name) {
            return Err(GatewayError::DuplicateClient(name.to_string()));
        }
        Ok(())
    }
}

/// Immutable, ordered set of registered clients.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Vec<AuthenticationClient>,
    direct_names: IndexSet<String>,
    central_names: IndexSet<String>,
    info: IndexMap<String, ClientInfo>,
}

impl ClientRegistry {
    /// Clients in registration order.
    #[must_use]
    pub fn clients(&self) -> &[AuthenticationClient] {
        &self.clients
    }

    /// The first registered client, used when a callback names no client.
    #[must_use]
    pub fn default_client(&self) -> Option<&AuthenticationClient> {
        self.clients.first()
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&AuthenticationClient> {
        self.clients.iter().find(|client| client.name() == name)
    }

    #[must_use]
    pub fn central_client_names(&self) -> &IndexSet<String> {
        &self.central_names
    }

    #[must_use]
    pub fn is_direct(&self, name: &str) -> bool {
        self.direct_names.contains(name)
    }

    #[must_use]
    pub fn has_central_clients(&self) -> bool {
        !self.central_names.is_empty()
    }

    #[must_use]
    pub fn client_info(&self, name: &str) -> Option<&ClientInfo> {
        self.info.get(name)
    }

    /// Comma-joined client names, in registration order.
    #[must_use]
    pub fn joined_names(&self) -> String {
        self.clients
            .iter()
            .map(AuthenticationClient::name)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Clients of one kind, in registration order.
    pub fn of_kind(&self, kind: ClientKind) -> impl Iterator<Item = &AuthenticationClient> {
        self.clients.iter().filter(move |client| client.kind() == kind)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::keygate::{
        client::{ClientError, HandshakeError, UserProfile},
        context::RequestContext,
    };
    use async_trait::async_trait;

    pub(crate) struct StubDirect(pub &'static str);

    #[async_trait]
    impl CredentialChecker for StubDirect {
        fn name(&self) -> &str {
            self.0
        }

        async fn authenticate(
            &self,
            _ctx: &RequestContext,
        ) -> Result<Option<UserProfile>, ClientError> {
            Ok(None)
        }
    }

    pub(crate) struct StubCentral(pub &'static str);

    #[async_trait]
    impl ChallengeRedirector for StubCentral {
        fn name(&self) -> &str {
            self.0
        }

        async fn challenge(
            &self,
            _ctx: &mut RequestContext,
            callback_url: &str,
        ) -> Result<String, ClientError> {
            Ok(format!("https://idp.example.com/login?cb={callback_url}"))
        }

        async fn complete(&self, _ctx: &mut RequestContext) -> Result<UserProfile, HandshakeError> {
            Ok(UserProfile::new("alice", self.0))
        }
    }

    #[derive(Clone, Copy, Debug)]
    enum Step {
        Direct,
        Central,
    }

    fn register(sequence: &[Step]) -> Result<ClientRegistryBuilder, GatewayError> {
        const NAMES: [&str; 6] = ["c0", "c1", "c2", "c3", "c4", "c5"];
        let mut builder = ClientRegistryBuilder::new();
        for (step, name) in sequence.iter().zip(NAMES) {
            match step {
                Step::Direct => builder.add_direct_client(Arc::new(StubDirect(name)))?,
                Step::Central => builder.add_central_client(Arc::new(StubCentral(name)))?,
            };
        }
        Ok(builder)
    }

    #[test]
    fn direct_after_central_always_fails() {
        // every sequence of length 4
        for mask in 0u8..16 {
            let sequence: Vec<Step> = (0..4)
                .map(|bit| {
                    if mask & (1 << bit) == 0 {
                        Step::Direct
                    } else {
                        Step::Central
                    }
                })
                .collect();
            let ordered = sequence
                .windows(2)
                .all(|pair| !matches!(pair, [Step::Central, Step::Direct]));
            let result = register(&sequence);
            if ordered {
                assert!(result.is_ok(), "sequence {sequence:?} should register");
            } else {
                assert!(
                    matches!(result, Err(GatewayError::InvalidRegistrationOrder(_))),
                    "sequence {sequence:?} should fail"
                );
            }
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut builder = ClientRegistryBuilder::new();
        assert!(builder.add_direct_client(Arc::new(StubDirect("a"))).is_ok());
        assert!(matches!(
            builder.add_central_client(Arc::new(StubCentral("a"))),
            Err(GatewayError::DuplicateClient(name)) if name == "a"
        ));
    }

    #[test]
    fn empty_registry_cannot_be_sealed() {
        assert!(matches!(
            ClientRegistryBuilder::new().build(),
            Err(GatewayError::EmptyRegistry)
        ));
    }

    #[test]
    fn sealed_registry_answers_membership_queries() -> Result<(), GatewayError> {
        let mut builder = ClientRegistryBuilder::new();
        builder
            .add_direct_client(Arc::new(StubDirect("token")))?
            .add_central_client(Arc::new(StubCentral("oidc")))?
            .add_central_client(Arc::new(StubCentral("saml")))?;
        builder.set_client_info(
            "oidc",
            ClientInfo::from([("title".to_string(), "Company SSO".to_string())]),
        );
        let registry = builder.build()?;

        assert_eq!(registry.joined_names(), "token,oidc,saml");
        assert_eq!(registry.default_client().map(AuthenticationClient::name), Some("token"));
        assert!(registry.is_direct("token"));
        assert!(!registry.is_direct("oidc"));
        assert!(registry.has_central_clients());
        assert_eq!(
            registry.central_client_names().iter().collect::<Vec<_>>(),
            vec!["oidc", "saml"]
        );
        assert_eq!(
            registry
                .client_info("oidc")
                .and_then(|info| info.get("title"))
                .map(String::as_str),
            Some("Company SSO")
        );
        assert!(registry.client_info("token").is_none());
        assert_eq!(registry.of_kind(ClientKind::Central).count(), 2);
        Ok(())
    }
}
