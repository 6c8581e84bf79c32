//! # Keygate (Authentication Gateway)
//!
//! `keygate` mediates every inbound HTTP request through three filters:
//!
//! - **`/logout`** destroys the local session and, optionally, asks the central
//!   provider that authenticated the session to log the user out as well.
//! - **`/callback`** completes a central (redirect-based) login, restores the
//!   page the user originally asked for and stamps a fresh CSRF token.
//! - **everything else** requires an authenticated profile and runs the
//!   configured authorizers (CSRF double-submit verification) first.
//!
//! ## Clients
//!
//! Authentication providers are registered at startup into a
//! [`ClientRegistryBuilder`](keygate::registry::ClientRegistryBuilder). Direct
//! clients (stateless credential checks such as bearer tokens) must all be
//! registered before any central client; the builder rejects the opposite order.
//! Sealing the builder yields an immutable registry that is shared by every
//! request worker.
//!
//! ## CSRF
//!
//! Browser requests (those carrying an `Origin` header) receive a `CSRF-TOKEN`
//! cookie and must echo it in `X-CSRF-Token` on mutating requests. Native
//! clients (no `Origin`) are exempt and must authenticate by other means.

pub mod cli;
pub mod keygate;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
