//! Double-submit CSRF protection.
//!
//! [`CsrfIssue`] hands browsers a fresh random token as the `CSRF-TOKEN`
//! cookie. Scripts read the cookie and echo it in `X-CSRF-Token`;
//! [`CsrfVerify`] accepts a mutating request only when header and cookie
//! agree. Nothing is stored server-side. Native clients (no `Origin`) skip both
//! sides of the protocol.

use axum::http::{HeaderName, Method};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use tracing::{debug, error};

use super::{
    client::UserProfile,
    context::{Cookie, RequestContext},
};

pub const CSRF_COOKIE_NAME: &str = "CSRF-TOKEN";
pub const CSRF_HEADER_NAME: &str = "X-CSRF-Token";
pub const CSRF_ISSUE_AUTHORIZER: &str = "csrf-issue";
pub const CSRF_VERIFY_AUTHORIZER: &str = "csrf-verify";

/// Response header echoing the issued token.
pub static CSRF_RESPONSE_HEADER: HeaderName = HeaderName::from_static("csrf-token");

/// A rule run by the security stage once profiles are known.
pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, ctx: &mut RequestContext, profiles: &[UserProfile]) -> bool;
}

/// 32 random bytes, base64url without padding.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_token() -> Result<String, rand::Error> {
    let mut bytes = [0u8; 32];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CsrfIssue;

impl CsrfIssue {
    /// Set a fresh token cookie on browser contexts; returns the token.
    pub fn issue(&self, ctx: &mut RequestContext) -> Option<String> {
        if ctx.is_native_client() {
            return None;
        }
        let token = match generate_token() {
            Ok(token) => token,
            Err(err) => {
                error!("Failed to generate CSRF token: {err}");
                return None;
            }
        };

        let mut cookie = Cookie::new(CSRF_COOKIE_NAME, token.as_str());
        cookie.path = ctx.context_path().to_string();
        cookie.domain = Some(String::new());
        cookie.secure = ctx.settings().secure_cookies();
        ctx.add_response_cookie(&cookie);
        Some(token)
    }

    /// Issue the cookie and echo the same token as a response header.
    ///
    /// Used on the callback redirect, where the browser may follow the
    /// `Location` before the cookie is visible to scripts.
    pub fn issue_with_header(&self, ctx: &mut RequestContext) {
        if let Some(token) = self.issue(ctx) {
            ctx.set_response_header(CSRF_RESPONSE_HEADER.clone(), &token);
        }
    }
}

impl Authorizer for CsrfIssue {
    fn is_authorized(&self, ctx: &mut RequestContext, _profiles: &[UserProfile]) -> bool {
        self.issue(ctx);
        true
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CsrfVerify;

impl CsrfVerify {
    fn must_check(method: &Method) -> bool {
        [Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method)
    }
}

impl Authorizer for CsrfVerify {
    fn is_authorized(&self, ctx: &mut RequestContext, _profiles: &[UserProfile]) -> bool {
        if ctx.is_native_client() || !Self::must_check(ctx.method()) {
            return true;
        }
        let header = presented(ctx.request_header(CSRF_HEADER_NAME));
        let cookie = presented(ctx.request_cookie(CSRF_COOKIE_NAME));

        match (header, cookie) {
            (Some(header), Some(cookie)) => {
                let matched: bool = header.as_bytes().ct_eq(cookie.as_bytes()).into();
                if !matched {
                    debug!("CSRF header does not match cookie");
                }
                matched
            }
            _ => {
                debug!("CSRF header or cookie missing");
                false
            }
        }
    }
}

/// Header and cookie tokens are normalized the same way before comparison.
fn presented(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
