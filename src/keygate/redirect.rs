//! Post-login redirect target resolution.
//!
//! Single-page front-ends keep navigation state in the URL fragment, which
//! browsers never send to the server. Before a challenge the front-end passes
//! it along as `hash_location`, either on the callback request itself or
//! inside the remembered URL. The target is the base URL followed by that
//! fragment.

use url::Url;

use super::error::GatewayError;

pub const HASH_LOCATION_PARAM: &str = "hash_location";

const PLACEHOLDER_ORIGIN: &str = "http://keygate.invalid/";
const PLACEHOLDER_HOST: &str = "keygate.invalid";

/// Whether a browser would follow `url` to the origin it appears to name.
///
/// Backslashes, control and whitespace characters are rejected outright since
/// browsers normalize them away (`/\host` and `/<TAB>/host` both become
/// `//host`). A relative URL must not carry an authority of its own.
#[must_use]
pub fn is_safe_redirect_target(url: &str) -> bool {
    if url
        .chars()
        .any(|c| c == '\\' || c.is_control() || c.is_whitespace())
    {
        return false;
    }
    match Url::parse(url) {
        Ok(_) => true,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(PLACEHOLDER_ORIGIN)
            .and_then(|base| base.join(url))
            .is_ok_and(|joined| joined.host_str() == Some(PLACEHOLDER_HOST)),
        Err(_) => false,
    }
}

/// Resolve where a completed callback should send the browser.
///
/// `None` means nothing usable was found and the caller falls back to its
/// default URL. A malformed remembered URL degrades to an empty bare URL.
#[must_use]
pub fn resolve_redirect_target(
    requested_url: Option<&str>,
    base_url: Option<&str>,
    hash_location: Option<&str>,
) -> Option<String> {
    let base = base_url
        .filter(|url| !url.trim().is_empty())
        .map_or_else(|| bare_url(requested_url), ToString::to_string);
    let hash = hash_location
        .map(ToString::to_string)
        .or_else(|| requested_url.and_then(remembered_hash_location))
        .unwrap_or_default();

    let target = format!("{base}{hash}");
    if target.trim().is_empty() {
        None
    } else {
        Some(target)
    }
}

/// The URL without its query string; the fragment is kept.
fn bare_url(url: Option<&str>) -> String {
    let Some(url) = url.filter(|url| !url.trim().is_empty()) else {
        return String::new();
    };
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(err) => {
            let err = GatewayError::MalformedRedirectState {
                url: url.to_string(),
                reason: err.to_string(),
            };
            tracing::warn!("{err}");
            String::new()
        }
    }
}

/// `hash_location` from the query, or from a query-like tail of the fragment.
fn remembered_hash_location(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    find_param(parsed.query_pairs()).or_else(|| {
        parsed
            .fragment()
            .and_then(|fragment| fragment.split_once('?'))
            .and_then(|(_, query)| find_param(url::form_urlencoded::parse(query.as_bytes())))
    })
}

fn find_param<'a>(
    mut pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
) -> Option<String> {
    pairs
        .find(|(key, _)| key == HASH_LOCATION_PARAM)
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_targets_cannot_switch_origin() {
        for safe in ["/", "/goodbye", "/a?b=c#d", "https://erp.example.com/bye", "bye"] {
            assert!(is_safe_redirect_target(safe), "{safe}");
        }
        for unsafe_target in [
            "//evil.example.com",
            "/\\evil.example.com",
            "\\\\evil.example.com",
            "/\t/evil.example.com",
            "/\n/evil.example.com",
            " //evil.example.com",
            "/ /evil.example.com",
        ] {
            assert!(!is_safe_redirect_target(unsafe_target), "{unsafe_target:?}");
        }
    }

    #[test]
    fn hash_location_from_remembered_fragment() {
        assert_eq!(
            resolve_redirect_target(
                Some("https://host/app#/foo?hash_location=bar"),
                Some("https://host/app"),
                None
            ),
            Some("https://host/appbar".to_string())
        );
    }

    #[test]
    fn hash_location_from_remembered_query() {
        assert_eq!(
            resolve_redirect_target(
                Some("https://host/app/?hash_location=%23%2Fds%2Forders&x=1"),
                Some("https://host/app"),
                None
            ),
            Some("https://host/app#/ds/orders".to_string())
        );
    }

    #[test]
    fn request_parameter_wins_over_remembered_url() {
        assert_eq!(
            resolve_redirect_target(
                Some("https://host/app?hash_location=old"),
                Some("https://host/app"),
                Some("#/new")
            ),
            Some("https://host/app#/new".to_string())
        );
    }

    #[test]
    fn base_defaults_to_bare_remembered_url() {
        assert_eq!(
            resolve_redirect_target(Some("https://host/app/orders?id=7#top"), None, None),
            Some("https://host/app/orders#top".to_string())
        );
    }

    #[test]
    fn nothing_remembered_falls_back() {
        assert_eq!(resolve_redirect_target(None, None, None), None);
        assert_eq!(resolve_redirect_target(None, Some("  "), None), None);
    }

    #[test]
    fn base_url_without_remembered_url() {
        assert_eq!(
            resolve_redirect_target(None, Some("https://host/app"), None),
            Some("https://host/app".to_string())
        );
    }

    #[test]
    fn malformed_remembered_url_degrades_to_empty() {
        assert_eq!(resolve_redirect_target(Some("::not a url::"), None, None), None);
        assert_eq!(
            resolve_redirect_target(Some("::not a url::"), None, Some("#/home")),
            Some("#/home".to_string())
        );
    }
}
