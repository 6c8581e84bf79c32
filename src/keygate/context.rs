//! Per-request facade over the HTTP request, the session store and the
//! response cookie jar.
//!
//! Stages and clients never touch the response directly: cookies and headers
//! are buffered here and written by [`RequestContext::finish`].

use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE, COOKIE, HOST, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderName, HeaderValue, Method, Uri,
    },
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, error};

use super::{
    session::{SessionError, SessionStore, SESSION_COOKIE_NAME},
    settings::GatewaySettings,
};

/// A response cookie, formatted the way browsers expect in `Set-Cookie`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: Option<String>,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<&'static str>,
}

impl Cookie {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            domain: None,
            max_age: None,
            http_only: false,
            secure: false,
            same_site: None,
        }
    }

    #[must_use]
    pub fn header_value(&self) -> String {
        let mut cookie = format!("{}={}; Path={}", self.name, self.value, self.path);
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) {
            cookie.push_str(&format!("; Domain={domain}"));
        }
        if let Some(max_age) = self.max_age {
            cookie.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            cookie.push_str(&format!("; SameSite={same_site}"));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionCookie {
    Unchanged,
    Set,
    Clear,
}

pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    params: HashMap<String, String>,
    cookies: HashMap<String, String>,
    settings: Arc<GatewaySettings>,
    sessions: Arc<dyn SessionStore>,
    session_id: Option<String>,
    session_cookie: SessionCookie,
    response_headers: HeaderMap,
}

impl RequestContext {
    #[must_use]
    pub fn new(
        parts: &Parts,
        settings: Arc<GatewaySettings>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let params = parts
            .uri
            .query()
            .map(parse_query)
            .unwrap_or_default();
        let cookies = parse_cookies(&parts.headers);
        // Unknown or expired ids are ignored; a fresh session is created on first write.
        let session_id = cookies
            .get(SESSION_COOKIE_NAME)
            .filter(|id| sessions.exists(id))
            .cloned();

        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            params,
            cookies,
            settings,
            sessions,
            session_id,
            session_cookie: SessionCookie::Unchanged,
            response_headers: HeaderMap::new(),
        }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[must_use]
    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    #[must_use]
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    #[must_use]
    pub fn request_headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn request_parameter(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn request_cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// AJAX/API style request that expects a status rather than a redirect.
    #[must_use]
    pub fn is_xhr(&self) -> bool {
        self.request_header("x-requested-with") == Some("XMLHttpRequest")
            || self.request_header(ACCEPT.as_str()) == Some("application/json")
            || self.request_header(CONTENT_TYPE.as_str()) == Some("application/json")
    }

    /// Non-browser caller: no `Origin` header, exempt from CSRF checks.
    #[must_use]
    pub fn is_native_client(&self) -> bool {
        self.request_header("origin")
            .map_or(true, |origin| origin.trim().is_empty())
    }

    /// `scheme://host[:port]` of this request, honoring proxy headers.
    #[must_use]
    pub fn server_url(&self) -> String {
        let scheme = self
            .request_header("x-forwarded-proto")
            .map(ToString::to_string)
            .or_else(|| self.uri.scheme_str().map(ToString::to_string))
            .or_else(|| {
                self.settings
                    .base_url()
                    .and_then(|url| url.split_once("://"))
                    .map(|(scheme, _)| scheme.to_string())
            })
            .unwrap_or_else(|| "http".to_string());
        let host = self
            .request_header("x-forwarded-host")
            .or_else(|| self.request_header(HOST.as_str()))
            .map(ToString::to_string)
            .or_else(|| self.uri.authority().map(ToString::to_string))
            .unwrap_or_else(|| "localhost".to_string());
        format!("{scheme}://{host}")
    }

    #[must_use]
    pub fn full_request_url(&self) -> String {
        let path = self
            .uri
            .path_and_query()
            .map_or_else(|| self.uri.path().to_string(), ToString::to_string);
        format!("{}{path}", self.server_url())
    }

    /// Complete a relative (`/`-prefixed) URL against the server URL.
    #[must_use]
    pub fn absolute_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{url}", self.server_url())
        } else {
            url.to_string()
        }
    }

    #[must_use]
    pub fn context_path(&self) -> &str {
        self.settings.context_path()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// # Errors
    /// Returns an error if the session store fails.
    pub fn session_get(&self, key: &str) -> Result<Option<String>, SessionError> {
        match &self.session_id {
            Some(id) => self.sessions.get(id, key),
            None => Ok(None),
        }
    }

    /// Store a value, creating the session on first write.
    ///
    /// # Errors
    /// Returns an error if the session store fails.
    pub fn session_set(&mut self, key: &str, value: String) -> Result<(), SessionError> {
        let id = self.ensure_session()?;
        self.sessions.set(&id, key, value)
    }

    /// # Errors
    /// Returns an error if the session store fails.
    pub fn session_remove(&mut self, key: &str) -> Result<(), SessionError> {
        match &self.session_id {
            Some(id) => self.sessions.remove(id, key),
            None => Ok(()),
        }
    }

    /// Move the session under a fresh id.
    ///
    /// # Errors
    /// Returns an error if the session store fails.
    pub fn renew_session(&mut self) -> Result<(), SessionError> {
        let renewed = match &self.session_id {
            Some(id) => self.sessions.renew(id)?,
            None => self.sessions.create()?,
        };
        debug!("session renewed");
        self.session_id = Some(renewed);
        self.session_cookie = SessionCookie::Set;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the session store fails; the session cookie is
    /// cleared either way.
    pub fn destroy_session(&mut self) -> Result<(), SessionError> {
        self.session_cookie = SessionCookie::Clear;
        match self.session_id.take() {
            Some(id) => self.sessions.destroy(&id),
            None => Ok(()),
        }
    }

    pub fn add_response_cookie(&mut self, cookie: &Cookie) {
        match HeaderValue::from_str(&cookie.header_value()) {
            Ok(value) => {
                self.response_headers.append(SET_COOKIE, value);
            }
            Err(err) => error!("Invalid cookie {}: {err}", cookie.name),
        }
    }

    pub fn set_response_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.response_headers.insert(name, value);
            }
            Err(err) => error!("Invalid value for header {name}: {err}"),
        }
    }

    #[must_use]
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Write buffered cookies and headers onto `response`.
    pub fn finish(mut self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if let Some(cookie) = self.session_cookie_header() {
            self.add_response_cookie(&cookie);
        }
        for (name, value) in &self.response_headers {
            if name == SET_COOKIE {
                response.headers_mut().append(name, value.clone());
            } else {
                response.headers_mut().insert(name, value.clone());
            }
        }
        response
    }

    fn ensure_session(&mut self) -> Result<String, SessionError> {
        if let Some(id) = &self.session_id {
            return Ok(id.clone());
        }
        let id = self.sessions.create()?;
        self.session_id = Some(id.clone());
        self.session_cookie = SessionCookie::Set;
        Ok(id)
    }

    fn session_cookie_header(&self) -> Option<Cookie> {
        let mut cookie = match (self.session_cookie, &self.session_id) {
            (SessionCookie::Set, Some(id)) => {
                let mut cookie = Cookie::new(SESSION_COOKIE_NAME, id.as_str());
                cookie.max_age = self
                    .sessions
                    .ttl()
                    .and_then(|ttl| i64::try_from(ttl.as_secs()).ok());
                cookie
            }
            (SessionCookie::Clear, _) => {
                let mut cookie = Cookie::new(SESSION_COOKIE_NAME, "");
                cookie.max_age = Some(0);
                cookie
            }
            _ => return None,
        };
        cookie.path = self.context_path().to_string();
        cookie.http_only = true;
        cookie.same_site = Some("Lax");
        cookie.secure = self.settings.secure_cookies();
        Some(cookie)
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    params
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            cookies
                .entry(key.trim().to_string())
                .or_insert_with(|| val.trim().to_string());
        }
    }
    cookies
}
