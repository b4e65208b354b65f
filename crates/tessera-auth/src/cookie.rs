//! Session cookie construction and parsing.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session cookie attributes.
///
/// `secure` defaults to off so local HTTP development works out of the box;
/// deployments behind TLS or on public hosts are expected to turn it on.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Cookie name.
    pub name: String,

    /// Cookie path.
    pub path: String,

    /// Cookie domain. When unset the browser scopes the cookie to the
    /// exact request host, which is what subdomain tenancy needs.
    pub domain: Option<String>,

    /// Set the `Secure` flag.
    pub secure: bool,

    /// Set the `HttpOnly` flag.
    pub http_only: bool,

    /// `SameSite` attribute: "Strict", "Lax", or "None".
    pub same_site: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "tessera_session".to_string(),
            path: "/".to_string(),
            domain: None,
            secure: false,
            http_only: true,
            same_site: "Lax".to_string(),
        }
    }
}

impl CookieConfig {
    /// Build a `Set-Cookie` header value carrying `value` for `max_age`.
    pub fn build_cookie(&self, value: &str, max_age: Duration) -> String {
        let mut cookie = format!(
            "{}={}; Path={}; Max-Age={}",
            self.name,
            value,
            self.path,
            max_age.as_secs()
        );
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie.push_str(&format!("; SameSite={}", self.same_site));
        if self.secure {
            cookie.push_str("; Secure");
        }
        if let Some(domain) = &self.domain {
            cookie.push_str(&format!("; Domain={domain}"));
        }
        cookie
    }

    /// Build a `Set-Cookie` header value that deletes the cookie.
    pub fn build_clear_cookie(&self) -> String {
        self.build_cookie("", Duration::ZERO)
    }

    /// Check the attribute combination is one browsers accept.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("cookie.name cannot be empty".to_string());
        }
        if self.path.is_empty() {
            return Err("cookie.path cannot be empty".to_string());
        }
        match self.same_site.as_str() {
            "Strict" | "Lax" => {}
            "None" => {
                if !self.secure {
                    return Err("cookie.same_site = \"None\" requires cookie.secure".to_string());
                }
            }
            other => {
                return Err(format!(
                    "cookie.same_site must be Strict, Lax, or None, got '{other}'"
                ));
            }
        }
        Ok(())
    }
}

/// Extract a cookie value by name from a raw `Cookie` header.
pub fn cookie_value(cookie_header: &str, name: &str) -> Option<String> {
    for cookie in cookie_header.split(';') {
        let cookie = cookie.trim();
        if let Some((cookie_name, value)) = cookie.split_once('=')
            && cookie_name.trim() == name
        {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Extract a cookie value by name from request headers.
pub fn cookie_from_headers(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie_header = headers.get(COOKIE)?.to_str().ok()?;
    cookie_value(cookie_header, name)
}
