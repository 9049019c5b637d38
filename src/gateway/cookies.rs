//! Secure cookie construction and parsing.
//!
//! Both cookies this gateway sets are HTTP-only and cross-site capable:
//! the provider redirects the browser back from another origin, so the
//! transient OAuth session cookie must survive a cross-site navigation, and
//! downstream apps on sibling origins read the session token cookie.
//! `SameSite=None` requires `Secure`; local development over plain HTTP can
//! switch `secure` off in the options.

use std::fmt::Write as _;
use std::time::Duration;

/// Name of the session token cookie.
pub const SESSION_COOKIE: &str = "gateway_session";

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// Sent only on same-site requests
    Strict,
    /// Sent on same-site requests and top-level cross-site navigations
    Lax,
    /// Sent on all requests (requires `Secure`)
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Attributes applied to a cookie.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Inaccessible to script
    pub http_only: bool,
    /// HTTPS only
    pub secure: bool,
    /// Cross-site sending policy
    pub same_site: SameSite,
    /// Lifetime; omitted for a session cookie
    pub max_age: Option<Duration>,
    /// Cookie path
    pub path: &'static str,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: SameSite::None,
            max_age: None,
            path: "/",
        }
    }
}

/// Build a `Set-Cookie` header value.
#[must_use]
pub fn build_set_cookie(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut cookie = format!("{name}={value}; Path={}", options.path);

    if let Some(max_age) = options.max_age {
        let _ = write!(cookie, "; Max-Age={}", max_age.as_secs());
    }
    if options.http_only {
        cookie.push_str("; HttpOnly");
    }
    if options.secure {
        cookie.push_str("; Secure");
    }
    let _ = write!(cookie, "; SameSite={}", options.same_site.as_str());

    cookie
}

/// Build a `Set-Cookie` header value that clears a cookie. Attributes must
/// match the ones the cookie was set with, or browsers keep the original.
#[must_use]
pub fn build_clear_cookie(name: &str, options: &CookieOptions) -> String {
    let cleared = CookieOptions {
        max_age: Some(Duration::ZERO),
        ..options.clone()
    };
    build_set_cookie(name, "", &cleared)
}

/// Extract one cookie's value from a `Cookie` request header.
#[must_use]
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|part| {
        let (k, v) = part.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}
