// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! CSRF guard: origin verification plus signed double-submit tokens.
//!
//! For unsafe methods the guard walks these checks in order and stops at the
//! first failure:
//!
//! 1. origin: `Origin`/`Referer` must be consistent with `Host`
//! 2. presence: the token must be in both the cookie and the header
//! 3. match: cookie and header tokens must be identical
//! 4. validity: the token signature and age must check out
//!
//! GET, HEAD and OPTIONS are never checked.

use crate::origin::{is_loopback_url, OriginError, OriginVerifier};
use crate::token::{TokenCodec, TokenError};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Why the guard rejected a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CsrfRejection {
    #[error("invalid origin: {0}")]
    InvalidOrigin(#[from] OriginError),

    #[error("missing token")]
    MissingToken,

    #[error("token mismatch")]
    TokenMismatch,

    #[error("token invalid/expired: {0}")]
    InvalidToken(#[from] TokenError),
}

/// A freshly minted token and the cookie carrying it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub set_cookie: HeaderValue,
}

/// Whether `method` is exempt from CSRF checks.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Decides whether a state-changing request may proceed.
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    codec: TokenCodec,
    origin: OriginVerifier,
    cookie_name: String,
    header_name: HeaderName,
    secure_cookie: bool,
}

impl CsrfGuard {
    pub fn new(
        codec: TokenCodec,
        origin: OriginVerifier,
        cookie_name: impl Into<String>,
        header_name: HeaderName,
    ) -> Self {
        let secure_cookie = !origin.is_development();
        Self {
            codec,
            origin,
            cookie_name: cookie_name.into(),
            header_name,
            secure_cookie,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Run the guard against a request's method, URI and headers.
    pub fn check(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Result<(), CsrfRejection> {
        if is_safe_method(method) {
            return Ok(());
        }

        let origin = header_str(headers, &header::ORIGIN);
        let referer = header_str(headers, &header::REFERER);
        let host = header_str(headers, &header::HOST)
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();

        if let Err(err) = self.origin.verify(origin, referer, &host) {
            warn!(%method, path = %uri.path(), error = %err, "CSRF origin check failed");
            return Err(err.into());
        }

        let cookie_token = CookieJar::from_headers(headers)
            .get(&self.cookie_name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty());
        let header_token = header_str(headers, &self.header_name)
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let (cookie_token, header_token) = match (cookie_token, header_token) {
            (Some(cookie), Some(header)) => (cookie, header),
            (None, None) if self.origin.is_development() && referer.is_some_and(is_loopback_url) => {
                debug!(%method, path = %uri.path(), "No CSRF token, loopback referer in development");
                return Ok(());
            }
            _ => {
                warn!(%method, path = %uri.path(), "CSRF token missing");
                return Err(CsrfRejection::MissingToken);
            }
        };

        if !bool::from(cookie_token.as_bytes().ct_eq(header_token.as_bytes())) {
            warn!(%method, path = %uri.path(), "CSRF cookie and header tokens differ");
            return Err(CsrfRejection::TokenMismatch);
        }

        if let Err(err) = self.codec.inspect(&cookie_token) {
            warn!(%method, path = %uri.path(), error = %err, "CSRF token rejected");
            return Err(err.into());
        }

        debug!(%method, path = %uri.path(), "CSRF check passed");
        Ok(())
    }

    /// Mint a token and build the `Set-Cookie` value for it.
    ///
    /// The cookie is readable by scripts so the client can echo it back in
    /// the request header.
    pub fn issue(&self) -> Option<IssuedToken> {
        let token = self.codec.mint();
        let max_age = time::Duration::seconds(self.codec.validity().num_seconds());

        let cookie = Cookie::build((self.cookie_name.clone(), token.clone()))
            .path("/")
            .same_site(SameSite::Strict)
            .secure(self.secure_cookie)
            .http_only(false)
            .max_age(max_age)
            .build();

        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(set_cookie) => Some(IssuedToken { token, set_cookie }),
            Err(err) => {
                error!(error = %err, "Failed to encode CSRF cookie");
                None
            }
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::token::SigningSecret;
    use chrono::Duration;
    use std::sync::Arc;

    fn guard(development: bool) -> CsrfGuard {
        let codec = TokenCodec::new(
            SigningSecret::new([3u8; 32]).unwrap(),
            Duration::hours(24),
            Arc::new(ManualClock::default()),
        );
        CsrfGuard::new(
            codec,
            OriginVerifier::new(development, Vec::<String>::new()),
            "csrf_token",
            HeaderName::from_static("x-csrf-token"),
        )
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn post(guard: &CsrfGuard, pairs: &[(&'static str, &str)]) -> Result<(), CsrfRejection> {
        guard.check(&Method::POST, &Uri::from_static("/api/items"), &headers(pairs))
    }

    #[test]
    fn test_safe_methods_skip() {
        let guard = guard(false);
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            assert!(guard.check(&method, &Uri::from_static("/"), &HeaderMap::new()).is_ok());
        }
        assert!(guard.check(&Method::DELETE, &Uri::from_static("/"), &HeaderMap::new()).is_err());
    }

    #[test]
    fn test_matching_tokens_pass() {
        let guard = guard(false);
        let token = guard.codec().mint();
        let cookie = format!("theme=dark; csrf_token={token}");

        let result = post(
            &guard,
            &[
                ("host", "app.example"),
                ("origin", "https://app.example"),
                ("cookie", &cookie),
                ("x-csrf-token", &token),
            ],
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_origin_checked_first() {
        let guard = guard(false);
        let result = post(&guard, &[("host", "app.example"), ("origin", "https://evil.example")]);
        assert!(matches!(result, Err(CsrfRejection::InvalidOrigin(_))));
    }

    #[test]
    fn test_cookie_only_rejected() {
        let guard = guard(false);
        let token = guard.codec().mint();
        let cookie = format!("csrf_token={token}");

        let result = post(
            &guard,
            &[("host", "app.example"), ("origin", "https://app.example"), ("cookie", &cookie)],
        );
        assert_eq!(result, Err(CsrfRejection::MissingToken));
    }

    #[test]
    fn test_different_valid_tokens_rejected() {
        let guard = guard(false);
        let cookie = format!("csrf_token={}", guard.codec().mint());
        let other = guard.codec().mint();

        let result = post(
            &guard,
            &[
                ("host", "app.example"),
                ("origin", "https://app.example"),
                ("cookie", &cookie),
                ("x-csrf-token", &other),
            ],
        );
        assert_eq!(result, Err(CsrfRejection::TokenMismatch));
    }

    #[test]
    fn test_forged_token_rejected() {
        let guard = guard(false);
        let forged = "lq0000.AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA.AAAA";
        let cookie = format!("csrf_token={forged}");

        let result = post(
            &guard,
            &[
                ("host", "app.example"),
                ("origin", "https://app.example"),
                ("cookie", &cookie),
                ("x-csrf-token", forged),
            ],
        );
        assert!(matches!(result, Err(CsrfRejection::InvalidToken(_))));
    }

    #[test]
    fn test_development_loopback_exemption() {
        let dev = guard(true);
        assert_eq!(
            post(&dev, &[("host", "localhost:3000"), ("referer", "http://localhost:3000/form")]),
            Ok(())
        );
        // No referer at all still needs tokens.
        assert_eq!(post(&dev, &[("host", "localhost:3000")]), Err(CsrfRejection::MissingToken));
        // Production never exempts.
        let prod = guard(false);
        assert_eq!(
            post(&prod, &[("host", "localhost:3000"), ("referer", "http://localhost:3000/form")]),
            Err(CsrfRejection::MissingToken)
        );
    }

    #[test]
    fn test_issued_cookie_attributes() {
        let issued = guard(false).issue().unwrap();
        let cookie = issued.set_cookie.to_str().unwrap();

        assert!(cookie.starts_with(&format!("csrf_token={}", issued.token)));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(!cookie.contains("HttpOnly"));

        let dev_cookie = guard(true).issue().unwrap();
        assert!(!dev_cookie.set_cookie.to_str().unwrap().contains("Secure"));
    }
}
