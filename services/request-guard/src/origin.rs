// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Origin/Referer verification for state-changing requests.
//!
//! Deny by default. Outside development, a request is accepted only when its
//! `Origin` matches the `Host` header or an explicitly trusted origin, or,
//! lacking `Origin`, when its `Referer` matches the `Host` header.
//!
//! Development mode relaxes this in two ways: requests carrying neither
//! header are accepted, and so are requests whose origin or referer points at
//! a loopback host.

use thiserror::Error;
use tracing::debug;
use url::{Host, Url};

/// Why origin verification failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OriginError {
    #[error("origin {0} is not trusted for this host")]
    OriginMismatch(String),

    #[error("referer does not match host")]
    RefererMismatch,

    #[error("origin or referer is not a valid URL")]
    Unparseable,

    #[error("neither origin nor referer present")]
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TrustedOrigin {
    /// `scheme://host[:port]`
    Origin(String),
    /// Bare host, any scheme
    Host(String),
}

/// Validates `Origin`/`Referer` against the request's `Host`.
#[derive(Debug, Clone)]
pub struct OriginVerifier {
    development: bool,
    trusted: Vec<TrustedOrigin>,
}

impl OriginVerifier {
    pub fn new<I, S>(development: bool, allowed_origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let trusted = allowed_origins
            .into_iter()
            .filter_map(|entry| {
                let entry = entry.as_ref().trim().trim_end_matches('/');
                if entry.is_empty() {
                    return None;
                }
                match Url::parse(entry) {
                    Ok(url) if url.host_str().is_some() => {
                        Some(TrustedOrigin::Origin(url.origin().ascii_serialization()))
                    }
                    _ => Some(TrustedOrigin::Host(entry.to_ascii_lowercase())),
                }
            })
            .collect();

        Self {
            development,
            trusted,
        }
    }

    pub fn is_development(&self) -> bool {
        self.development
    }

    /// Boolean form of [`OriginVerifier::verify`].
    pub fn is_allowed(&self, origin: Option<&str>, referer: Option<&str>, host: &str) -> bool {
        self.verify(origin, referer, host).is_ok()
    }

    /// Check the request's origin headers against `host`.
    pub fn verify(
        &self,
        origin: Option<&str>,
        referer: Option<&str>,
        host: &str,
    ) -> Result<(), OriginError> {
        let origin = origin.map(str::trim).filter(|s| !s.is_empty());
        let referer = referer.map(str::trim).filter(|s| !s.is_empty());

        if self.development {
            if origin.is_none() && referer.is_none() {
                debug!("No origin headers, accepted in development");
                return Ok(());
            }
            if origin.is_some_and(is_loopback_url) || referer.is_some_and(is_loopback_url) {
                debug!("Loopback origin, accepted in development");
                return Ok(());
            }
        }

        if let Some(origin) = origin {
            let url = Url::parse(origin).map_err(|_| OriginError::Unparseable)?;
            if matches_host(&url, host) || self.is_trusted(&url) {
                return Ok(());
            }
            return Err(OriginError::OriginMismatch(url.origin().ascii_serialization()));
        }

        if let Some(referer) = referer {
            let url = Url::parse(referer).map_err(|_| OriginError::Unparseable)?;
            if matches_host(&url, host) {
                return Ok(());
            }
            return Err(OriginError::RefererMismatch);
        }

        Err(OriginError::Missing)
    }

    fn is_trusted(&self, url: &Url) -> bool {
        let serialized = url.origin().ascii_serialization();
        let host = url.host_str().unwrap_or_default();
        self.trusted.iter().any(|trusted| match trusted {
            TrustedOrigin::Origin(o) => *o == serialized,
            TrustedOrigin::Host(h) => h == host || matches_host(url, h),
        })
    }
}

/// Whether `raw` parses as a URL pointing at a loopback host.
pub fn is_loopback_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => is_loopback(&url),
        Err(_) => false,
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Compare a URL's authority with a `Host` header value.
///
/// A port on either side must agree; a port in `host` equal to the scheme's
/// default matches a URL without one.
fn matches_host(url: &Url, host: &str) -> bool {
    let Some(url_host) = url.host_str() else {
        return false;
    };
    let host = host.trim().to_ascii_lowercase();
    let (name, port) = split_host_port(&host);

    if name.is_empty() || !url_host.eq_ignore_ascii_case(name) {
        return false;
    }
    match port {
        None => url.port().is_none(),
        Some(port) => url.port_or_known_default() == Some(port),
    }
}

fn split_host_port(host: &str) -> (&str, Option<u16>) {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => {
                let port = host[end + 1..].strip_prefix(':').and_then(|p| p.parse().ok());
                (&host[..=end], port)
            }
            None => (host, None),
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse() {
            Ok(port) => (name, Some(port)),
            Err(_) => (host, None),
        },
        None => (host, None),
    }
}
