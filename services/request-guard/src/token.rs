// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Stateless signed CSRF tokens.
//!
//! Wire format: `timestamp.random.signature`
//!
//! - `timestamp`: issue instant in milliseconds since the Unix epoch, base36
//! - `random`: 32 bytes from the thread CSPRNG, base64url without padding
//! - `signature`: HMAC-SHA256 over `timestamp.random`, base64url without padding
//!
//! Nothing is stored server-side. A token is valid iff it is well formed, its
//! signature matches under the current secret, and its age lies within the
//! validity window. Rotating the secret invalidates every outstanding token.

use crate::clock::Clock;
use crate::config::{ConfigError, MIN_SECRET_LEN};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of randomness per token.
pub const RANDOM_LEN: usize = 32;

/// Shortest random segment accepted on verification, in bytes.
const MIN_RANDOM_LEN: usize = 24;

/// Why a token failed verification.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("token was issued in the future")]
    FromFuture,
}

/// HMAC key used to sign tokens. Read-only once constructed.
#[derive(Clone)]
pub struct SigningSecret {
    mac: HmacSha256,
}

impl SigningSecret {
    pub fn new(bytes: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        let bytes = bytes.as_ref();
        if bytes.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret {
                len: bytes.len(),
                min: MIN_SECRET_LEN,
            });
        }
        let mac = HmacSha256::new_from_slice(bytes).map_err(|_| ConfigError::WeakSecret {
            len: bytes.len(),
            min: MIN_SECRET_LEN,
        })?;
        Ok(Self { mac })
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    /// Constant-time signature check.
    fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.verify_slice(signature).is_ok()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Mints and verifies CSRF tokens.
#[derive(Clone)]
pub struct TokenCodec {
    secret: SigningSecret,
    validity: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(secret: SigningSecret, validity: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret,
            validity,
            clock,
        }
    }

    /// Token lifetime.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Create a fresh token.
    pub fn mint(&self) -> String {
        let millis = self.clock.now().timestamp_millis().max(0) as u64;
        let timestamp = to_base36(millis);

        let mut random = [0u8; RANDOM_LEN];
        rand::thread_rng().fill_bytes(&mut random);
        let random = URL_SAFE_NO_PAD.encode(random);

        let payload = format!("{timestamp}.{random}");
        let signature = URL_SAFE_NO_PAD.encode(self.secret.sign(payload.as_bytes()));

        format!("{payload}.{signature}")
    }

    /// Whether `token` is currently valid.
    pub fn verify(&self, token: &str) -> bool {
        self.inspect(token).is_ok()
    }

    /// Verify `token`, returning its issue instant or the reason it failed.
    pub fn inspect(&self, token: &str) -> Result<DateTime<Utc>, TokenError> {
        let mut parts = token.split('.');
        let (Some(timestamp), Some(random), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };
        if timestamp.is_empty() || timestamp.len() > 13 || random.is_empty() || signature.is_empty() {
            return Err(TokenError::Malformed);
        }

        let random_bytes = URL_SAFE_NO_PAD
            .decode(random)
            .map_err(|_| TokenError::Malformed)?;
        if random_bytes.len() < MIN_RANDOM_LEN {
            return Err(TokenError::Malformed);
        }
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        let payload = format!("{timestamp}.{random}");
        if !self.secret.verify(payload.as_bytes(), &signature) {
            return Err(TokenError::BadSignature);
        }

        let issued = from_base36(timestamp)
            .and_then(|ms| i64::try_from(ms).ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or(TokenError::Malformed)?;

        let age = self.clock.now() - issued;
        if age < Duration::zero() {
            return Err(TokenError::FromFuture);
        }
        if age > self.validity {
            return Err(TokenError::Expired);
        }
        Ok(issued)
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &self.secret)
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn from_base36(s: &str) -> Option<u64> {
    if !s.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()) {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}
