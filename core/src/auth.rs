//! Request authentication with a keyed MAC over request metadata.
//!
//! Every request carries four headers: the MAC protocol version, the caller's
//! user id, the Unix timestamp of signing, and
//! `base64(HMAC-SHA512(secret, "version|userId|timestamp|METHOD|path"))`.
//! The secret is decoded once when the authenticator is built; a bad secret
//! is a configuration error, never a per-request one.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::error::{Error, Result};
use crate::http::{Headers, HttpMethod};

type HmacSha512 = Hmac<Sha512>;

pub const MAC_VERSION: u32 = 1;

pub const HEADER_MAC_VERSION: &str = "x-mac-version";
pub const HEADER_MAC_USER_ID: &str = "x-mac-userid";
pub const HEADER_MAC_TIMESTAMP: &str = "x-mac-timestamp";
pub const HEADER_MAC_VALUE: &str = "x-mac-value";

/// Application user id plus its decoded authentication key.
#[derive(Clone)]
pub struct Credentials {
    user_id: u64,
    secret: Vec<u8>,
}

impl Credentials {
    /// Decode `secret_base64` and pair it with `user_id`.
    pub fn new(user_id: u64, secret_base64: &str) -> Result<Self> {
        let trimmed = secret_base64.trim();
        if trimmed.is_empty() {
            return Err(Error::configuration("authentication key must not be empty"));
        }
        let secret = STANDARD
            .decode(trimmed)
            .map_err(|e| Error::configuration(format!("authentication key is not valid base64: {e}")))?;
        if secret.is_empty() {
            return Err(Error::configuration("authentication key decodes to zero bytes"));
        }
        Ok(Self { user_id, secret })
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The four authentication headers of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacHeaders {
    pub version: u32,
    pub user_id: u64,
    pub timestamp: i64,
    pub mac: String,
}

impl MacHeaders {
    pub fn to_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert(HEADER_MAC_VERSION, self.version.to_string());
        headers.insert(HEADER_MAC_USER_ID, self.user_id.to_string());
        headers.insert(HEADER_MAC_TIMESTAMP, self.timestamp.to_string());
        headers.insert(HEADER_MAC_VALUE, self.mac.clone());
        headers
    }
}

/// Computes per-request MAC headers. Holds no mutable state.
#[derive(Clone)]
pub struct RequestAuthenticator {
    user_id: u64,
    keyed: HmacSha512,
}

impl RequestAuthenticator {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let keyed = HmacSha512::new_from_slice(&credentials.secret)
            .map_err(|e| Error::configuration(format!("unusable authentication key: {e}")))?;
        Ok(Self {
            user_id: credentials.user_id,
            keyed,
        })
    }

    /// Sign `method` and `path` (no query string) with the current time.
    pub fn sign(&self, method: HttpMethod, path: &str) -> MacHeaders {
        self.sign_at(method, path, unix_now())
    }

    /// Sign with an explicit timestamp.
    pub fn sign_at(&self, method: HttpMethod, path: &str, timestamp: i64) -> MacHeaders {
        let secured = format!(
            "{MAC_VERSION}|{}|{timestamp}|{}|{path}",
            self.user_id,
            method.as_str()
        );
        let mut mac = self.keyed.clone();
        mac.update(secured.as_bytes());
        MacHeaders {
            version: MAC_VERSION,
            user_id: self.user_id,
            timestamp,
            mac: STANDARD.encode(mac.finalize().into_bytes()),
        }
    }
}

impl fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

fn unix_now() -> i64 {
    // A clock before 1970 signs with 0; the server rejects it as stale.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator(user_id: u64) -> RequestAuthenticator {
        let creds = Credentials::new(user_id, "c2VjcmV0").unwrap();
        RequestAuthenticator::new(&creds).unwrap()
    }

    #[test]
    fn reference_mac_for_account_read() {
        let headers = authenticator(42).sign_at(HttpMethod::Get, "/account", 1_700_000_000);
        assert_eq!(
            headers.mac,
            "/7Ca5OwAtTdDtLV1u3tmEvLcO5gS4E+NCt93P2F0zeOh5zjkXz4cCd04pFQcCC5tpqkU1Za/N0JrF3e3BVc4Zw=="
        );
        assert_eq!(headers.version, 1);
        assert_eq!(headers.user_id, 42);
        assert_eq!(headers.timestamp, 1_700_000_000);
    }

    #[test]
    fn mac_is_deterministic() {
        let auth = authenticator(42);
        let a = auth.sign_at(HttpMethod::Post, "/transaction/create", 1_700_000_123);
        let b = auth.sign_at(HttpMethod::Post, "/transaction/create", 1_700_000_123);
        assert_eq!(a, b);
    }

    #[test]
    fn every_input_changes_the_mac() {
        let base = authenticator(42).sign_at(HttpMethod::Get, "/account", 1_700_000_000).mac;
        let variants = [
            authenticator(43).sign_at(HttpMethod::Get, "/account", 1_700_000_000).mac,
            authenticator(42).sign_at(HttpMethod::Post, "/account", 1_700_000_000).mac,
            authenticator(42).sign_at(HttpMethod::Get, "/accounts", 1_700_000_000).mac,
            authenticator(42).sign_at(HttpMethod::Get, "/account", 1_700_000_001).mac,
        ];
        for v in variants {
            assert_ne!(v, base);
        }
        let other_key = Credentials::new(42, "b3RoZXI=").unwrap();
        let mac = RequestAuthenticator::new(&other_key)
            .unwrap()
            .sign_at(HttpMethod::Get, "/account", 1_700_000_000)
            .mac;
        assert_eq!(
            mac,
            "9ovgZA5hbYfTRqWUymzSY/xPD2sCfTb+SaGkHC1nDmq8e/Wiw7LmHsYroV631xVQNzdS9Nj+Gk3UjWm51VG7wQ=="
        );
    }

    #[test]
    fn headers_use_wire_names() {
        let headers = authenticator(42)
            .sign_at(HttpMethod::Get, "/account", 1_700_000_000)
            .to_headers();
        assert_eq!(headers.get("x-mac-version"), Some("1"));
        assert_eq!(headers.get("x-mac-userid"), Some("42"));
        assert_eq!(headers.get("x-mac-timestamp"), Some("1700000000"));
        assert!(headers.get("x-mac-value").is_some());
    }

    #[test]
    fn sign_uses_current_time() {
        let before = unix_now();
        let headers = authenticator(1).sign(HttpMethod::Get, "/x");
        assert!(headers.timestamp >= before);
    }

    #[test]
    fn invalid_keys_fail_at_construction() {
        assert!(matches!(Credentials::new(1, ""), Err(Error::Configuration(_))));
        assert!(matches!(Credentials::new(1, "   "), Err(Error::Configuration(_))));
        assert!(matches!(
            Credentials::new(1, "not base64!!"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let creds = Credentials::new(42, "c2VjcmV0").unwrap();
        let out = format!("{creds:?}");
        assert!(out.contains("42"));
        assert!(!out.contains("115, 101"));
        assert!(out.contains("<redacted>"));
    }
}
