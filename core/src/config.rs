//! Client configuration.
//!
//! `ClientConfig` can be built in code, deserialized (JSON/TOML through
//! serde), or read from `PAYMENT_SDK_*` environment variables. Every path
//! ends in [`ClientConfig::validate`], so bad settings surface when the
//! client is constructed rather than on the first request.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::Credentials;
use crate::error::{Error, Result};

pub const DEFAULT_BASE_PATH: &str = "https://app-wallee.com:443/api";
pub const DEFAULT_USER_AGENT: &str = concat!("payment-sdk-rust/", env!("CARGO_PKG_VERSION"));

pub const ENV_BASE_PATH: &str = "PAYMENT_SDK_BASE_PATH";
pub const ENV_USER_ID: &str = "PAYMENT_SDK_USER_ID";
pub const ENV_AUTHENTICATION_KEY: &str = "PAYMENT_SDK_AUTHENTICATION_KEY";
pub const ENV_TIMEOUT_SECS: &str = "PAYMENT_SDK_TIMEOUT_SECS";
pub const ENV_CERTIFICATE_AUTHORITY: &str = "PAYMENT_SDK_CERTIFICATE_AUTHORITY";
pub const ENV_VERIFY_TLS: &str = "PAYMENT_SDK_VERIFY_TLS";
pub const ENV_TEMP_DIR: &str = "PAYMENT_SDK_TEMP_DIR";
pub const ENV_DEBUG: &str = "PAYMENT_SDK_DEBUG";
pub const ENV_DEBUG_FILE: &str = "PAYMENT_SDK_DEBUG_FILE";

/// Settings for one `ApiClient`.
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_path")]
    pub base_path: String,

    pub user_id: u64,

    /// Base64 encoded authentication key of the application user.
    pub authentication_key: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// PEM bundle of trusted certificate authorities.
    #[serde(default)]
    pub certificate_authority: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub verify_tls: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Headers sent with every request.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,

    /// Where downloaded files are written.
    #[serde(default = "std::env::temp_dir")]
    pub temp_dir: PathBuf,

    /// Trace raw request and response bytes.
    #[serde(default)]
    pub debug: bool,

    /// Append wire traces to this file instead of the `tracing` output.
    #[serde(default)]
    pub debug_file: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(user_id: u64, authentication_key: impl Into<String>) -> Self {
        Self {
            base_path: default_base_path(),
            user_id,
            authentication_key: authentication_key.into(),
            timeout_secs: default_timeout_secs(),
            certificate_authority: None,
            verify_tls: true,
            user_agent: default_user_agent(),
            default_headers: BTreeMap::new(),
            temp_dir: std::env::temp_dir(),
            debug: false,
            debug_file: None,
        }
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_certificate_authority(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate_authority = Some(path.into());
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_debug_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug = true;
        self.debug_file = Some(path.into());
        self
    }

    /// Read the configuration from `PAYMENT_SDK_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a required variable is missing or a
    /// numeric/boolean variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ClientConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let user_id = lookup(ENV_USER_ID)
            .ok_or_else(|| Error::configuration(format!("{ENV_USER_ID} is not set")))?;
        let user_id = parse_number(ENV_USER_ID, &user_id)?;
        let key = lookup(ENV_AUTHENTICATION_KEY)
            .ok_or_else(|| Error::configuration(format!("{ENV_AUTHENTICATION_KEY} is not set")))?;

        let mut config = Self::new(user_id, key);
        if let Some(base_path) = lookup(ENV_BASE_PATH) {
            config.base_path = base_path;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_SECS) {
            config.timeout_secs = parse_number(ENV_TIMEOUT_SECS, &timeout)?;
        }
        if let Some(ca) = lookup(ENV_CERTIFICATE_AUTHORITY) {
            config.certificate_authority = Some(PathBuf::from(ca));
        }
        if let Some(verify) = lookup(ENV_VERIFY_TLS) {
            config.verify_tls = parse_bool(ENV_VERIFY_TLS, &verify)?;
        }
        if let Some(dir) = lookup(ENV_TEMP_DIR) {
            config.temp_dir = PathBuf::from(dir);
        }
        if let Some(debug) = lookup(ENV_DEBUG) {
            config.debug = parse_bool(ENV_DEBUG, &debug)?;
        }
        if let Some(file) = lookup(ENV_DEBUG_FILE) {
            config.debug_file = Some(PathBuf::from(file));
        }
        config.validate()?;
        Ok(config)
    }

    /// Check every setting that can be checked without network access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_path.starts_with("https://") || self.base_path.starts_with("http://")) {
            return Err(Error::configuration(format!(
                "base path `{}` must be an http(s) URL",
                self.base_path
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::configuration("timeout must be at least one second"));
        }
        if let Some(ca) = &self.certificate_authority {
            if !ca.is_file() {
                return Err(Error::configuration(format!(
                    "certificate authority file {} does not exist",
                    ca.display()
                )));
            }
        }
        if self.user_agent.trim().is_empty() {
            return Err(Error::configuration("user agent must not be empty"));
        }
        self.credentials()?;
        Ok(())
    }

    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::new(self.user_id, &self.authentication_key)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base path without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_path.trim_end_matches('/')
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_path", &self.base_path)
            .field("user_id", &self.user_id)
            .field("authentication_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("certificate_authority", &self.certificate_authority)
            .field("verify_tls", &self.verify_tls)
            .field("user_agent", &self.user_agent)
            .field("default_headers", &self.default_headers)
            .field("temp_dir", &self.temp_dir)
            .field("debug", &self.debug)
            .field("debug_file", &self.debug_file)
            .finish()
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::configuration(format!("{name} must be numeric, got `{raw}`")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::configuration(format!("{name} must be a boolean, got `{raw}`"))),
    }
}

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

fn default_timeout_secs() -> u64 {
    25
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
