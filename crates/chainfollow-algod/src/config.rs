//! algod connection settings: explicit, or discovered from a data directory.

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use chainfollow_core::FollowError;

/// File in the data directory holding the node's `host:port`.
pub const NET_FILE: &str = "algod.net";
/// File in the data directory holding the API token.
pub const TOKEN_FILE: &str = "algod.token";
/// Header the node reads its API token from.
pub const TOKEN_HEADER: &str = "X-Algo-API-Token";

/// How requests authenticate against the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgodAuth {
    None,
    /// Sent as `X-Algo-API-Token`.
    Token(String),
    /// An arbitrary header, e.g. a gateway API key.
    Header { name: String, value: String },
}

impl AlgodAuth {
    /// Parse `NAME:VALUE` into a header credential.
    pub fn parse_header(header: &str) -> Result<Self, FollowError> {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| FollowError::Config(format!("header {header:?} is not NAME:VALUE")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(FollowError::Config(format!("header {header:?} has an empty name")));
        }
        let auth = Self::Header {
            name: name.to_string(),
            value: value.trim().to_string(),
        };
        auth.validate()?;
        Ok(auth)
    }

    /// Check that the credential can be sent as an HTTP header.
    pub fn validate(&self) -> Result<(), FollowError> {
        let (name, value) = match self {
            Self::None => return Ok(()),
            Self::Token(token) => (TOKEN_HEADER, token.as_str()),
            Self::Header { name, value } => (name.as_str(), value.as_str()),
        };
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FollowError::Config(format!("invalid header name {name:?}: {e}")))?;
        HeaderValue::from_str(value)
            .map_err(|e| FollowError::Config(format!("invalid value for header {name:?}: {e}")))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgodConfig {
    /// Base URL, e.g. `http://127.0.0.1:8080`.
    pub address: String,
    pub auth: AlgodAuth,
    /// Timeout for status and block requests. The wait-for-block long-poll
    /// is not bounded by it.
    pub request_timeout: Duration,
}

impl AlgodConfig {
    pub fn new(address: impl AsRef<str>, auth: AlgodAuth) -> Self {
        Self {
            address: normalize_address(address.as_ref()),
            auth,
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Read `algod.net` and `algod.token` from a node data directory.
    pub fn from_data_dir(dir: impl AsRef<Path>) -> Result<Self, FollowError> {
        let dir = dir.as_ref();
        let read = |name: &str| {
            std::fs::read_to_string(dir.join(name))
                .map(|s| s.trim().to_string())
                .map_err(|e| FollowError::Config(format!("{}: {e}", dir.join(name).display())))
        };
        let address = read(NET_FILE)?;
        let token = read(TOKEN_FILE)?;
        tracing::debug!(data_dir = %dir.display(), %address, "discovered algod");
        Ok(Self::new(address, AlgodAuth::Token(token)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// `127.0.0.1:8080/` → `http://127.0.0.1:8080`.
fn normalize_address(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_gets_scheme() {
        assert_eq!(AlgodConfig::new("127.0.0.1:8080", AlgodAuth::None).address, "http://127.0.0.1:8080");
        assert_eq!(
            AlgodConfig::new("https://node.example/", AlgodAuth::None).address,
            "https://node.example"
        );
    }

    #[test]
    fn discovers_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(NET_FILE), "127.0.0.1:4001\n").unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE), "abc123\n").unwrap();
        let cfg = AlgodConfig::from_data_dir(dir.path()).unwrap();
        assert_eq!(cfg.address, "http://127.0.0.1:4001");
        assert_eq!(cfg.auth, AlgodAuth::Token("abc123".into()));
    }

    #[test]
    fn missing_token_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(NET_FILE), "127.0.0.1:4001").unwrap();
        assert!(matches!(AlgodConfig::from_data_dir(dir.path()), Err(FollowError::Config(_))));
    }

    #[test]
    fn parses_header_credential() {
        assert_eq!(
            AlgodAuth::parse_header("X-API-Key: secret").unwrap(),
            AlgodAuth::Header {
                name: "X-API-Key".into(),
                value: "secret".into()
            }
        );
        assert!(AlgodAuth::parse_header("no-colon").is_err());
    }

    #[test]
    fn invalid_header_is_config_error() {
        assert!(matches!(AlgodAuth::parse_header("X Bad:v"), Err(FollowError::Config(_))));
        assert!(matches!(AlgodAuth::parse_header("X-Key:a\nb"), Err(FollowError::Config(_))));
        assert!(matches!(
            AlgodAuth::Token("tok\r\nen".into()).validate(),
            Err(FollowError::Config(_))
        ));
        assert!(AlgodAuth::Token("abc123".into()).validate().is_ok());
    }
}
