//! Session configuration.
//!
//! A host supplies one record describing where to connect and who it is:
//! ```json
//! { "serverAddress": "ws://127.0.0.1:8080", "userId": "alice", "repoId": "r1", "mode": "Create" }
//! ```

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `ws://` or `wss://`, then an IPv4 address or host name, then a port.
const SERVER_ADDRESS_PATTERN: &str =
    r"^(wss?://)([0-9]{1,3}(?:\.[0-9]{1,3}){3}|[a-zA-Z][a-zA-Z0-9.-]*):([0-9]{1,5})$";

/// How the session enters its repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// Publish the local workspace as a new repository
    Create,
    /// Download an existing repository into the local workspace
    Join,
}

impl SessionMode {
    pub fn is_new(self) -> bool {
        self == Self::Create
    }
}

/// Connection target and identity for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Base address, e.g. `ws://127.0.0.1:8080`
    pub server_address: String,
    pub user_id: String,
    pub repo_id: String,
    pub mode: SessionMode,
    /// Upper bound on waiting for the site id and the join snapshot
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Upper bound on waiting for a close handshake
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,
}

fn default_handshake_timeout_secs() -> u64 {
    30
}

fn default_close_timeout_secs() -> u64 {
    5
}

impl SessionConfig {
    pub fn new(
        server_address: impl Into<String>,
        user_id: impl Into<String>,
        repo_id: impl Into<String>,
        mode: SessionMode,
    ) -> Self {
        Self {
            server_address: server_address.into(),
            user_id: user_id.into(),
            repo_id: repo_id.into(),
            mode,
            handshake_timeout_secs: default_handshake_timeout_secs(),
            close_timeout_secs: default_close_timeout_secs(),
        }
    }

    /// Parse and validate a JSON config record.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server_address(&self.server_address)?;
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::MissingField("userId"));
        }
        if self.repo_id.trim().is_empty() {
            return Err(ConfigError::MissingField("repoId"));
        }
        Ok(())
    }

    /// Control channel endpoint.
    pub fn control_url(&self) -> String {
        control_url(&self.server_address)
    }

    /// Shared-document channel endpoint.
    pub fn doc_url(&self) -> String {
        doc_url(&self.server_address)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

pub fn control_url(server_address: &str) -> String {
    format!("{}/websocket", server_address.trim_end_matches('/'))
}

pub fn doc_url(server_address: &str) -> String {
    format!("{}/sharedb", server_address.trim_end_matches('/'))
}

/// Check a `ws(s)://host:port` address.
pub fn validate_server_address(address: &str) -> Result<(), ConfigError> {
    let re = Regex::new(SERVER_ADDRESS_PATTERN).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let caps = re
        .captures(address)
        .ok_or_else(|| ConfigError::InvalidAddress(address.to_string()))?;

    let port_ok = caps
        .get(3)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .is_some_and(|port| (1..=65535).contains(&port));
    if !port_ok {
        return Err(ConfigError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    InvalidAddress(String),
    MissingField(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Config I/O error: {e}"),
            Self::Parse(e) => write!(f, "Config parse error: {e}"),
            Self::InvalidAddress(a) => write!(f, "Invalid server address: {a} (expected ws://host:port)"),
            Self::MissingField(name) => write!(f, "Config field {name} must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json_defaults() {
        let config = SessionConfig::from_json(
            r#"{"serverAddress":"ws://127.0.0.1:8080","userId":"alice","repoId":"r1","mode":"Create"}"#,
        )
        .unwrap();
        assert_eq!(config.mode, SessionMode::Create);
        assert!(config.mode.is_new());
        assert_eq!(config.handshake_timeout(), Duration::from_secs(30));
        assert_eq!(config.close_timeout(), Duration::from_secs(5));
        assert_eq!(config.control_url(), "ws://127.0.0.1:8080/websocket");
        assert_eq!(config.doc_url(), "ws://127.0.0.1:8080/sharedb");
    }

    #[test]
    fn test_config_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(
            &path,
            r#"{"serverAddress":"wss://collab.example.org:443","userId":"bob","repoId":"r2","mode":"Join","handshakeTimeoutSecs":3}"#,
        )
        .unwrap();

        let config = SessionConfig::from_path(&path).unwrap();
        assert_eq!(config.mode, SessionMode::Join);
        assert_eq!(config.handshake_timeout_secs, 3);
    }

    #[test]
    fn test_config_missing_file() {
        let err = SessionConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_server_address_validation() {
        assert!(validate_server_address("ws://127.0.0.1:8080").is_ok());
        assert!(validate_server_address("wss://localhost:443").is_ok());
        assert!(validate_server_address("ws://collab-1.internal:9000").is_ok());

        assert!(validate_server_address("http://127.0.0.1:8080").is_err());
        assert!(validate_server_address("ws://127.0.0.1").is_err());
        assert!(validate_server_address("ws://127.0.0.1:99999").is_err());
        assert!(validate_server_address("ws://127.0.0.1:0").is_err());
        assert!(validate_server_address("ws://127.0.0.1:8080/path").is_err());
    }

    #[test]
    fn test_empty_identity_rejected() {
        let config = SessionConfig::new("ws://127.0.0.1:8080", " ", "r1", SessionMode::Join);
        assert_eq!(config.validate(), Err(ConfigError::MissingField("userId")));

        let config = SessionConfig::new("ws://127.0.0.1:8080", "alice", "", SessionMode::Join);
        assert_eq!(config.validate(), Err(ConfigError::MissingField("repoId")));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = SessionConfig::from_json(
            r#"{"serverAddress":"ws://127.0.0.1:8080","userId":"a","repoId":"r","mode":"Quit"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
