//! Configuration for a chat node

use crate::error::{Error, Result};
use crate::network::{DEFAULT_PORT, MAX_USERNAME_LEN};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Complete node configuration
///
/// Instances are created via [`crate::ChatNodeBuilder`] and validated before
/// the node is built.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Local username; must exist in the directory
    pub username: String,

    /// Port to accept peer connections on
    ///
    /// Defaults to 8888. Set to 0 to bind an ephemeral port; the
    /// actually-bound port is published to the directory on start.
    pub listen_port: u16,

    /// IP address to advertise in the directory record
    ///
    /// If `None`, the first non-loopback IPv4 interface address is used,
    /// falling back to 127.0.0.1.
    pub advertise_ip: Option<IpAddr>,

    /// Timeout for outbound connect attempts
    pub connect_timeout: Duration,

    /// How long an accepted socket may take to present its handshake
    pub handshake_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            listen_port: DEFAULT_PORT,
            advertise_ip: None,
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl ChatConfig {
    /// Platform-specific default data directory for the user directory store
    ///
    /// - Linux: `~/.local/share/lanchat`
    /// - macOS: `~/Library/Application Support/lanchat`
    /// - Windows: `%APPDATA%/lanchat`
    pub fn default_data_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "lanchat")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./lanchat-data"))
    }

    /// Validate the configuration
    ///
    /// The username must be non-empty, at most [`MAX_USERNAME_LEN`] bytes,
    /// and free of the `=` and `,` characters used by the directory record
    /// format. Timeouts must be non-zero.
    pub fn validate(&self) -> Result<()> {
        let name = self.username.trim();
        if name.is_empty() {
            return Err(Error::Directory("username must not be empty".into()));
        }
        if name.len() > MAX_USERNAME_LEN {
            return Err(Error::Directory(format!(
                "username exceeds {} bytes",
                MAX_USERNAME_LEN
            )));
        }
        if name.contains('=') || name.contains(',') {
            return Err(Error::Directory(
                "username must not contain '=' or ','".into(),
            ));
        }
        if self.connect_timeout.is_zero() || self.handshake_timeout.is_zero() {
            return Err(Error::Directory("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.listen_port, DEFAULT_PORT);
        assert!(config.advertise_ip.is_none());
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_validation_rejects_empty_username() {
        let config = ChatConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_reserved_characters() {
        let config = ChatConfig {
            username: "al=ice".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ChatConfig {
            username: "al,ice".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_oversized_username() {
        let config = ChatConfig {
            username: "a".repeat(MAX_USERNAME_LEN + 1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_accepts_plain_username() {
        let config = ChatConfig {
            username: "alice".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_data_path() {
        let path = ChatConfig::default_data_path();
        assert!(path.to_string_lossy().to_lowercase().contains("lanchat"));
    }
}
