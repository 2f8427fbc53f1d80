//! User record (de)serialization
//!
//! Records are stored one file per user as `Key=Value` lines:
//!
//! ```text
//! Username=alice
//! PasswordHash=base64-of-sha256
//! IPAddress=192.168.1.17
//! Port=8888
//! Friends=bob,carol
//! ```
//!
//! Unknown keys are ignored so the format can grow without breaking older
//! files.

use crate::error::{Error, Result};
use crate::network::DEFAULT_PORT;
use std::net::{IpAddr, SocketAddr};

/// One user's directory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Unique username, the record key
    pub username: String,
    /// Base64-encoded SHA-256 of the password
    pub password_hash: String,
    /// Last-known IP address, published on login
    pub address: Option<IpAddr>,
    /// Last-known listening port; 0 means unknown
    pub port: u16,
    /// Usernames of this user's friends
    pub friends: Vec<String>,
}

impl UserRecord {
    /// Create a fresh record with no address and no friends
    pub fn new<S: Into<String>>(username: S, password_hash: S) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            address: None,
            port: 0,
            friends: Vec::new(),
        }
    }

    /// The last-known connect target, if an address is on record
    ///
    /// A recorded port of 0 falls back to the default port.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        let port = if self.port > 0 {
            self.port
        } else {
            DEFAULT_PORT
        };
        self.address.map(|ip| SocketAddr::new(ip, port))
    }

    /// Whether `name` is in this record's friend set
    pub fn is_friend(&self, name: &str) -> bool {
        self.friends.iter().any(|f| f == name)
    }

    /// Render the record in its on-disk form
    pub fn serialize(&self) -> String {
        let address = self
            .address
            .map(|ip| ip.to_string())
            .unwrap_or_default();
        format!(
            "Username={}\nPasswordHash={}\nIPAddress={}\nPort={}\nFriends={}\n",
            self.username,
            self.password_hash,
            address,
            self.port,
            self.friends.join(",")
        )
    }

    /// Parse a record from its on-disk form
    pub fn parse(data: &str) -> Result<Self> {
        let mut record = Self::new("", "");
        for line in data.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "Username" => record.username = value.to_string(),
                "PasswordHash" => record.password_hash = value.to_string(),
                "IPAddress" => record.address = value.parse().ok(),
                "Port" => record.port = value.parse().unwrap_or(0),
                "Friends" => {
                    record.friends = value
                        .split(',')
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(String::from)
                        .collect();
                }
                _ => {}
            }
        }
        if record.username.is_empty() {
            return Err(Error::Directory("record has no username".into()));
        }
        Ok(record)
    }
}
