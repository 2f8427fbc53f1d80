//! On-disk user directory
//!
//! Maps usernames to password hashes, friend sets and last-known network
//! addresses, persisted one `<username>.user` file per record. The full
//! record set is cached in memory at open and written through on every
//! mutation, so lookups on the connection path never touch the filesystem.

mod record;

pub use record::UserRecord;

use crate::error::{Error, Result};
use crate::network::MAX_USERNAME_LEN;
use base64::Engine;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// File extension for user record files
const RECORD_EXT: &str = "user";

/// User record store backed by a data directory
pub struct Directory {
    users_dir: PathBuf,
    users: RwLock<HashMap<String, UserRecord>>,
}

impl Directory {
    /// Open (creating if necessary) the record store under `path`
    ///
    /// Records live in `<path>/users/*.user`. Unreadable or malformed files
    /// are skipped with a warning rather than failing the whole store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let users_dir = path.as_ref().join("users");
        std::fs::create_dir_all(&users_dir)?;

        let mut users = HashMap::new();
        for entry in std::fs::read_dir(&users_dir)? {
            let entry = entry?;
            let file = entry.path();
            if file.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            match std::fs::read_to_string(&file).map_err(Error::Io).and_then(
                |data| UserRecord::parse(&data),
            ) {
                Ok(record) => {
                    users.insert(record.username.clone(), record);
                }
                Err(err) => {
                    tracing::warn!(file = %file.display(), %err, "skipping unreadable user record");
                }
            }
        }

        Ok(Self {
            users_dir,
            users: RwLock::new(users),
        })
    }

    /// Register a new user with an empty friend set
    pub fn register(&self, username: &str, password: &str) -> Result<()> {
        let username = username.trim();
        validate_username(username)?;

        let mut users = self.users.write();
        if users.contains_key(username) {
            return Err(Error::Directory(format!(
                "user '{username}' is already registered"
            )));
        }

        let record = UserRecord::new(username.to_string(), hash_password(password));
        self.save(&record)?;
        users.insert(username.to_string(), record);
        Ok(())
    }

    /// Check a username/password pair against the stored hash
    pub fn validate(&self, username: &str, password: &str) -> bool {
        self.users
            .read()
            .get(username)
            .map(|record| record.password_hash == hash_password(password))
            .unwrap_or(false)
    }

    /// Whether a user is registered
    pub fn user_exists(&self, username: &str) -> bool {
        self.users.read().contains_key(username)
    }

    /// Fetch a user's record
    pub fn get(&self, username: &str) -> Option<UserRecord> {
        self.users.read().get(username).cloned()
    }

    /// All registered usernames
    pub fn usernames(&self) -> Vec<String> {
        self.users.read().keys().cloned().collect()
    }

    /// A user's friend set; empty for unknown users
    pub fn friends_of(&self, username: &str) -> Vec<String> {
        self.users
            .read()
            .get(username)
            .map(|record| record.friends.clone())
            .unwrap_or_default()
    }

    /// Whether `username` has `friend` in their friend set
    ///
    /// Friendship is kept symmetric by [`Directory::add_friend`], so one
    /// direction is authoritative.
    pub fn are_friends(&self, username: &str, friend: &str) -> bool {
        self.users
            .read()
            .get(username)
            .map(|record| record.is_friend(friend))
            .unwrap_or(false)
    }

    /// Make two users friends of each other
    ///
    /// Symmetric and idempotent. Befriending yourself or an unknown user is
    /// an error.
    pub fn add_friend(&self, username: &str, friend: &str) -> Result<()> {
        if username == friend {
            return Err(Error::Directory("cannot befriend yourself".into()));
        }

        let mut users = self.users.write();
        if !users.contains_key(username) || !users.contains_key(friend) {
            return Err(Error::Directory("both users must be registered".into()));
        }

        for (a, b) in [(username, friend), (friend, username)] {
            let Some(record) = users.get_mut(a) else {
                continue;
            };
            if !record.is_friend(b) {
                record.friends.push(b.to_string());
                let snapshot = record.clone();
                self.save(&snapshot)?;
            }
        }
        Ok(())
    }

    /// Remove a friendship in both directions; idempotent
    pub fn remove_friend(&self, username: &str, friend: &str) -> Result<()> {
        let mut users = self.users.write();
        for (a, b) in [(username, friend), (friend, username)] {
            if let Some(record) = users.get_mut(a) {
                let before = record.friends.len();
                record.friends.retain(|f| f != b);
                if record.friends.len() != before {
                    let snapshot = record.clone();
                    self.save(&snapshot)?;
                }
            }
        }
        Ok(())
    }

    /// Publish a user's current address and listening port
    pub fn update_address(&self, username: &str, ip: IpAddr, port: u16) -> Result<()> {
        let mut users = self.users.write();
        let record = users
            .get_mut(username)
            .ok_or_else(|| Error::Directory(format!("unknown user '{username}'")))?;
        record.address = Some(ip);
        record.port = port;
        let snapshot = record.clone();
        self.save(&snapshot)
    }

    /// Case-insensitive substring search over usernames
    pub fn search(&self, term: &str) -> Vec<String> {
        let term = term.to_lowercase();
        self.users
            .read()
            .keys()
            .filter(|name| name.to_lowercase().contains(&term))
            .cloned()
            .collect()
    }

    fn save(&self, record: &UserRecord) -> Result<()> {
        let file = self
            .users_dir
            .join(format!("{}.{}", record.username, RECORD_EXT));
        std::fs::write(file, record.serialize())?;
        Ok(())
    }
}

/// SHA-256 then base64, matching the reference directory's stored hashes
fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(Error::Directory("username must not be empty".into()));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(Error::Directory(format!(
            "username exceeds {MAX_USERNAME_LEN} bytes"
        )));
    }
    if username.contains('=') || username.contains(',') {
        return Err(Error::Directory(
            "username must not contain '=' or ','".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Directory) {
        let dir = TempDir::new().unwrap();
        let directory = Directory::open(dir.path()).unwrap();
        (dir, directory)
    }

    #[test]
    fn test_register_and_validate() {
        let (_guard, directory) = open_temp();
        directory.register("alice", "secret").unwrap();

        assert!(directory.user_exists("alice"));
        assert!(directory.validate("alice", "secret"));
        assert!(!directory.validate("alice", "wrong"));
        assert!(!directory.validate("nobody", "secret"));
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_names() {
        let (_guard, directory) = open_temp();
        directory.register("alice", "secret").unwrap();

        assert!(directory.register("alice", "other").is_err());
        assert!(directory.register("", "pw").is_err());
        assert!(directory.register("a=b", "pw").is_err());
        assert!(directory.register("a,b", "pw").is_err());
    }

    #[test]
    fn test_friendship_is_symmetric() {
        let (_guard, directory) = open_temp();
        directory.register("alice", "pw").unwrap();
        directory.register("bob", "pw").unwrap();

        directory.add_friend("alice", "bob").unwrap();
        assert!(directory.are_friends("alice", "bob"));
        assert!(directory.are_friends("bob", "alice"));

        // Idempotent
        directory.add_friend("alice", "bob").unwrap();
        assert_eq!(directory.friends_of("alice"), vec!["bob"]);

        directory.remove_friend("bob", "alice").unwrap();
        assert!(!directory.are_friends("alice", "bob"));
        assert!(!directory.are_friends("bob", "alice"));
    }

    #[test]
    fn test_self_friendship_rejected() {
        let (_guard, directory) = open_temp();
        directory.register("alice", "pw").unwrap();
        assert!(directory.add_friend("alice", "alice").is_err());
    }

    #[test]
    fn test_friendship_requires_registered_users() {
        let (_guard, directory) = open_temp();
        directory.register("alice", "pw").unwrap();
        assert!(directory.add_friend("alice", "ghost").is_err());
    }

    #[test]
    fn test_update_address() {
        let (_guard, directory) = open_temp();
        directory.register("alice", "pw").unwrap();

        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        directory.update_address("alice", ip, 9000).unwrap();

        let record = directory.get("alice").unwrap();
        assert_eq!(record.address, Some(ip));
        assert_eq!(record.port, 9000);
        assert!(directory.update_address("ghost", ip, 9000).is_err());
    }

    #[test]
    fn test_persists_across_reopen() {
        let guard = TempDir::new().unwrap();
        {
            let directory = Directory::open(guard.path()).unwrap();
            directory.register("alice", "pw").unwrap();
            directory.register("bob", "pw").unwrap();
            directory.add_friend("alice", "bob").unwrap();
            directory
                .update_address("alice", IpAddr::V4(Ipv4Addr::LOCALHOST), 8888)
                .unwrap();
        }

        let reopened = Directory::open(guard.path()).unwrap();
        assert!(reopened.validate("alice", "pw"));
        assert!(reopened.are_friends("alice", "bob"));
        assert_eq!(
            reopened.get("alice").unwrap().socket_addr().unwrap().port(),
            8888
        );
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let (_guard, directory) = open_temp();
        directory.register("Alice", "pw").unwrap();
        directory.register("bob", "pw").unwrap();

        assert_eq!(directory.search("ali"), vec!["Alice"]);
        assert!(directory.search("zzz").is_empty());
    }

    #[test]
    fn test_hash_matches_reference_encoding() {
        // SHA-256("password") base64-encoded, as the reference store writes it
        assert_eq!(
            hash_password("password"),
            "XohImNooBHFR0OVvjcYpJ3NgPQ1qq73WKhHvch0VQtg="
        );
    }
}
