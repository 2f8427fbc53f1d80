//! Common test helpers and fixtures
//!
//! Shared utilities for integration tests: a throwaway directory populated
//! with friends, node startup on ephemeral loopback ports, and an event
//! sink for asserting on delivered events.

use lanchat::{ChatNode, ChatNodeBuilder, Directory, Event};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Create a temporary directory store with the given users all registered
/// and every listed pair befriended
pub fn directory_with_friends(users: &[&str], friendships: &[(&str, &str)]) -> (TempDir, Arc<Directory>) {
    let guard = TempDir::new().unwrap();
    let directory = Arc::new(Directory::open(guard.path()).unwrap());
    for user in users {
        directory.register(user, "pw").unwrap();
    }
    for (a, b) in friendships {
        directory.add_friend(a, b).unwrap();
    }
    (guard, directory)
}

/// Build and start a node on an ephemeral loopback port
pub async fn start_node(directory: &Arc<Directory>, username: &str) -> ChatNode {
    let node = ChatNodeBuilder::new()
        .with_username(username)
        .with_directory(Arc::clone(directory))
        .with_listen_port(0)
        .with_advertise_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .with_connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    node.start().await.unwrap();
    node
}

/// Collects every event a node dispatches
#[derive(Clone)]
pub struct EventSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventSink {
    /// Attach a fresh sink to a node
    pub fn attach(node: &ChatNode) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        node.on_event(move |event| sink.lock().unwrap().push(event));
        Self { events }
    }

    /// Snapshot of everything received so far
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Whether any transcript line contains `needle`
    pub fn transcript_contains(&self, needle: &str) -> bool {
        self.snapshot().iter().any(|event| {
            matches!(event, Event::MessageAppended { text } if text.contains(needle))
        })
    }

    /// Whether `username` was flagged as having unread messages
    pub fn has_unread(&self, username: &str) -> bool {
        self.snapshot().iter().any(|event| {
            matches!(event, Event::FriendUnread { username: u } if u == username)
        })
    }

    /// Whether a disconnect was reported for `username`
    pub fn saw_disconnect(&self, username: &str) -> bool {
        self.snapshot().iter().any(|event| {
            matches!(event, Event::Disconnected { username: u, .. } if u == username)
        })
    }
}

/// Poll `cond` every 20ms until it holds or the timeout expires
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
