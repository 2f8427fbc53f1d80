//! Chat node - the session controller and main entry point
//!
//! A [`ChatNode`] is one user's endpoint: it runs the accept loop, opens
//! outbound connections, owns the focused-conversation state and exposes the
//! `focus`/`send`/`disconnect`/`shutdown` operations. Instances are built
//! with [`ChatNodeBuilder`].

use crate::api::config::ChatConfig;
use crate::api::events::{DisconnectReason, Event, EventHandlers, Severity, SubscriptionHandle};
use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::network::{
    local_ipv4, spawn_accept_loop, spawn_router, teardown, PeerConnection, PeerListener,
    PeerRegistry,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Current operational state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Built but not started
    Created,
    /// Accept loop running, ready to chat
    Running,
    /// Shut down
    Stopped,
}

/// State shared between the session controller, the accept loop and every
/// router task
pub(crate) struct NodeShared {
    /// Local username, fixed at build time
    pub(crate) username: String,
    /// The live-connection registry
    pub(crate) registry: PeerRegistry,
    /// At most one focused conversation
    pub(crate) focus: Mutex<Option<String>>,
    /// Messages received per friend while not focused, replayed on focus
    pub(crate) pending: Mutex<HashMap<String, VecDeque<String>>>,
    /// UI event subscribers
    pub(crate) events: EventHandlers,
    /// User record store for addresses and friendship checks
    pub(crate) directory: Arc<Directory>,
    /// Inbound handshake deadline
    pub(crate) handshake_timeout: Duration,
}

/// Builder for [`ChatNode`] instances
///
/// # Examples
///
/// ```no_run
/// use lanchat::{ChatNodeBuilder, Directory};
/// use std::sync::Arc;
///
/// # fn example() -> lanchat::Result<()> {
/// let directory = Arc::new(Directory::open("./lanchat-data")?);
/// let node = ChatNodeBuilder::new()
///     .with_username("alice")
///     .with_directory(directory)
///     .with_listen_port(8888)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ChatNodeBuilder {
    config: ChatConfig,
    directory: Option<Arc<Directory>>,
}

impl ChatNodeBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self {
            config: ChatConfig::default(),
            directory: None,
        }
    }

    /// Set the local username; must be registered in the directory
    pub fn with_username<S: Into<String>>(mut self, username: S) -> Self {
        self.config.username = username.into();
        self
    }

    /// Set the directory store used for addresses and friendships
    pub fn with_directory(mut self, directory: Arc<Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set the port for accepting peer connections (0 for ephemeral)
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.config.listen_port = port;
        self
    }

    /// Override the IP address advertised in the directory record
    ///
    /// Without an override the first non-loopback IPv4 interface address is
    /// advertised.
    pub fn with_advertise_ip(mut self, ip: IpAddr) -> Self {
        self.config.advertise_ip = Some(ip);
        self
    }

    /// Set the outbound connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set how long an accepted socket may take to present its handshake
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Validate the configuration and build the node
    pub fn build(self) -> Result<ChatNode> {
        self.config.validate()?;
        let directory = self
            .directory
            .ok_or_else(|| Error::Directory("a directory store is required".into()))?;

        let shared = Arc::new(NodeShared {
            username: self.config.username.clone(),
            registry: PeerRegistry::new(),
            focus: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            events: EventHandlers::new(),
            directory,
            handshake_timeout: self.config.handshake_timeout,
        });

        Ok(ChatNode {
            config: self.config,
            shared,
            state: RwLock::new(NodeState::Created),
            shutdown_tx: Mutex::new(None),
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        })
    }
}

impl Default for ChatNodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One user's chat endpoint
pub struct ChatNode {
    config: ChatConfig,
    shared: Arc<NodeShared>,
    state: RwLock<NodeState>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl ChatNode {
    /// Bind the listener, publish the local address to the directory and
    /// start accepting peer connections
    pub async fn start(&self) -> Result<()> {
        if *self.state.read() == NodeState::Running {
            return Ok(());
        }
        if !self.shared.directory.user_exists(&self.config.username) {
            return Err(Error::Directory(format!(
                "user '{}' is not registered",
                self.config.username
            )));
        }

        let bind: SocketAddr = (Ipv4Addr::UNSPECIFIED, self.config.listen_port).into();
        let listener = PeerListener::bind(bind).await?;
        let bound = listener.local_addr()?;

        let ip = self
            .config
            .advertise_ip
            .or_else(|| local_ipv4().map(IpAddr::V4))
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        self.shared
            .directory
            .update_address(&self.config.username, ip, bound.port())?;

        let (tx, rx) = watch::channel(false);
        let task = spawn_accept_loop(Arc::clone(&self.shared), listener, rx);
        *self.shutdown_tx.lock() = Some(tx);
        *self.accept_task.lock() = Some(task);
        *self.local_addr.lock() = Some(SocketAddr::new(ip, bound.port()));
        *self.state.write() = NodeState::Running;

        self.shared.events.dispatch(Event::StatusChanged {
            text: format!("listening on port {}", bound.port()),
            severity: Severity::Info,
        });
        Ok(())
    }

    /// Make `friend` the focused conversation
    ///
    /// A no-op when already focused on `friend` over a live connection.
    /// Otherwise the current focused connection is torn down first, then a
    /// connection to `friend` is obtained: an existing registry entry (for
    /// example one the listener accepted) is reused, else an outbound
    /// connect is attempted. On failure focus stays cleared. On success any
    /// messages `friend` sent while unfocused are replayed into the
    /// transcript.
    pub async fn focus(&self, friend: &str) -> Result<()> {
        self.ensure_running()?;

        if self.shared.focus.lock().as_deref() == Some(friend) {
            if let Some(conn) = self.shared.registry.get(friend) {
                if !conn.is_closed() {
                    return Ok(());
                }
            }
        }

        self.disconnect().await;

        if !self
            .shared
            .directory
            .are_friends(&self.config.username, friend)
        {
            return Err(Error::PeerUnreachable {
                peer: friend.to_string(),
            });
        }

        let live = self.shared.registry.get(friend).filter(|c| !c.is_closed());
        if live.is_none() {
            self.connect_to(friend).await?;
        }

        *self.shared.focus.lock() = Some(friend.to_string());
        self.shared.events.dispatch(Event::StatusChanged {
            text: format!("chatting with {friend}"),
            severity: Severity::Info,
        });

        let backlog = self.shared.pending.lock().remove(friend);
        if let Some(lines) = backlog {
            for text in lines {
                self.shared.events.dispatch(Event::MessageAppended { text });
            }
        }
        Ok(())
    }

    /// Open, register and serve an outbound connection
    async fn connect_to(&self, friend: &str) -> Result<Arc<PeerConnection>> {
        let unreachable = || Error::PeerUnreachable {
            peer: friend.to_string(),
        };
        let record = self.shared.directory.get(friend).ok_or_else(unreachable)?;
        let address = record.socket_addr().ok_or_else(unreachable)?;

        let (conn, read_half) = PeerConnection::connect(
            friend,
            address,
            &self.config.username,
            self.config.connect_timeout,
        )
        .await?;

        if self.shared.registry.register(&conn) {
            self.shared.events.dispatch(Event::Connected {
                username: friend.to_string(),
            });
            spawn_router(Arc::clone(&self.shared), Arc::clone(&conn), read_half);
            Ok(conn)
        } else {
            // An inbound connection from this friend won the race; keep it.
            conn.close().await;
            self.shared.registry.get(friend).ok_or(Error::ConnectFailed {
                peer: friend.to_string(),
                reason: "connection raced with a disconnect".into(),
            })
        }
    }

    /// Send text to the focused conversation
    ///
    /// The text is trimmed, timestamped and self-attributed, written as one
    /// frame, and echoed into the local transcript. A write failure tears
    /// the connection down the same way a remote close does.
    pub async fn send(&self, text: &str) -> Result<()> {
        self.ensure_running()?;

        let friend = self
            .shared
            .focus
            .lock()
            .clone()
            .ok_or(Error::NoActiveConversation)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::EmptyMessage);
        }
        let conn = self
            .shared
            .registry
            .get(&friend)
            .ok_or(Error::NoActiveConversation)?;

        let line = format!(
            "[{}] {}: {}",
            chrono::Local::now().format("%H:%M:%S"),
            self.config.username,
            trimmed
        );

        if let Err(err) = conn.send_text(&line).await {
            teardown(&self.shared, &conn, DisconnectReason::SendFailed).await;
            return Err(err);
        }

        self.shared
            .events
            .dispatch(Event::MessageAppended { text: line });
        Ok(())
    }

    /// Tear down the focused connection, if any; idempotent
    ///
    /// Background connections other friends opened stay registered.
    pub async fn disconnect(&self) {
        let focused = self.shared.focus.lock().clone();
        if let Some(friend) = focused {
            match self.shared.registry.get(&friend) {
                Some(conn) => {
                    teardown(&self.shared, &conn, DisconnectReason::LocalDisconnect).await
                }
                None => *self.shared.focus.lock() = None,
            }
        }
    }

    /// Stop the accept loop and close every live connection; idempotent
    ///
    /// Safe to call even if the node never started successfully.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if *state == NodeState::Stopped {
                return;
            }
            *state = NodeState::Stopped;
        }

        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(true);
        }
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        *self.shared.focus.lock() = None;
        for conn in self.shared.registry.drain() {
            conn.close().await;
            self.shared.events.dispatch(Event::Disconnected {
                username: conn.peer().to_string(),
                reason: DisconnectReason::Shutdown,
            });
        }
        self.shared.pending.lock().clear();

        self.shared.events.dispatch(Event::StatusChanged {
            text: "stopped".into(),
            severity: Severity::Info,
        });
    }

    /// Register a callback for network events
    pub fn on_event<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(callback)
    }

    /// Remove a previously registered event callback
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.shared.events.unsubscribe(handle);
    }

    /// The local username
    pub fn username(&self) -> &str {
        &self.config.username
    }

    /// The currently focused friend, if any
    pub fn focused(&self) -> Option<String> {
        self.shared.focus.lock().clone()
    }

    /// Usernames of all currently connected peers, focused or not
    pub fn connected_peers(&self) -> Vec<String> {
        self.shared.registry.peer_names()
    }

    /// The advertised address, available once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Current node state
    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    fn ensure_running(&self) -> Result<()> {
        if *self.state.read() != NodeState::Running {
            return Err(Error::NotRunning);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_directory() -> (TempDir, Arc<Directory>) {
        let dir = TempDir::new().unwrap();
        let directory = Arc::new(Directory::open(dir.path()).unwrap());
        directory.register("alice", "secret").unwrap();
        (dir, directory)
    }

    #[test]
    fn test_builder_requires_directory() {
        let result = ChatNodeBuilder::new().with_username("alice").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_requires_valid_username() {
        let (_guard, directory) = test_directory();
        let result = ChatNodeBuilder::new().with_directory(directory).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_built_node_starts_in_created_state() {
        let (_guard, directory) = test_directory();
        let node = ChatNodeBuilder::new()
            .with_username("alice")
            .with_directory(directory)
            .build()
            .unwrap();
        assert_eq!(node.state(), NodeState::Created);
        assert!(node.focused().is_none());
        assert!(node.connected_peers().is_empty());
        assert!(node.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_operations_require_running_node() {
        let (_guard, directory) = test_directory();
        let node = ChatNodeBuilder::new()
            .with_username("alice")
            .with_directory(directory)
            .build()
            .unwrap();

        assert!(matches!(node.focus("bob").await, Err(Error::NotRunning)));
        assert!(matches!(node.send("hi").await, Err(Error::NotRunning)));
    }

    #[tokio::test]
    async fn test_start_rejects_unregistered_user() {
        let (_guard, directory) = test_directory();
        let node = ChatNodeBuilder::new()
            .with_username("mallory")
            .with_directory(directory)
            .build()
            .unwrap();

        assert!(node.start().await.is_err());
        assert_eq!(node.state(), NodeState::Created);
    }

    #[tokio::test]
    async fn test_shutdown_without_start_is_safe() {
        let (_guard, directory) = test_directory();
        let node = ChatNodeBuilder::new()
            .with_username("alice")
            .with_directory(directory)
            .build()
            .unwrap();

        node.shutdown().await;
        node.shutdown().await;
        assert_eq!(node.state(), NodeState::Stopped);
    }
}
