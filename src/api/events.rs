//! Event system for delivering network activity to the presentation layer
//!
//! Router and listener tasks never touch UI state directly; they dispatch
//! immutable [`Event`] values to the callbacks registered here, and the
//! subscriber decides how to render them.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Severity of a status line shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine status (server started, peer connected)
    Info,
    /// Something degraded but recoverable
    Warning,
    /// An operation failed
    Error,
}

/// Why a peer connection went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The remote side closed the connection cleanly
    RemoteClosed,
    /// The read loop hit a socket error
    ReadError,
    /// A write to the peer failed
    SendFailed,
    /// The local user disconnected or switched conversations
    LocalDisconnect,
    /// The node is shutting down
    Shutdown,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::RemoteClosed => "remote closed",
            Self::ReadError => "read error",
            Self::SendFailed => "send failed",
            Self::LocalDisconnect => "disconnected",
            Self::Shutdown => "shutting down",
        };
        f.write_str(text)
    }
}

/// Events delivered to the UI collaborator
#[derive(Debug, Clone)]
pub enum Event {
    /// The node's status line changed
    StatusChanged {
        /// Human-readable status text
        text: String,
        /// How prominently to render it
        severity: Severity,
    },

    /// A line belongs in the visible transcript (inbound from the focused
    /// friend, or a local echo of an outbound message)
    MessageAppended {
        /// The formatted transcript line
        text: String,
    },

    /// A non-focused friend has an unread message; mark them in the roster
    FriendUnread {
        /// The friend with pending messages
        username: String,
    },

    /// A peer connection was established and registered
    Connected {
        /// The connected friend
        username: String,
    },

    /// A peer connection was torn down
    Disconnected {
        /// The friend that went away
        username: String,
        /// Why the connection closed
        reason: DisconnectReason,
    },
}

/// Handle for unsubscribing an event callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// Type alias for event handler callbacks
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync + 'static>;

/// Manages event subscriptions and dispatch
///
/// Cheaply cloneable; clones share the same subscriber list. Dispatch is
/// synchronous and happens on the task that produced the event.
pub struct EventHandlers {
    handlers: Arc<RwLock<Vec<(SubscriptionHandle, EventCallback)>>>,
    next_id: Arc<AtomicU64>,
}

impl EventHandlers {
    /// Create an empty handler registry
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a callback for all future events
    ///
    /// Returns a handle that can be passed to [`EventHandlers::unsubscribe`].
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((handle, Arc::new(callback)));
        handle
    }

    /// Remove a previously registered callback; unknown handles are a no-op
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.handlers.write().retain(|(h, _)| *h != handle);
    }

    /// Deliver an event to every registered callback
    ///
    /// A panicking callback is caught and logged so the remaining callbacks
    /// still run; a connection task must not die because the UI misbehaved.
    pub fn dispatch(&self, event: Event) {
        let handlers = self.handlers.read();
        for (handle, callback) in handlers.iter() {
            let event = event.clone();
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!("event handler {:?} panicked", handle);
            }
        }
    }

    /// Number of registered callbacks
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for EventHandlers {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventHandlers {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}
