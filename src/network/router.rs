//! Per-connection read loop and the single connection-teardown path
//!
//! One router task per live connection decodes inbound frames and dispatches
//! them as events. Whichever side notices a connection is done (the router
//! hitting EOF, the session controller disconnecting, a failed send) funnels
//! through [`teardown`], and the registry removal decides which caller gets
//! to emit the disconnect notification.

use crate::api::events::{DisconnectReason, Event, Severity};
use crate::api::node::NodeShared;
use crate::error::Error;
use crate::network::{read_frame, PeerConnection, MAX_BACKLOG};
use std::sync::Arc;
use tokio::net::tcp::OwnedReadHalf;
use tokio::task::JoinHandle;

/// Spawn the read-loop task for a registered connection
pub(crate) fn spawn_router(
    shared: Arc<NodeShared>,
    conn: Arc<PeerConnection>,
    read_half: OwnedReadHalf,
) -> JoinHandle<()> {
    tokio::spawn(run_router(shared, conn, read_half))
}

/// Read frames until the connection closes, then tear it down exactly once
pub(crate) async fn run_router(
    shared: Arc<NodeShared>,
    conn: Arc<PeerConnection>,
    mut read_half: OwnedReadHalf,
) {
    let reason = loop {
        tokio::select! {
            _ = conn.closed_locally() => break DisconnectReason::LocalDisconnect,
            frame = read_frame(&mut read_half) => match frame {
                Ok(payload) => deliver(&shared, conn.peer(), payload),
                Err(Error::RemoteClosed) => break DisconnectReason::RemoteClosed,
                Err(err) => {
                    tracing::debug!(peer = conn.peer(), %err, "read loop ended");
                    break DisconnectReason::ReadError;
                }
            }
        }
    };
    teardown(&shared, &conn, reason).await;
}

/// Route one decoded message to the transcript or the unread backlog
fn deliver(shared: &NodeShared, peer: &str, payload: Vec<u8>) {
    let text = match String::from_utf8(payload) {
        Ok(text) => text,
        Err(_) => {
            tracing::warn!(peer, "dropping frame with invalid UTF-8");
            return;
        }
    };

    let focused = shared.focus.lock().as_deref() == Some(peer);
    if focused {
        shared.events.dispatch(Event::MessageAppended { text });
    } else {
        {
            let mut pending = shared.pending.lock();
            let backlog = pending.entry(peer.to_string()).or_default();
            if backlog.len() >= MAX_BACKLOG {
                backlog.pop_front();
            }
            backlog.push_back(text);
        }
        shared.events.dispatch(Event::FriendUnread {
            username: peer.to_string(),
        });
    }
}

/// Deregister and close a connection, notifying the UI at most once
///
/// Safe to race from the router, `disconnect` and a failed `send`: the
/// pointer-compared registry removal succeeds for exactly one caller, and
/// only that caller clears focus and dispatches events. A replaced
/// connection's late teardown leaves its replacement untouched.
pub(crate) async fn teardown(
    shared: &NodeShared,
    conn: &Arc<PeerConnection>,
    reason: DisconnectReason,
) {
    let removed = shared.registry.deregister_if_same(conn).is_some();
    conn.close().await;
    if !removed {
        return;
    }

    let was_focused = {
        let mut focus = shared.focus.lock();
        if focus.as_deref() == Some(conn.peer()) {
            *focus = None;
            true
        } else {
            false
        }
    };

    shared.events.dispatch(Event::Disconnected {
        username: conn.peer().to_string(),
        reason,
    });
    if was_focused {
        shared.events.dispatch(Event::StatusChanged {
            text: format!("{}: {}", conn.peer(), reason),
            severity: Severity::Warning,
        });
    }
}
