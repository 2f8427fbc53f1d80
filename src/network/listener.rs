//! Accept loop and inbound identity handshake
//!
//! The listener binds once at startup and accepts connections for as long as
//! the node runs, regardless of which conversation is focused. Handshake
//! failures close the socket and never surface to the user; accept failures
//! are reported as status and the loop keeps going.

use crate::api::events::{Event, Severity};
use crate::api::node::NodeShared;
use crate::error::{Error, Result};
use crate::network::router::run_router;
use crate::network::{parse_username, read_frame, PeerConnection};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Listening socket for inbound peer connections
pub struct PeerListener {
    inner: TcpListener,
}

impl PeerListener {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        Ok(Self { inner })
    }

    /// The locally bound address; the port matters when 0 was requested
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }
}

/// Spawn the perpetual accept loop
///
/// The loop owns the listening socket, so when the shutdown channel fires
/// and the task returns, the socket closes and no accept stays blocked.
pub(crate) fn spawn_accept_loop(
    shared: Arc<NodeShared>,
    listener: PeerListener,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.inner.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let shared = Arc::clone(&shared);
                        tokio::spawn(handle_inbound(shared, stream, addr));
                    }
                    Err(err) => {
                        tracing::warn!(%err, "accept failed");
                        shared.events.dispatch(Event::StatusChanged {
                            text: format!("accept error: {err}"),
                            severity: Severity::Warning,
                        });
                    }
                }
            }
        }
    })
}

/// Handshake, register and serve one accepted socket
async fn handle_inbound(shared: Arc<NodeShared>, mut stream: TcpStream, addr: SocketAddr) {
    let peer = match handshake(&shared, &mut stream).await {
        Ok(peer) => peer,
        Err(err) => {
            // Socket dropped here; strangers get no error on the wire
            tracing::debug!(%addr, %err, "inbound handshake rejected");
            return;
        }
    };

    let (conn, read_half) = PeerConnection::accepted(peer.clone(), stream, addr);
    if !shared.registry.register(&conn) {
        // This friend already has a live connection. Reject the newest by
        // closing it, so the remote side sees the close and can retry.
        tracing::debug!(peer = %peer, "duplicate inbound connection rejected");
        conn.close().await;
        return;
    }

    shared.events.dispatch(Event::Connected {
        username: peer.clone(),
    });
    shared.events.dispatch(Event::StatusChanged {
        text: format!("{peer} connected"),
        severity: Severity::Info,
    });

    run_router(shared, conn, read_half).await;
}

/// Read the identity frame and verify the claimed username is a friend
async fn handshake(shared: &NodeShared, stream: &mut TcpStream) -> Result<String> {
    let payload = tokio::time::timeout(shared.handshake_timeout, read_frame(stream))
        .await
        .map_err(|_| Error::InvalidHandshake("handshake timed out".into()))??;
    let peer = parse_username(&payload)?;
    if !shared.directory.are_friends(&shared.username, &peer) {
        return Err(Error::HandshakeRejected { peer });
    }
    Ok(peer)
}
