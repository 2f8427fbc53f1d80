//! Peer connections and message framing
//!
//! Every payload on the wire, the identity handshake included, is a frame:
//! a 4-byte big-endian length prefix followed by that many bytes of UTF-8
//! text. One write is exactly one decoded message, independent of how the OS
//! buffers the stream.

use crate::error::{Error, Result};
use crate::network::{MAX_MESSAGE_SIZE, MAX_USERNAME_LEN};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};

/// Which side initiated a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Accepted by the local listener
    Inbound,
    /// Opened by the local connector
    Outbound,
}

/// A live connection to one friend
///
/// The write half lives here, behind a lock, and is shared by whoever sends.
/// The read half is handed to the connection's router task at creation and
/// is owned by that task alone.
pub struct PeerConnection {
    peer: String,
    direction: Direction,
    peer_addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    closed: AtomicBool,
    close_signal: Notify,
}

impl PeerConnection {
    /// Open an outbound connection to a friend
    ///
    /// Connects under `timeout`, then identifies the local user by sending
    /// `local_username` as the first frame on the stream. Returns the
    /// connection together with its read half for the router task.
    pub async fn connect(
        peer: &str,
        address: SocketAddr,
        local_username: &str,
        timeout: Duration,
    ) -> Result<(Arc<Self>, OwnedReadHalf)> {
        let connect_failed = |reason: String| Error::ConnectFailed {
            peer: peer.to_string(),
            reason,
        };

        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| connect_failed(format!("connect to {address} timed out")))?
            .map_err(|e| connect_failed(e.to_string()))?;
        let peer_addr = stream.peer_addr().map_err(|e| connect_failed(e.to_string()))?;

        let (read_half, mut write_half) = stream.into_split();
        write_frame(&mut write_half, local_username.as_bytes())
            .await
            .map_err(|e| connect_failed(format!("handshake write failed: {e}")))?;

        let conn = Arc::new(Self {
            peer: peer.to_string(),
            direction: Direction::Outbound,
            peer_addr,
            writer: Mutex::new(write_half),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        });
        Ok((conn, read_half))
    }

    /// Wrap a socket the listener accepted and already read a handshake from
    pub fn accepted(
        peer: String,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> (Arc<Self>, OwnedReadHalf) {
        let (read_half, write_half) = stream.into_split();
        let conn = Arc::new(Self {
            peer,
            direction: Direction::Inbound,
            peer_addr,
            writer: Mutex::new(write_half),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        });
        (conn, read_half)
    }

    /// Send one line of chat text as a single frame
    pub async fn send_text(&self, line: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SendFailed("connection is closed".into()));
        }
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, line.as_bytes()).await
    }

    /// Close the connection; idempotent
    ///
    /// The first call flips the closed flag, wakes the router task out of a
    /// blocked read, and shuts the write half down. Later calls are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_signal.notify_one();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    /// Resolves once [`PeerConnection::close`] has been called locally
    pub(crate) async fn closed_locally(&self) {
        if self.is_closed() {
            return;
        }
        self.close_signal.notified().await;
    }

    /// Whether the connection has been closed locally
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Username of the connected friend
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Which side initiated the connection
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Remote socket address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("peer", &self.peer)
            .field("direction", &self.direction)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Write one frame: 4-byte big-endian length prefix, then the payload
pub(crate) async fn write_frame<S>(stream: &mut S, payload: &[u8]) -> Result<()>
where
    S: AsyncWriteExt + Unpin,
{
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(Error::MessageTooLarge {
            size: payload.len(),
        });
    }

    let len = payload.len() as u32;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| Error::SendFailed(e.to_string()))?;
    stream
        .write_all(payload)
        .await
        .map_err(|e| Error::SendFailed(e.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::SendFailed(e.to_string()))?;
    Ok(())
}

/// Read one frame
///
/// EOF at a frame boundary is a clean remote close (`RemoteClosed`); EOF or
/// any I/O error mid-frame is abnormal (`ReadError`). A length prefix above
/// [`MAX_MESSAGE_SIZE`] is rejected before allocating.
pub(crate) async fn read_frame<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncReadExt + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::RemoteClosed
        } else {
            Error::ReadError(e.to_string())
        }
    })?;

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::MessageTooLarge { size: len });
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::ReadError("connection closed mid-frame".into())
        } else {
            Error::ReadError(e.to_string())
        }
    })?;
    Ok(payload)
}

/// Validate a handshake payload as a username
pub(crate) fn parse_username(payload: &[u8]) -> Result<String> {
    let name = std::str::from_utf8(payload)
        .map_err(|_| Error::InvalidHandshake("username is not valid UTF-8".into()))?
        .trim();
    if name.is_empty() {
        return Err(Error::InvalidHandshake("empty username".into()));
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(Error::InvalidHandshake(format!(
            "username exceeds {MAX_USERNAME_LEN} bytes"
        )));
    }
    Ok(name.to_string())
}
