//! Error types for lanchat

use thiserror::Error;

/// Main error type for lanchat operations
#[derive(Error, Debug)]
pub enum Error {
    /// An inbound peer failed the identity handshake (not a friend).
    /// The socket is closed silently; this variant is logged, never surfaced
    /// to the UI.
    #[error("handshake rejected for '{peer}'")]
    HandshakeRejected {
        /// Username the remote side claimed
        peer: String,
    },

    /// No address is on record for the target, or the target is not a friend
    #[error("peer '{peer}' is unreachable: no known address")]
    PeerUnreachable {
        /// Target username
        peer: String,
    },

    /// Network-level connect error (refused, timed out, unreachable host)
    #[error("failed to connect to '{peer}': {reason}")]
    ConnectFailed {
        /// Target username
        peer: String,
        /// Underlying cause
        reason: String,
    },

    /// Write error on an established connection
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The remote side closed the connection cleanly (zero-byte read)
    #[error("remote closed the connection")]
    RemoteClosed,

    /// Abnormal socket error during read
    #[error("read error: {0}")]
    ReadError(String),

    /// `send` was called with no focused conversation
    #[error("no active conversation")]
    NoActiveConversation,

    /// `send` was called with text that is blank after trimming
    #[error("message is empty")]
    EmptyMessage,

    /// A frame exceeded the maximum message size
    #[error("message too large: {size} bytes")]
    MessageTooLarge {
        /// Declared frame length
        size: usize,
    },

    /// Malformed handshake payload (bad UTF-8, empty or oversized username)
    #[error("invalid handshake: {0}")]
    InvalidHandshake(String),

    /// The node is not running (not started, or already shut down)
    #[error("node is not running")]
    NotRunning,

    /// Directory record store errors
    #[error("directory error: {0}")]
    Directory(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
