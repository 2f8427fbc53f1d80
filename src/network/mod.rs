//! Network module
//!
//! TCP peer connections with length-prefixed message framing, the accept
//! loop, the per-connection read loop, and the live-connection registry.

mod connection;
mod listener;
mod registry;
mod router;

pub use connection::{Direction, PeerConnection};
pub use listener::PeerListener;
pub use registry::PeerRegistry;

pub(crate) use connection::{parse_username, read_frame, write_frame};
pub(crate) use listener::spawn_accept_loop;
pub(crate) use router::{spawn_router, teardown};

use std::net::Ipv4Addr;

/// Default TCP port for accepting peer connections
pub const DEFAULT_PORT: u16 = 8888;

/// Maximum frame size in bytes (64 KiB)
/// Bounds per-message allocation against a hostile length prefix
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Maximum accepted username length in bytes
pub const MAX_USERNAME_LEN: usize = 64;

/// Per-friend cap on buffered messages awaiting focus
pub(crate) const MAX_BACKLOG: usize = 128;

/// First non-loopback, non-link-local IPv4 interface address, if any
pub(crate) fn local_ipv4() -> Option<Ipv4Addr> {
    let interfaces = get_if_addrs::get_if_addrs().ok()?;
    interfaces.into_iter().find_map(|iface| match iface.addr {
        get_if_addrs::IfAddr::V4(v4)
            if !v4.ip.is_loopback() && !v4.ip.is_link_local() && !v4.ip.is_broadcast() =>
        {
            Some(v4.ip)
        }
        _ => None,
    })
}
