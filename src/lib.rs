//! # Lanchat
//!
//! Peer-to-peer LAN chat: registered users discover each other through a
//! lightweight on-disk directory and exchange direct UTF-8 text messages
//! over one TCP connection per conversation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use lanchat::{ChatNodeBuilder, Directory, Event};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = Arc::new(Directory::open("./lanchat-data")?);
//!
//!     let node = ChatNodeBuilder::new()
//!         .with_username("alice")
//!         .with_directory(directory)
//!         .build()?;
//!
//!     node.on_event(|event| {
//!         if let Event::MessageAppended { text } = event {
//!             println!("{text}");
//!         }
//!     });
//!
//!     node.start().await?;
//!     node.focus("bob").await?;
//!     node.send("hello").await?;
//!     node.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod api;
pub mod directory;
pub mod error;
pub mod network;

// Re-export main types
pub use api::{
    ChatConfig, ChatNode, ChatNodeBuilder, DisconnectReason, Event, EventHandlers, NodeState,
    Severity, SubscriptionHandle,
};
pub use directory::{Directory, UserRecord};
pub use error::{Error, Result};
pub use network::{Direction, PeerConnection, PeerListener, PeerRegistry};
