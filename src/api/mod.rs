//! Public API for lanchat
//!
//! The main entry point is [`ChatNode`], built via [`ChatNodeBuilder`].
//! Network activity reaches the embedding application through [`Event`]
//! callbacks registered with [`ChatNode::on_event`].

pub mod config;
pub mod events;
pub mod node;

pub use config::ChatConfig;
pub use events::{
    DisconnectReason, Event, EventCallback, EventHandlers, Severity, SubscriptionHandle,
};
pub use node::{ChatNode, ChatNodeBuilder, NodeState};
