//! # Transport Layer
//!
//! Socket handling for the game server.
//!
//! ## Components
//! - **Outbox**: ordered per-connection channel every outbound byte passes through
//! - **TCP**: listener, per-connection tasks and the close/shutdown lifecycle

pub mod outbox;
pub mod tcp;

pub use outbox::{Outbox, OutboxReceiver};
pub use tcp::Server;
