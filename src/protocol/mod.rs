//! # Protocol Layer
//!
//! Everything between raw socket bytes and the world engine.
//!
//! ## Components
//! - **Opcodes**: handshake constants, login response codes, the client packet length table
//! - **Session**: per-connection phase machine
//! - **Dispatcher** / **Handshake**: opcode-keyed handlers for the negotiation phase
//! - **JS5**: update-server file requests and chunked responses
//! - **World list**: country and world tables with their checksum
//! - **Login**: login and account-creation frames
//! - **Game**: in-game framing, flood caps, outbound serialization, map rebuild packets

pub mod dispatcher;
pub mod game;
pub mod handshake;
pub mod js5;
pub mod login;
pub mod opcodes;
pub mod session;
pub mod worldlist;

pub use dispatcher::Dispatcher;
pub use session::{Phase, Session};

#[cfg(test)]
mod tests;
