//! # Error Types
//!
//! Error handling for the wire protocol engine.
//!
//! Every fallible operation in the crate returns [`Result<T>`], whose error side is
//! [`ProtocolError`]. The variants map onto the failure classes of the protocol:
//!
//! ## Error Categories
//! - **Codec errors**: `OutOfData` when a read runs past the buffer, `BadEncoding` for
//!   malformed variable-length values, bad string markers or out-of-range RSA blocks
//! - **Session errors**: `UnknownOpcode` while negotiating, `PerTickOverflow` for flood drops
//! - **Lifecycle errors**: `RegistryFull`, `ServerClosed`, `Timeout`
//! - **I/O errors**: socket and filesystem failures
//!
//! Whether an error ends a connection depends on the phase it occurred in, see
//! [`ProtocolError::is_connection_fatal`].
//!
//! ## Example Usage
//! ```rust
//! use rt5_protocol::core::packet::Packet;
//! use rt5_protocol::error::ProtocolError;
//!
//! let mut packet = Packet::from_bytes(&[0x01]);
//! match packet.read_u16() {
//!     Err(ProtocolError::OutOfData { needed, remaining }) => {
//!         assert_eq!((needed, remaining), (2, 1));
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use crate::protocol::session::Phase;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Codec errors
    pub const ERR_SMART_RANGE: &str = "Value out of range for smart encoding";
    pub const ERR_STRING_VERSION: &str = "Versioned string marker must be zero";
    pub const ERR_STRING_NUL: &str = "String contains a NUL character";
    pub const ERR_SIZE_PATCH: &str = "Size patch position precedes start of buffer";
    pub const ERR_SIZE_RANGE: &str = "Length does not fit the size field";
    pub const ERR_BIT_COUNT: &str = "Bit count must be between 1 and 32";
    pub const ERR_VARINT: &str = "Variable-length integer is too long";

    /// Cryptographic errors
    pub const ERR_RSA_RANGE: &str = "RSA block is not smaller than the modulus";
    pub const ERR_RSA_MAGIC: &str = "RSA block has an unexpected magic byte";
    pub const ERR_RSA_KEY: &str = "Invalid RSA key material";

    /// Synchronization errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
    pub const ERR_SLOT_UNAVAILABLE: &str = "Arena slot is already owned";
    pub const ERR_SLOT_INDEX: &str = "Arena slot index out of range";
}

/// The primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Out of data: needed {needed} bytes, {remaining} remaining")]
    OutOfData { needed: usize, remaining: usize },

    #[error("Bad encoding: {0}")]
    BadEncoding(String),

    #[error("Unknown opcode: {0}")]
    UnknownOpcode(u8),

    #[error("Per-tick overflow for opcode {opcode}: {reason}")]
    PerTickOverflow { opcode: u8, reason: &'static str },

    #[error("Asset not found: archive {archive}, group {group}")]
    AssetNotFound { archive: u8, group: u16 },

    #[error("World registry is full")]
    RegistryFull,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Outbound queue full")]
    OutboxFull,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Server closed")]
    ServerClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Build a `BadEncoding` from a static message.
    pub fn bad_encoding(message: &str) -> Self {
        ProtocolError::BadEncoding(message.to_string())
    }

    /// Whether this error must close the connection when raised in `phase`.
    ///
    /// Running out of data while negotiating is fatal, but in the game phase it only
    /// costs the packet being decoded. Flood drops never close a connection.
    pub fn is_connection_fatal(&self, phase: Phase) -> bool {
        match self {
            ProtocolError::OutOfData { .. } => phase != Phase::Game,
            ProtocolError::PerTickOverflow { .. } => false,
            _ => true,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_data_only_fatal_outside_game() {
        let err = ProtocolError::OutOfData {
            needed: 4,
            remaining: 1,
        };
        assert!(err.is_connection_fatal(Phase::New));
        assert!(err.is_connection_fatal(Phase::Login));
        assert!(err.is_connection_fatal(Phase::Js5));
        assert!(!err.is_connection_fatal(Phase::Game));
    }

    #[test]
    fn overflow_is_never_fatal() {
        let err = ProtocolError::PerTickOverflow {
            opcode: 3,
            reason: "cap",
        };
        assert!(!err.is_connection_fatal(Phase::Game));
        assert!(ProtocolError::UnknownOpcode(99).is_connection_fatal(Phase::New));
    }

    #[test]
    fn full_outbox_is_fatal_in_game() {
        assert!(ProtocolError::OutboxFull.is_connection_fatal(Phase::Game));
    }
}
