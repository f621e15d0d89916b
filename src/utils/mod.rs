//! # Utility Modules
//!
//! Supporting pieces used throughout the protocol engine.
//!
//! ## Components
//! - **Arena**: pre-allocated per-player byte slots
//! - **Ciphers**: ISAAC opcode perturbation, XTEA blocks, raw RSA login blocks
//! - **Base37**: player name packing
//! - **Logging**: `tracing-subscriber` setup
//! - **Metrics**: atomic counters
//! - **Timeout**: async deadline helpers

pub mod arena;
pub mod base37;
pub mod isaac;
pub mod logging;
pub mod metrics;
pub mod rsa;
pub mod timeout;
pub mod xtea;

pub use arena::{BufferArena, SlotHandle};
pub use isaac::IsaacRandom;
pub use rsa::RsaKeyPair;
