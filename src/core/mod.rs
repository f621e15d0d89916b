//! # Core Codec
//!
//! The binary codec every other layer is built on.
//!
//! - [`packet`]: byte-mode reads and writes, integer variants, smart integers, strings,
//!   size patching, CRC32 and the cipher entry points
//! - [`bits`]: bit-addressed reads and writes over the same storage

pub mod bits;
pub mod packet;

pub use packet::{Packet, Variant};
