//! # External Stores
//!
//! Read-only collaborators the protocol engine consults but does not own.
//!
//! - [`assets`]: cache groups served to the file-update handshake
//! - [`map_keys`]: per-map-square XTEA keys sent with region rebuilds

pub mod assets;
pub mod map_keys;

pub use assets::{AssetStore, FileAssetStore, MemoryAssetStore};
pub use map_keys::{JsonMapKeys, MapKeyStore};
