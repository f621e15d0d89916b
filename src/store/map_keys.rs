//! Map-square XTEA keys.
//!
//! Keys are distributed as a JSON array of objects carrying at least `mapsquare`
//! (`x << 8 | z`) and a four-element signed `key`.

use crate::error::{ProtocolError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

pub trait MapKeyStore: Send + Sync {
    fn lookup(&self, map_square_x: u16, map_square_z: u16) -> Option<[u32; 4]>;
}

#[derive(Debug, Deserialize)]
struct MapKeyEntry {
    mapsquare: u32,
    key: [i32; 4],
}

fn map_square_id(x: u16, z: u16) -> u32 {
    (u32::from(x) << 8) | u32::from(z)
}

#[derive(Debug, Default, Clone)]
pub struct JsonMapKeys {
    keys: HashMap<u32, [u32; 4]>,
}

impl JsonMapKeys {
    pub fn from_json(content: &str) -> Result<Self> {
        let entries: Vec<MapKeyEntry> = serde_json::from_str(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse map keys: {e}")))?;

        let keys = entries
            .into_iter()
            .map(|entry| (entry.mapsquare, entry.key.map(|word| word as u32)))
            .collect();
        Ok(Self { keys })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ProtocolError::ConfigError(format!(
                "Failed to read map keys {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let keys = Self::from_json(&content)?;
        info!(count = keys.len(), "Loaded map keys");
        Ok(keys)
    }

    pub fn insert(&mut self, x: u16, z: u16, key: [u32; 4]) {
        self.keys.insert(map_square_id(x, z), key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl MapKeyStore for JsonMapKeys {
    fn lookup(&self, map_square_x: u16, map_square_z: u16) -> Option<[u32; 4]> {
        let key = self.keys.get(&map_square_id(map_square_x, map_square_z)).copied();
        if key.is_none() {
            debug!(x = map_square_x, z = map_square_z, "No key for map square");
        }
        key
    }
}
