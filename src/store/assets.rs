//! Cache group lookup for the file server.
//!
//! Groups live on disk as `<root>/<archive>/<group>.dat`. The checksum table is the special
//! group `(255, 255)` and is stored the same way.

use crate::error::{constants, ProtocolError, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

pub trait AssetStore: Send + Sync {
    /// Fetch the raw bytes of a group, or [`ProtocolError::AssetNotFound`].
    fn get(&self, archive: u8, group: u16) -> Result<Bytes>;
}

/// Filesystem-backed store that keeps every group it has read.
#[derive(Debug)]
pub struct FileAssetStore {
    root: PathBuf,
    cache: RwLock<HashMap<(u8, u16), Bytes>>,
}

impl FileAssetStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn group_path(&self, archive: u8, group: u16) -> PathBuf {
        self.root
            .join(archive.to_string())
            .join(format!("{group}.dat"))
    }
}

impl AssetStore for FileAssetStore {
    fn get(&self, archive: u8, group: u16) -> Result<Bytes> {
        if let Ok(cache) = self.cache.read() {
            if let Some(bytes) = cache.get(&(archive, group)) {
                return Ok(bytes.clone());
            }
        }

        let path = self.group_path(archive, group);
        let bytes = match std::fs::read(&path) {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Asset group missing");
                return Err(ProtocolError::AssetNotFound { archive, group });
            }
            Err(e) => return Err(ProtocolError::Io(e)),
        };

        let mut cache = self
            .cache
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))?;
        cache.insert((archive, group), bytes.clone());
        Ok(bytes)
    }
}

/// In-memory store, for tests and embedded caches.
#[derive(Debug, Default, Clone)]
pub struct MemoryAssetStore {
    groups: HashMap<(u8, u16), Bytes>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, archive: u8, group: u16, data: impl Into<Bytes>) {
        self.groups.insert((archive, group), data.into());
    }

    pub fn with_group(mut self, archive: u8, group: u16, data: impl Into<Bytes>) -> Self {
        self.insert(archive, group, data);
        self
    }
}

impl AssetStore for MemoryAssetStore {
    fn get(&self, archive: u8, group: u16) -> Result<Bytes> {
        self.groups
            .get(&(archive, group))
            .cloned()
            .ok_or(ProtocolError::AssetNotFound { archive, group })
    }
}
