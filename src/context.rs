//! # Server Context
//!
//! Everything a connection task or the tick scheduler needs, built once at startup and shared
//! behind an `Arc`. Nothing here is global: the server, every session and the scheduler receive
//! the same context explicitly.

use crate::config::ServerSettings;
use crate::engine::hooks::WorldHooks;
use crate::engine::registry::WorldRegistry;
use crate::error::Result;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::handshake;
use crate::protocol::opcodes::OpcodeTable;
use crate::protocol::worldlist::WorldList;
use crate::store::assets::AssetStore;
use crate::store::map_keys::MapKeyStore;
use crate::utils::metrics::Metrics;
use crate::utils::rsa::RsaKeyPair;
use std::sync::Arc;
use tracing::debug;

pub struct ServerContext {
    pub settings: ServerSettings,
    pub registry: WorldRegistry,
    pub world_list: WorldList,
    pub rsa_key: RsaKeyPair,
    pub opcodes: OpcodeTable,
    pub dispatcher: Dispatcher,
    pub assets: Arc<dyn AssetStore>,
    pub map_keys: Arc<dyn MapKeyStore>,
    pub hooks: Arc<dyn WorldHooks>,
    pub metrics: Metrics,
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl ServerContext {
    /// Validate `settings`, allocate the arenas and load the login key.
    pub fn new(
        settings: ServerSettings,
        assets: Arc<dyn AssetStore>,
        map_keys: Arc<dyn MapKeyStore>,
        hooks: Arc<dyn WorldHooks>,
    ) -> Result<Self> {
        settings.validate_strict()?;

        let rsa_key = settings.protocol.rsa_key()?;
        let dispatcher = Dispatcher::new();
        handshake::register_handlers(&dispatcher)?;

        let registry = WorldRegistry::new(settings.world.max_players, settings.world.slot_size);
        let world_list = WorldList::builtin()?;
        debug!(
            max_players = settings.world.max_players,
            slot_size = settings.world.slot_size,
            world_list_checksum = world_list.checksum(),
            "Server context ready"
        );

        Ok(Self {
            settings,
            registry,
            world_list,
            rsa_key,
            opcodes: OpcodeTable::default(),
            dispatcher,
            assets,
            map_keys,
            hooks,
            metrics: Metrics::new(),
        })
    }

    pub fn with_world_list(mut self, world_list: WorldList) -> Self {
        self.world_list = world_list;
        self
    }

    pub fn with_rsa_key(mut self, rsa_key: RsaKeyPair) -> Self {
        self.rsa_key = rsa_key;
        self
    }

    pub fn with_opcodes(mut self, opcodes: OpcodeTable) -> Self {
        self.opcodes = opcodes;
        self
    }
}
