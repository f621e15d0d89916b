//! # World Hooks
//!
//! Extension points the engine calls into for game logic it does not own.
//!
//! - `on_connect` after a login has been accepted and answered
//! - `on_message` once per inbound packet during the tick read phase
//! - `on_tick` once per player during the update phase
//! - `on_disconnect` when the player's connection ends
//!
//! Errors and panics from `on_message` and `on_tick` are contained by the scheduler; they never
//! stop the world pass.

use crate::core::packet::Packet;
use crate::engine::player::Player;
use crate::error::Result;
use crate::protocol::game::{self, Position};
use crate::protocol::opcodes::{client, server};
use crate::store::map_keys::MapKeyStore;
use std::sync::Arc;
use tracing::{debug, trace};

pub trait WorldHooks: Send + Sync {
    fn on_connect(&self, _player: &Player) -> Result<()> {
        Ok(())
    }

    fn on_message(&self, _player: &Player, _opcode: u8, _payload: &mut Packet) -> Result<()> {
        Ok(())
    }

    fn on_tick(&self, _player: &Player) -> Result<()> {
        Ok(())
    }

    fn on_disconnect(&self, _player: &Player) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl WorldHooks for NoopHooks {}

/// Default spawn tile.
pub const SPAWN: Position = Position::new(3162, 3490, 0);

/// Minimal hooks that get a client into the world: the first-load rebuild on the player's
/// first tick and an acknowledgement of the `logout` command.
pub struct BootstrapHooks {
    map_keys: Arc<dyn MapKeyStore>,
    spawn: Position,
}

impl BootstrapHooks {
    pub fn new(map_keys: Arc<dyn MapKeyStore>) -> Self {
        Self {
            map_keys,
            spawn: SPAWN,
        }
    }

    pub fn with_spawn(mut self, spawn: Position) -> Self {
        self.spawn = spawn;
        self
    }
}

impl WorldHooks for BootstrapHooks {
    fn on_connect(&self, player: &Player) -> Result<()> {
        debug!(player_id = player.id(), username = %player.username(), "Player entered world");
        Ok(())
    }

    fn on_message(&self, player: &Player, opcode: u8, payload: &mut Packet) -> Result<()> {
        if opcode == client::CLIENT_CHEAT {
            let command = payload.read_cstr()?;
            if command.trim().eq_ignore_ascii_case("logout") {
                player.queue(vec![server::LOGOUT], true)?;
            }
        } else {
            trace!(player_id = player.id(), opcode, len = payload.len(), "Unhandled packet");
        }
        Ok(())
    }

    fn on_tick(&self, player: &Player) -> Result<()> {
        if !player.mark_loaded() {
            return Ok(());
        }

        if player.is_reconnecting() {
            player.queue(game::encode_reconnect_bootstrap(player.id(), &self.spawn)?, false)
        } else {
            let packet = game::encode_first_load(player.id(), &self.spawn, 0, self.map_keys.as_ref())?;
            player.queue(packet, true)
        }
    }

    fn on_disconnect(&self, player: &Player) {
        debug!(player_id = player.id(), "Player left world");
    }
}
