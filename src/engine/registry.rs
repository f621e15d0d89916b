//! # World Registry
//!
//! Flat table of active players indexed by `player id - 1`, together with the inbound and
//! outbound arenas whose slots those ids name.
//!
//! Every mutation takes the table lock only for the lookup or update itself. The tick scheduler
//! copies the occupied entries out with [`WorldRegistry::snapshot`] and iterates the copy, so a
//! tick never holds the lock.
//!
//! A player's arena slots go back to their arenas when the last `Arc<Player>` is dropped, which
//! may be after [`WorldRegistry::remove`] if a tick snapshot still holds it. Registration skips
//! any index whose slots have not come back yet.

use crate::engine::player::{Player, PlayerSlots};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::arena::BufferArena;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub struct WorldRegistry {
    players: Mutex<Vec<Option<Arc<Player>>>>,
    inbound: BufferArena,
    outbound: BufferArena,
}

impl std::fmt::Debug for WorldRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldRegistry")
            .field("capacity", &self.capacity())
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .finish()
    }
}

impl WorldRegistry {
    /// Allocate both arenas up front: `max_players` slots of `slot_size` bytes each.
    pub fn new(max_players: usize, slot_size: usize) -> Self {
        Self {
            players: Mutex::new(vec![None; max_players]),
            inbound: BufferArena::new(max_players, slot_size),
            outbound: BufferArena::new(max_players, slot_size),
        }
    }

    fn table(&self) -> Result<MutexGuard<'_, Vec<Option<Arc<Player>>>>> {
        self.players
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))
    }

    pub fn capacity(&self) -> usize {
        self.inbound.max_slots()
    }

    pub fn slot_size(&self) -> usize {
        self.inbound.slot_size()
    }

    /// Claim the lowest free index and its slots, then build the player with `build`.
    ///
    /// `build` runs under the table lock, so anything it does happens before a tick can see the
    /// player. If it fails the slots go straight back to the arenas.
    pub fn register<F>(&self, build: F) -> Result<Arc<Player>>
    where
        F: FnOnce(PlayerSlots) -> Result<Player>,
    {
        let mut table = self.table()?;

        let index = table
            .iter()
            .enumerate()
            .position(|(index, entry)| {
                entry.is_none() && self.inbound.is_free(index + 1) && self.outbound.is_free(index + 1)
            })
            .ok_or(ProtocolError::RegistryFull)?;

        let id = u16::try_from(index + 1)
            .map_err(|_| ProtocolError::Custom(constants::ERR_SLOT_INDEX.to_string()))?;
        let slots = PlayerSlots {
            id,
            inbound: self.inbound.acquire(index + 1)?,
            outbound: self.outbound.acquire(index + 1)?,
        };

        let player = Arc::new(build(slots)?);
        table[index] = Some(Arc::clone(&player));
        debug!(player_id = id, "Registered player");
        Ok(player)
    }

    /// Remove a player from the table and mark it inactive.
    pub fn remove(&self, id: u16) -> Result<Option<Arc<Player>>> {
        let mut table = self.table()?;
        let removed = usize::from(id)
            .checked_sub(1)
            .and_then(|index| table.get_mut(index))
            .and_then(Option::take);

        if let Some(player) = &removed {
            player.deactivate();
            debug!(player_id = id, "Removed player");
        }
        Ok(removed)
    }

    pub fn get(&self, id: u16) -> Result<Option<Arc<Player>>> {
        let table = self.table()?;
        Ok(usize::from(id)
            .checked_sub(1)
            .and_then(|index| table.get(index))
            .and_then(Clone::clone))
    }

    /// Copy of every occupied entry, in index order.
    pub fn snapshot(&self) -> Result<Vec<Arc<Player>>> {
        Ok(self.table()?.iter().flatten().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.table()?.iter().filter(|entry| entry.is_some()).count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::engine::player::PlayerDetails;
    use crate::transport::outbox;

    fn build(slots: PlayerSlots) -> Result<Player> {
        let (outbox, _rx) = outbox::channel(64);
        Ok(Player::new(slots, PlayerDetails::default(), None, outbox))
    }

    #[test]
    fn assigns_lowest_free_index() {
        let registry = WorldRegistry::new(3, 64);
        let a = registry.register(build).unwrap();
        let b = registry.register(build).unwrap();
        assert_eq!((a.id(), b.id()), (1, 2));

        registry.remove(1).unwrap();
        drop(a);
        let c = registry.register(build).unwrap();
        assert_eq!(c.id(), 1);
        assert_eq!(registry.len().unwrap(), 2);
    }

    #[test]
    fn full_registry() {
        let registry = WorldRegistry::new(1, 64);
        let _a = registry.register(build).unwrap();
        assert!(matches!(
            registry.register(build),
            Err(ProtocolError::RegistryFull)
        ));
    }

    #[test]
    fn held_slots_are_not_reused() {
        let registry = WorldRegistry::new(2, 64);
        let a = registry.register(build).unwrap();
        let removed = registry.remove(a.id()).unwrap().unwrap();
        assert!(!removed.is_active());

        // `a` still owns slot 1, so the next player gets slot 2.
        let b = registry.register(build).unwrap();
        assert_eq!(b.id(), 2);
    }

    #[test]
    fn failed_build_returns_slots() {
        let registry = WorldRegistry::new(1, 64);
        let failed = registry.register(|_| Err(ProtocolError::ConnectionClosed));
        assert!(matches!(failed, Err(ProtocolError::ConnectionClosed)));

        let a = registry.register(build).unwrap();
        assert_eq!(a.id(), 1);
    }

    #[test]
    fn snapshot_skips_empty_entries() {
        let registry = WorldRegistry::new(4, 64);
        let _a = registry.register(build).unwrap();
        let b = registry.register(build).unwrap();
        let _c = registry.register(build).unwrap();
        registry.remove(b.id()).unwrap();

        let ids: Vec<u16> = registry.snapshot().unwrap().iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(registry.get(2).unwrap().is_none());
        assert!(registry.get(0).unwrap().is_none());
        assert!(registry.remove(99).unwrap().is_none());
    }
}
