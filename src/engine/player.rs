//! Authenticated player state shared between its connection task and the tick scheduler.

use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::game::{ClientMessage, FrameReport, InboundState, OutboundState};
use crate::protocol::opcodes::OpcodeTable;
use crate::transport::outbox::Outbox;
use crate::utils::arena::SlotHandle;
use crate::utils::isaac::IsaacRandom;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Arena slots handed to a newly registered player.
#[derive(Debug)]
pub struct PlayerSlots {
    pub id: u16,
    pub inbound: SlotHandle,
    pub outbound: SlotHandle,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerDetails {
    pub username: String,
    pub window_mode: u8,
    pub reconnecting: bool,
    pub peer: Option<SocketAddr>,
}

pub struct Player {
    id: u16,
    details: PlayerDetails,
    inbound: Mutex<InboundState>,
    outbound: Mutex<OutboundState>,
    outbox: Outbox,
    active: AtomicBool,
    loaded: AtomicBool,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("username", &self.details.username)
            .field("active", &self.is_active())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))
}

impl Player {
    pub fn new(
        slots: PlayerSlots,
        details: PlayerDetails,
        cipher_out: Option<IsaacRandom>,
        outbox: Outbox,
    ) -> Self {
        Self {
            id: slots.id,
            details,
            inbound: Mutex::new(InboundState::new(slots.inbound)),
            outbound: Mutex::new(OutboundState::new(slots.outbound, cipher_out)),
            outbox,
            active: AtomicBool::new(true),
            loaded: AtomicBool::new(false),
        }
    }

    /// Player index, also the arena slot number.
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.details.username
    }

    pub fn window_mode(&self) -> u8 {
        self.details.window_mode
    }

    pub fn is_reconnecting(&self) -> bool {
        self.details.reconnecting
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.details.peer
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// `true` exactly once, the first time it is called.
    pub fn mark_loaded(&self) -> bool {
        !self.loaded.swap(true, Ordering::AcqRel)
    }

    /// Queue raw packet bytes for the next flush phase.
    pub fn queue(&self, data: Vec<u8>, encrypt: bool) -> Result<()> {
        lock(&self.outbound)?.queue(data, encrypt);
        Ok(())
    }

    pub fn queue_packet(&self, packet: Packet, encrypt: bool) -> Result<()> {
        self.queue(packet.into_inner(), encrypt)
    }

    pub fn pending_outbound(&self) -> Result<usize> {
        Ok(lock(&self.outbound)?.pending())
    }

    pub fn frame_inbound(
        &self,
        data: &mut [u8],
        cipher: Option<&mut IsaacRandom>,
        table: &OpcodeTable,
        cap: u8,
    ) -> Result<FrameReport> {
        let mut inbound = lock(&self.inbound)?;
        crate::protocol::game::frame_inbound(data, cipher, table, &mut inbound, cap)
    }

    pub fn decode_messages(&self, table: &OpcodeTable) -> Result<Vec<ClientMessage>> {
        lock(&self.inbound)?.decode_messages(table)
    }

    /// Serialize queued packets and flush the slot, returning how many packets were written.
    pub fn flush_outbound(&self) -> Result<usize> {
        let mut outbound = lock(&self.outbound)?;
        let written = if outbound.pending() > 0 {
            outbound.encode_queue(&self.outbox)?
        } else {
            0
        };
        outbound.flush(&self.outbox)?;
        Ok(written)
    }

    /// Empty the inbound slot and start a new tick's budget.
    pub fn reset_inbound(&self) -> Result<()> {
        lock(&self.inbound)?.reset();
        Ok(())
    }

    pub fn inbound_count(&self, opcode: u8) -> Result<u8> {
        Ok(lock(&self.inbound)?.count(opcode))
    }
}
