//! # Game Phase
//!
//! Inbound framing into a player's arena slot, deferred decoding for the tick read phase,
//! outbound serialization with the flush-and-continue rule, and the region rebuild blocks.
//!
//! ## Inbound
//! Each socket read is walked frame by frame. The opcode byte is first restored with the
//! inbound ISAAC word, then its payload length comes from the [`OpcodeTable`]. Accepted frames
//! are copied verbatim (restored opcode, length bytes, payload) into the inbound slot.
//! Two per-tick limits apply:
//!
//! - at most `cap` frames per opcode; later ones are skipped and counted as dropped
//! - the frames must fit the slot; the first frame that does not ends processing of the read
//!
//! ## Outbound
//! Queued packets are serialized into the outbound slot. A write that does not fit the space
//! left flushes the filled slot to the socket mid-write and continues from the start of the
//! slot, so one packet may straddle two socket writes.

use crate::core::packet::{Packet, Variant};
use crate::error::{ProtocolError, Result};
use crate::protocol::opcodes::{server, OpcodeTable, PacketLength};
use crate::store::map_keys::MapKeyStore;
use crate::transport::outbox::Outbox;
use crate::utils::arena::SlotHandle;
use crate::utils::isaac::IsaacRandom;
use bytes::Bytes;
use tracing::{debug, trace};

/// Player indices covered by the player-info bootstrap.
pub const GPI_SLOTS: u16 = 2048;

/// Build area edge lengths, indexed by the client's build area setting.
pub const BUILD_AREA_SIZES: [u16; 4] = [104, 120, 136, 168];

/// One decoded inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    pub opcode: u8,
    pub payload: Packet,
}

/// Outcome of framing one socket read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub queued: usize,
    pub dropped: usize,
    /// A frame did not fit the slot; the rest of the read was discarded.
    pub overflowed: bool,
    /// The read ended inside a frame; the partial frame was discarded.
    pub truncated: bool,
    /// Opcode of the most recent frame that was dropped or did not fit.
    pub last_dropped: Option<u8>,
}

impl FrameReport {
    /// The flood condition hit by this read, if any. Never fatal to the connection.
    pub fn overflow(&self) -> Option<ProtocolError> {
        let opcode = self.last_dropped?;
        let reason = if self.overflowed {
            "inbound slot full"
        } else {
            "per-opcode cap reached"
        };
        Some(ProtocolError::PerTickOverflow { opcode, reason })
    }
}

/// Inbound arena slot plus the per-tick counters guarding it.
#[derive(Debug)]
pub struct InboundState {
    slot: SlotHandle,
    offset: usize,
    counts: [u8; 256],
}

impl InboundState {
    pub fn new(slot: SlotHandle) -> Self {
        Self {
            slot,
            offset: 0,
            counts: [0; 256],
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.slot.capacity() - self.offset
    }

    pub fn count(&self, opcode: u8) -> u8 {
        self.counts[usize::from(opcode)]
    }

    /// Empty the slot and clear the per-opcode counters for the next tick.
    ///
    /// Both are cleared together: frames accepted after the read phase but before this call
    /// are discarded rather than carried into the next tick's budget.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.counts = [0; 256];
    }

    /// Decode every buffered frame. The slot keeps its contents until [`InboundState::reset`].
    pub fn decode_messages(&self, table: &OpcodeTable) -> Result<Vec<ClientMessage>> {
        let mut reader = Packet::from_bytes(self.slot.read_at(0, self.offset)?);

        let mut messages = Vec::new();
        while reader.remaining() > 0 {
            let opcode = reader.read_u8()?;
            let length = match table.length(opcode) {
                PacketLength::Fixed(n) => usize::from(n),
                PacketLength::VarByte => usize::from(reader.read_u8()?),
                PacketLength::VarShort => usize::from(reader.read_u16()?),
            };
            let payload = reader.read_packet(length)?;
            messages.push(ClientMessage { opcode, payload });
        }
        Ok(messages)
    }
}

/// Walk `data` and copy each acceptable frame into `inbound`.
///
/// `data` is modified in place: each opcode byte is replaced by its restored value.
pub fn frame_inbound(
    data: &mut [u8],
    mut cipher: Option<&mut IsaacRandom>,
    table: &OpcodeTable,
    inbound: &mut InboundState,
    cap: u8,
) -> Result<FrameReport> {
    let mut report = FrameReport::default();
    let mut offset = 0;

    while offset < data.len() {
        let start = offset;

        if let Some(cipher) = cipher.as_deref_mut() {
            data[offset] = data[offset].wrapping_sub(cipher.next_u32() as u8);
        }
        let opcode = data[offset];
        offset += 1;

        let length = match table.length(opcode) {
            PacketLength::Fixed(n) => Some(usize::from(n)),
            PacketLength::VarByte => data.get(offset).map(|b| {
                offset += 1;
                usize::from(*b)
            }),
            PacketLength::VarShort => data.get(offset..offset + 2).map(|b| {
                offset += 2;
                usize::from(u16::from_be_bytes([b[0], b[1]]))
            }),
        };

        let end = match length.map(|len| offset + len) {
            Some(end) if end <= data.len() => end,
            _ => {
                debug!(opcode, "Truncated frame, discarding rest of read");
                report.truncated = true;
                break;
            }
        };

        let frame = &data[start..end];
        if frame.len() > inbound.remaining() {
            debug!(opcode, "Packet overflow for this tick");
            report.overflowed = true;
            report.last_dropped = Some(opcode);
            break;
        }

        let count = &mut inbound.counts[usize::from(opcode)];
        if *count >= cap {
            trace!(opcode, "Per-opcode cap reached, dropping frame");
            report.dropped += 1;
            report.last_dropped = Some(opcode);
            offset = end;
            continue;
        }
        *count += 1;

        inbound.slot.write_at(inbound.offset, frame)?;
        inbound.offset += frame.len();
        report.queued += 1;
        offset = end;
    }

    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPacket {
    pub data: Vec<u8>,
    /// Whether the opcode byte is perturbed with the outbound cipher.
    pub encrypt: bool,
}

/// Outbound arena slot, its fill level and the packets waiting for the flush phase.
#[derive(Debug)]
pub struct OutboundState {
    slot: SlotHandle,
    offset: usize,
    queue: Vec<QueuedPacket>,
    cipher: Option<IsaacRandom>,
}

impl OutboundState {
    pub fn new(slot: SlotHandle, cipher: Option<IsaacRandom>) -> Self {
        Self {
            slot,
            offset: 0,
            queue: Vec::new(),
            cipher,
        }
    }

    pub fn queue(&mut self, data: Vec<u8>, encrypt: bool) {
        self.queue.push(QueuedPacket { data, encrypt });
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Bytes sitting in the slot, not yet flushed.
    pub fn buffered(&self) -> usize {
        self.offset
    }

    /// Copy `data` into the slot, flushing whenever the slot fills up.
    pub fn write(&mut self, data: &[u8], outbox: &Outbox) -> Result<()> {
        let mut rest = data;
        while !rest.is_empty() {
            let room = self.slot.capacity() - self.offset;
            if rest.len() > room {
                let (head, tail) = rest.split_at(room);
                self.slot.write_at(self.offset, head)?;
                self.offset += head.len();
                self.flush(outbox)?;
                rest = tail;
            } else {
                self.slot.write_at(self.offset, rest)?;
                self.offset += rest.len();
                rest = &[];
            }
        }
        Ok(())
    }

    /// Send the filled part of the slot as one chunk. Returns whether anything was sent.
    pub fn flush(&mut self, outbox: &Outbox) -> Result<bool> {
        if self.offset == 0 {
            return Ok(false);
        }
        let chunk = Bytes::copy_from_slice(self.slot.read_at(0, self.offset)?);
        self.offset = 0;
        outbox.send(chunk)?;
        Ok(true)
    }

    /// Serialize every queued packet into the slot, returning how many were written.
    pub fn encode_queue(&mut self, outbox: &Outbox) -> Result<usize> {
        let queue = std::mem::take(&mut self.queue);
        let count = queue.len();
        for mut packet in queue {
            if packet.encrypt {
                if let (Some(cipher), Some(first)) = (self.cipher.as_mut(), packet.data.first_mut()) {
                    *first = first.wrapping_add(cipher.next_u32() as u8);
                }
            }
            self.write(&packet.data, outbox)?;
        }
        Ok(count)
    }
}

/// Absolute tile position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: u16,
    pub z: u16,
    pub plane: u8,
}

impl Position {
    pub const fn new(x: u16, z: u16, plane: u8) -> Self {
        Self { x, z, plane }
    }

    pub fn zone_x(&self) -> u16 {
        self.x >> 3
    }

    pub fn zone_z(&self) -> u16 {
        self.z >> 3
    }

    /// Packed 30-bit form used by the player-info bootstrap.
    pub fn high_res(&self) -> u32 {
        u32::from(self.z) | (u32::from(self.x) << 14) | (u32::from(self.plane & 0x3) << 28)
    }
}

/// Write the four key words of every map square the build area around `position` touches.
///
/// Squares without a key get four zero words. Returns the number of squares written.
pub fn encode_region_keys(
    packet: &mut Packet,
    position: &Position,
    build_area_size: u16,
    keys: &dyn MapKeyStore,
) -> usize {
    let half = i32::from(build_area_size >> 4);
    let zone_x = i32::from(position.zone_x());
    let zone_z = i32::from(position.zone_z());

    let mut squares = 0;
    for square_x in (zone_x - half) >> 3..=(zone_x + half) >> 3 {
        for square_z in (zone_z - half) >> 3..=(zone_z + half) >> 3 {
            let key = match (u16::try_from(square_x), u16::try_from(square_z)) {
                (Ok(x), Ok(z)) => keys.lookup(x, z),
                _ => None,
            };
            for word in key.unwrap_or([0; 4]) {
                packet.write_u32(word);
            }
            squares += 1;
        }
    }
    squares
}

fn write_player_bootstrap(packet: &mut Packet, player_id: u16, position: &Position) -> Result<()> {
    packet.enter_bit_mode();
    packet.write_bits(30, position.high_res())?;
    for index in 1..GPI_SLOTS {
        if index != player_id {
            packet.write_bits(18, 0)?;
        }
    }
    packet.exit_bit_mode();
    Ok(())
}

/// First packet after a fresh login: player-info bootstrap plus the initial region rebuild.
pub fn encode_first_load(
    player_id: u16,
    position: &Position,
    build_area: u8,
    keys: &dyn MapKeyStore,
) -> Result<Vec<u8>> {
    let build_area_size = BUILD_AREA_SIZES[usize::from(build_area) % BUILD_AREA_SIZES.len()];

    let mut packet = Packet::with_capacity(8192);
    packet.write_u8(server::REBUILD_FIRST_LOAD);
    packet.write_u16(0);
    let start = packet.len();

    write_player_bootstrap(&mut packet, player_id, position)?;

    packet.write_u16_as(position.zone_x(), Variant::Alt1);
    packet.write_u16(position.zone_z());
    packet.write_u8(build_area);
    packet.write_u8_as(0, Variant::Alt2);
    encode_region_keys(&mut packet, position, build_area_size, keys);

    packet.patch_size_u16(packet.len() - start)?;
    Ok(packet.into_inner())
}

/// Bootstrap sent after a reconnect, without an opcode or a rebuild.
pub fn encode_reconnect_bootstrap(player_id: u16, position: &Position) -> Result<Vec<u8>> {
    let mut packet = Packet::with_capacity(8192);
    packet.write_u16(0);
    let start = packet.len();
    write_player_bootstrap(&mut packet, player_id, position)?;
    packet.patch_size_u16(packet.len() - start)?;
    Ok(packet.into_inner())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::protocol::opcodes::client;
    use crate::store::map_keys::JsonMapKeys;
    use crate::transport::outbox;
    use crate::utils::arena::BufferArena;

    fn inbound(slot_size: usize) -> (BufferArena, InboundState) {
        let arena = BufferArena::new(2, slot_size);
        let slot = arena.acquire(1).unwrap();
        (arena, InboundState::new(slot))
    }

    fn outbound(slot_size: usize, cipher: Option<IsaacRandom>) -> (BufferArena, OutboundState) {
        let arena = BufferArena::new(2, slot_size);
        let slot = arena.acquire(1).unwrap();
        (arena, OutboundState::new(slot, cipher))
    }

    #[test]
    fn frames_fixed_and_variable_packets() {
        let (_arena, mut state) = inbound(128);
        let table = OpcodeTable::default();

        let mut data = vec![client::NO_TIMEOUT, client::CLIENT_CHEAT, 3, b'a', b'b', 0];
        data.extend_from_slice(&[client::EVENT_MOUSE_MOVE, 0, 2, 7, 8]);
        let report = frame_inbound(&mut data, None, &table, &mut state, 10).unwrap();
        assert_eq!(report.queued, 3);
        assert_eq!(state.offset(), data.len());

        let messages = state.decode_messages(&table).unwrap();
        assert_eq!(state.offset(), data.len());
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].opcode, client::NO_TIMEOUT);
        assert!(messages[0].payload.is_empty());
        assert_eq!(messages[1].payload.as_bytes(), b"ab\0");
        assert_eq!(messages[2].payload.as_bytes(), &[7, 8]);

        state.reset();
        assert_eq!(state.offset(), 0);
        assert!(state.decode_messages(&table).unwrap().is_empty());
    }

    #[test]
    fn restores_opcodes_with_inbound_cipher() {
        let (_arena, mut state) = inbound(128);
        let table = OpcodeTable::default();
        let seed = [5, 6, 7, 8];

        let mut client_cipher = IsaacRandom::new(&seed);
        let mut data = Vec::new();
        for _ in 0..3 {
            data.push(client::NO_TIMEOUT.wrapping_add(client_cipher.next_u32() as u8));
        }

        let mut server_cipher = IsaacRandom::new(&seed);
        let report =
            frame_inbound(&mut data, Some(&mut server_cipher), &table, &mut state, 10).unwrap();
        assert_eq!(report.queued, 3);
        assert_eq!(data, vec![client::NO_TIMEOUT; 3]);
        assert_eq!(state.count(client::NO_TIMEOUT), 3);
    }

    #[test]
    fn caps_frames_per_opcode() {
        let (_arena, mut state) = inbound(1024);
        let table = OpcodeTable::default();

        let mut data = vec![client::NO_TIMEOUT; 15];
        let report = frame_inbound(&mut data, None, &table, &mut state, 10).unwrap();
        assert_eq!(report.queued, 10);
        assert_eq!(report.dropped, 5);
        assert_eq!(report.last_dropped, Some(client::NO_TIMEOUT));
        assert_eq!(state.decode_messages(&table).unwrap().len(), 10);

        // Still capped until the counters are reset.
        let mut more = vec![client::NO_TIMEOUT];
        assert_eq!(
            frame_inbound(&mut more, None, &table, &mut state, 10)
                .unwrap()
                .dropped,
            1
        );
        state.reset();
        let mut more = vec![client::NO_TIMEOUT];
        assert_eq!(
            frame_inbound(&mut more, None, &table, &mut state, 10)
                .unwrap()
                .queued,
            1
        );
        assert_eq!(state.decode_messages(&table).unwrap().len(), 1);
    }

    #[test]
    fn overflow_stops_the_read() {
        let (_arena, mut state) = inbound(12);
        let table = OpcodeTable::default();

        // Two 6-byte WINDOW_STATUS payloads need 14 bytes.
        let mut data = vec![client::WINDOW_STATUS, 1, 2, 3, 4, 5, 6];
        data.extend_from_slice(&[client::WINDOW_STATUS, 1, 2, 3, 4, 5, 6]);
        data.push(client::NO_TIMEOUT);

        let report = frame_inbound(&mut data, None, &table, &mut state, 10).unwrap();
        assert_eq!(report.queued, 1);
        assert!(report.overflowed);
        assert_eq!(state.offset(), 7);
        assert!(matches!(
            report.overflow(),
            Some(ProtocolError::PerTickOverflow {
                opcode: client::WINDOW_STATUS,
                ..
            })
        ));
    }

    #[test]
    fn truncated_frame_is_discarded() {
        let (_arena, mut state) = inbound(64);
        let table = OpcodeTable::default();

        let mut data = vec![client::NO_TIMEOUT, client::MOVE_GAMECLICK, 1, 2];
        let report = frame_inbound(&mut data, None, &table, &mut state, 10).unwrap();
        assert_eq!(report.queued, 1);
        assert!(report.truncated);

        let mut data = vec![client::EVENT_MOUSE_MOVE, 0];
        assert!(frame_inbound(&mut data, None, &table, &mut state, 10)
            .unwrap()
            .truncated);
    }

    #[test]
    fn write_flushes_mid_packet() {
        let (_arena, mut state) = outbound(8, None);
        let (outbox, mut rx) = outbox::channel(64);

        state.write(&[1, 2, 3, 4, 5], &outbox).unwrap();
        assert!(rx.try_recv().is_none());

        state.write(&[6, 7, 8, 9, 10], &outbox).unwrap();
        assert_eq!(rx.try_recv().unwrap().as_ref(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(rx.try_recv().is_none());
        assert_eq!(state.buffered(), 2);

        assert!(state.flush(&outbox).unwrap());
        assert_eq!(rx.try_recv().unwrap().as_ref(), &[9, 10]);
        assert!(!state.flush(&outbox).unwrap());
    }

    #[test]
    fn write_larger_than_slot() {
        let (_arena, mut state) = outbound(4, None);
        let (outbox, mut rx) = outbox::channel(64);

        state.write(&[0; 10], &outbox).unwrap();
        assert_eq!(rx.try_recv().unwrap().len(), 4);
        assert_eq!(rx.try_recv().unwrap().len(), 4);
        assert_eq!(state.buffered(), 2);
    }

    #[test]
    fn encode_queue_perturbs_encrypted_opcodes() {
        let seed = [1, 2, 3, 4];
        let (_arena, mut state) = outbound(64, Some(IsaacRandom::new(&seed)));
        let (outbox, mut rx) = outbox::channel(64);

        state.queue(vec![58], true);
        state.queue(vec![0, 1], false);
        assert_eq!(state.encode_queue(&outbox).unwrap(), 2);
        assert_eq!(state.pending(), 0);
        state.flush(&outbox).unwrap();

        let expected = 58u8.wrapping_add(IsaacRandom::new(&seed).next_u32() as u8);
        assert_eq!(rx.try_recv().unwrap().as_ref(), &[expected, 0, 1]);
    }

    #[test]
    fn region_keys_cover_build_area() {
        let position = Position::new(3222, 3222, 0);
        let mut keys = JsonMapKeys::default();
        keys.insert(50, 50, [1, 2, 3, 4]);

        let mut packet = Packet::new();
        let squares = encode_region_keys(&mut packet, &position, 104, &keys);

        // Zone 402 ± 6 spans map squares 49..=51 on both axes.
        assert_eq!(squares, 9);
        assert_eq!(packet.len(), 9 * 16);

        let mut reader = Packet::from_vec(packet.into_inner());
        let mut found = 0;
        for _ in 0..squares {
            let words = [
                reader.read_u32().unwrap(),
                reader.read_u32().unwrap(),
                reader.read_u32().unwrap(),
                reader.read_u32().unwrap(),
            ];
            if words == [1, 2, 3, 4] {
                found += 1;
            } else {
                assert_eq!(words, [0; 4]);
            }
        }
        assert_eq!(found, 1);
    }

    #[test]
    fn first_load_layout() {
        let position = Position::new(3162, 3490, 0);
        let keys = JsonMapKeys::default();
        let data = encode_first_load(1, &position, 0, &keys).unwrap();

        assert_eq!(data[0], server::REBUILD_FIRST_LOAD);
        let size = usize::from(u16::from_be_bytes([data[1], data[2]]));
        assert_eq!(size, data.len() - 3);

        // 30 + 2046 * 18 bits of bootstrap.
        let bootstrap = (30 + 2046 * 18 + 7) / 8;
        let rebuild = &data[3 + bootstrap..];
        assert_eq!(&rebuild[..2], &position.zone_x().to_le_bytes());
        assert_eq!(&rebuild[2..4], &position.zone_z().to_be_bytes());
        assert_eq!(&rebuild[4..6], &[0, 0]);
        assert_eq!((rebuild.len() - 6) % 16, 0);

        let mut reader = Packet::from_bytes(&data[3..]);
        reader.start_bit_read();
        assert_eq!(reader.read_bits(30).unwrap(), position.high_res());
    }

    #[test]
    fn reconnect_bootstrap_has_no_opcode() {
        let data = encode_reconnect_bootstrap(7, &Position::new(3200, 3200, 1)).unwrap();
        let size = usize::from(u16::from_be_bytes([data[0], data[1]]));
        assert_eq!(size, data.len() - 2);
        assert_eq!(size, (30 + 2046 * 18 + 7) / 8);
    }
}
