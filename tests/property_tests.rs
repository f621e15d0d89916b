//! Property-based tests using proptest
//!
//! Codec and framing invariants checked over randomly generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use rt5_protocol::core::packet::{Packet, Variant, SMART_MAX};
use rt5_protocol::protocol::game::{self, InboundState};
use rt5_protocol::protocol::opcodes::OpcodeTable;
use rt5_protocol::utils::arena::BufferArena;
use rt5_protocol::utils::isaac::IsaacRandom;
use rt5_protocol::utils::xtea;

fn variant() -> impl Strategy<Value = Variant> {
    prop::sample::select(Variant::ALL.to_vec())
}

// Property: every integer width reads back what was written, in every byte order
proptest! {
    #[test]
    fn prop_integers_round_trip(a in any::<u16>(), b in any::<u32>(), c in 0u32..0x0100_0000, d in any::<u64>(), v in variant()) {
        let mut p = Packet::new();
        p.write_u16_as(a, v);
        p.write_u32_as(b, v);
        p.write_u24_as(c, v);
        p.write_u64_as(d, v);

        prop_assert_eq!(p.read_u16_as(v).unwrap(), a);
        prop_assert_eq!(p.read_u32_as(v).unwrap(), b);
        prop_assert_eq!(p.read_u24_as(v).unwrap(), c);
        prop_assert_eq!(p.read_u64_as(v).unwrap(), d);
        prop_assert_eq!(p.remaining(), 0);
    }
}

// Property: smart encoding is one byte below 128, two bytes from 128 up, and always reversible
proptest! {
    #[test]
    fn prop_smart_round_trip(value in 0u16..=SMART_MAX) {
        let mut p = Packet::new();
        p.write_smart(value).unwrap();
        prop_assert_eq!(p.len(), if value < 128 { 1 } else { 2 });
        prop_assert_eq!(p.read_smart().unwrap(), value);
    }
}

// Property: bit fields read back at any alignment
proptest! {
    #[test]
    fn prop_bits_round_trip(prefix in 0usize..4, fields in prop::collection::vec((1u32..=32, any::<u32>()), 1..20)) {
        let mut p = Packet::from_vec(vec![0xAA; prefix]);
        p.enter_bit_mode();
        for (n, value) in &fields {
            p.write_bits(*n, *value).unwrap();
        }
        p.exit_bit_mode();

        p.set_position(prefix);
        p.start_bit_read();
        for (n, value) in &fields {
            let mask = if *n == 32 { u32::MAX } else { (1u32 << n) - 1 };
            prop_assert_eq!(p.read_bits(*n).unwrap(), value & mask);
        }
    }
}

// Property: XTEA decrypt inverts encrypt for any key and whole-block payload
proptest! {
    #[test]
    fn prop_xtea_round_trip(key in any::<[u32; 4]>(), blocks in prop::collection::vec(any::<[u8; 8]>(), 1..8)) {
        let plain: Vec<u8> = blocks.concat();
        let mut data = plain.clone();
        xtea::encrypt(&mut data, &key);
        xtea::decrypt(&mut data, &key);
        prop_assert_eq!(data, plain);
    }
}

// Property: identically seeded generators agree
proptest! {
    #[test]
    fn prop_isaac_deterministic(seed in any::<[u32; 4]>()) {
        let mut left = IsaacRandom::new(&seed);
        let mut right = IsaacRandom::new(&seed);
        for _ in 0..300 {
            prop_assert_eq!(left.next_u32(), right.next_u32());
        }
    }
}

// Property: framing arbitrary bytes never exceeds the slot or the per-opcode cap
proptest! {
    #[test]
    fn prop_framing_respects_caps(data in prop::collection::vec(any::<u8>(), 0..4096), cap in 1u8..12) {
        let arena = BufferArena::new(1, 512);
        let table = OpcodeTable::default();
        let mut inbound = InboundState::new(arena.acquire(1).unwrap());

        let mut bytes = data.clone();
        let report = game::frame_inbound(&mut bytes, None, &table, &mut inbound, cap).unwrap();

        prop_assert!(inbound.offset() <= 512);
        for opcode in 0..=255u8 {
            prop_assert!(inbound.count(opcode) <= cap);
        }

        let messages = inbound.decode_messages(&table).unwrap();
        prop_assert_eq!(messages.len(), report.queued);
    }
}
