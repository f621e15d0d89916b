#![no_main]

use libfuzzer_sys::fuzz_target;
use rt5_protocol::protocol::game::{self, InboundState};
use rt5_protocol::protocol::opcodes::OpcodeTable;
use rt5_protocol::utils::arena::BufferArena;
use rt5_protocol::utils::isaac::IsaacRandom;

fuzz_target!(|data: &[u8]| {
    let arena = BufferArena::new(1, 5000);
    let Ok(slot) = arena.acquire(1) else {
        return;
    };
    let table = OpcodeTable::default();
    let mut inbound = InboundState::new(slot);
    let mut cipher = IsaacRandom::new(&[0, 0, 0, 0]);

    let mut bytes = data.to_vec();
    let Ok(report) = game::frame_inbound(&mut bytes, Some(&mut cipher), &table, &mut inbound, 10)
    else {
        return;
    };

    // Everything that was queued must decode back into exactly that many messages.
    let messages = inbound.decode_messages(&table).ok();
    assert_eq!(messages.map(|m| m.len()), Some(report.queued));
});
