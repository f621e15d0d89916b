// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::config::ServerSettings;
use crate::context::ServerContext;
use crate::engine::hooks::NoopHooks;
use crate::error::ProtocolError;
use crate::protocol::login::LoginRequest;
use crate::protocol::opcodes::{client, login, OpcodeTable, CLIENT_PROT_LENGTHS};
use crate::protocol::session::{Phase, Session};
use crate::protocol::worldlist::{default_countries, default_worlds, WorldList};
use crate::store::{JsonMapKeys, MemoryAssetStore};
use crate::transport::outbox::{self, OutboxReceiver};
use crate::utils::base37;
use crate::utils::isaac::IsaacRandom;
use crate::utils::rsa::test_keys;
use std::net::SocketAddr;
use std::sync::Arc;

const SEED: [u32; 4] = [0x1234_5678, 0x9ABC_DEF0, 42, 7];

fn base_context(max_players: usize, assets: MemoryAssetStore) -> ServerContext {
    let settings = ServerSettings::default_with_overrides(|s| {
        s.world.max_players = max_players;
        s.world.slot_size = 5000;
    });
    ServerContext::new(
        settings,
        Arc::new(assets),
        Arc::new(JsonMapKeys::default()),
        Arc::new(NoopHooks),
    )
    .unwrap()
    .with_rsa_key(test_keys::keypair().unwrap())
}

fn context_with(max_players: usize, assets: MemoryAssetStore) -> Arc<ServerContext> {
    Arc::new(base_context(max_players, assets))
}

fn context() -> Arc<ServerContext> {
    context_with(4, MemoryAssetStore::new())
}

fn session(ctx: &Arc<ServerContext>) -> (Session, OutboxReceiver) {
    let (outbox, rx) = outbox::channel(ctx.settings.server.outbox_capacity);
    let peer: SocketAddr = "127.0.0.1:50000".parse().unwrap();
    (Session::new(Arc::clone(ctx), outbox, peer), rx)
}

fn drain(rx: &mut OutboxReceiver) -> Vec<Vec<u8>> {
    std::iter::from_fn(|| rx.try_recv()).map(|b| b.to_vec()).collect()
}

fn login_frame(ctx: &ServerContext, opcode: u8, revision: u32) -> Vec<u8> {
    LoginRequest {
        opcode,
        revision,
        seed: SEED,
        username: base37::encode("mod_ash"),
        password: "secret".into(),
        ..LoginRequest::default()
    }
    .encode(&ctx.rsa_key)
    .unwrap()
}

#[test]
fn js5_open_with_matching_version() {
    let ctx = context();
    let (mut session, mut rx) = session(&ctx);

    session.handle(&mut [login::JS5_OPEN, 0, 0, 0x02, 0x42]).unwrap();
    assert_eq!(session.phase(), Phase::Js5);
    assert_eq!(drain(&mut rx), vec![vec![0]]);
}

#[test]
fn js5_open_with_wrong_version_closes() {
    let ctx = context();
    let (mut session, mut rx) = session(&ctx);

    session.handle(&mut [login::JS5_OPEN, 0, 0, 0x02, 0x41]).unwrap();
    assert_eq!(session.phase(), Phase::Closed);
    assert_eq!(drain(&mut rx), vec![vec![6]]);
    assert!(matches!(
        session.handle(&mut [0]),
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[test]
fn js5_requests_served_in_order() {
    let assets = MemoryAssetStore::new()
        .with_group(2, 5, vec![0, 0, 0, 0, 3, 0xA, 0xB, 0xC])
        .with_group(255, 255, vec![9, 9]);
    let ctx = context_with(4, assets);
    let (mut session, mut rx) = session(&ctx);

    session.handle(&mut [login::JS5_OPEN, 0, 0, 0x02, 0x42]).unwrap();
    drain(&mut rx);

    // A priority request, an ignored status record, a missing group, a prefetch.
    session
        .handle(&mut [
            1, 255, 0, 255, //
            3, 0, 0, 0, //
            1, 7, 0, 1, //
            0, 2, 0, 5,
        ])
        .unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![
            vec![255, 0, 255, 9, 9],
            vec![2, 0, 5, 0x80, 0, 0, 0, 3, 0xA, 0xB, 0xC],
        ]
    );
    assert_eq!(session.phase(), Phase::Js5);
    assert_eq!(ctx.metrics.snapshot().js5_requests, 2);
}

#[test]
fn js5_open_and_request_in_one_read() {
    let assets = MemoryAssetStore::new().with_group(255, 255, vec![1]);
    let ctx = context_with(4, assets);
    let (mut session, mut rx) = session(&ctx);

    session
        .handle(&mut [login::JS5_OPEN, 0, 0, 0x02, 0x42, 1, 255, 0, 255])
        .unwrap();
    assert_eq!(drain(&mut rx), vec![vec![0], vec![255, 0, 255, 1]]);
}

#[test]
fn world_list_with_current_checksum() {
    let ctx = context();
    let (mut session, mut rx) = session(&ctx);
    let checksum = ctx.world_list.checksum().to_be_bytes();

    let mut request = vec![login::WORLD_LIST_FETCH];
    request.extend_from_slice(&checksum);
    session.handle(&mut request).unwrap();

    let reply = drain(&mut rx).concat();
    assert_eq!(session.phase(), Phase::WorldList);
    assert_eq!(reply[0], 0);
    assert_eq!(reply[3], 1, "update flag");
    assert_eq!(reply[4], 0, "full table omitted");
    assert_eq!(&reply[1..], &ctx.world_list.encode_response(ctx.world_list.checksum()).unwrap()[..]);
}

#[test]
fn world_list_with_stale_checksum() {
    let ctx = context();
    let (mut session, mut rx) = session(&ctx);

    session
        .handle(&mut [login::WORLD_LIST_FETCH, 0, 0, 0, 0])
        .unwrap();

    let reply = drain(&mut rx).concat();
    let raw = ctx.world_list.raw();
    assert_eq!(reply[4], 1, "full table included");
    assert_eq!(&reply[5..5 + raw.len()], raw);
    assert_eq!(
        &reply[5 + raw.len()..9 + raw.len()],
        &ctx.world_list.checksum().to_be_bytes()
    );
    let size = usize::from(u16::from_be_bytes([reply[1], reply[2]]));
    assert_eq!(size, reply.len() - 3);
}

#[test]
fn configured_world_list_is_served() {
    let mut worlds = default_worlds();
    worlds.truncate(1);
    worlds[0].pvp = true;
    worlds[0].players = 321;
    let list = WorldList::new(default_countries(), worlds).unwrap();
    let ctx = Arc::new(base_context(4, MemoryAssetStore::new()).with_world_list(list.clone()));
    let (mut session, mut rx) = session(&ctx);

    session
        .handle(&mut [login::WORLD_LIST_FETCH, 0, 0, 0, 0])
        .unwrap();

    let reply = drain(&mut rx).concat();
    assert_eq!(&reply[1..], &list.encode_response(0).unwrap()[..]);
    assert_ne!(list.checksum(), WorldList::builtin().unwrap().checksum());
    assert_eq!(&reply[reply.len() - 2..], &321u16.to_be_bytes());
}

#[test]
fn handshake_then_login() {
    let ctx = context();
    let (mut session, mut rx) = session(&ctx);

    session.handle(&mut [login::WORLD_HANDSHAKE]).unwrap();
    assert_eq!(session.phase(), Phase::Login);
    let seed_reply = drain(&mut rx);
    assert_eq!(seed_reply.len(), 1);
    assert_eq!(seed_reply[0].len(), 9);
    assert_eq!(seed_reply[0][0], 0);

    let mut frame = login_frame(&ctx, login::WORLD_CONNECT, 578);
    session.handle(&mut frame).unwrap();
    assert_eq!(session.phase(), Phase::Game);

    let player = session.player().unwrap();
    assert_eq!(player.id(), 1);
    assert_eq!(player.username(), "Mod Ash");
    assert!(!player.is_reconnecting());
    assert_eq!(
        drain(&mut rx),
        vec![vec![2, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1]]
    );
    assert_eq!(ctx.registry.len().unwrap(), 1);
    assert_eq!(ctx.metrics.snapshot().logins_success, 1);
}

#[test]
fn reconnect_without_handshake() {
    let ctx = context();
    let (mut session, mut rx) = session(&ctx);

    let mut frame = login_frame(&ctx, login::WORLD_RECONNECT, 578);
    session.handle(&mut frame).unwrap();

    assert_eq!(session.phase(), Phase::Game);
    assert!(session.player().unwrap().is_reconnecting());
    assert_eq!(drain(&mut rx), vec![vec![15]]);
}

#[test]
fn login_with_wrong_revision() {
    let ctx = context();
    let (mut session, mut rx) = session(&ctx);

    session.handle(&mut [login::WORLD_HANDSHAKE]).unwrap();
    drain(&mut rx);
    session
        .handle(&mut login_frame(&ctx, login::WORLD_CONNECT, 577))
        .unwrap();

    assert_eq!(session.phase(), Phase::Closed);
    assert_eq!(drain(&mut rx), vec![vec![6]]);
    assert!(ctx.registry.is_empty().unwrap());
}

#[test]
fn login_when_world_full() {
    let ctx = context_with(1, MemoryAssetStore::new());
    let (mut first, _rx1) = session(&ctx);
    let (mut second, mut rx2) = session(&ctx);

    first
        .handle(&mut login_frame(&ctx, login::WORLD_CONNECT, 578))
        .unwrap();
    second
        .handle(&mut login_frame(&ctx, login::WORLD_CONNECT, 578))
        .unwrap();

    assert_eq!(first.phase(), Phase::Game);
    assert_eq!(second.phase(), Phase::Closed);
    assert_eq!(drain(&mut rx2), vec![vec![7]]);
    assert_eq!(ctx.metrics.snapshot().logins_failed, 1);
}

#[test]
fn corrupt_login_block_closes() {
    let ctx = context();
    let (mut session, _rx) = session(&ctx);

    let mut frame = login_frame(&ctx, login::WORLD_CONNECT, 578);
    let last = frame.len() - 1;
    frame.truncate(last);
    assert!(session.handle(&mut frame).is_err());
    assert_eq!(session.phase(), Phase::Closed);
}

#[test]
fn unknown_opcode_closes() {
    let ctx = context();
    let (mut session, _rx) = session(&ctx);

    assert!(matches!(
        session.handle(&mut [99]),
        Err(ProtocolError::UnknownOpcode(99))
    ));
    assert_eq!(session.phase(), Phase::Closed);
}

#[test]
fn short_negotiation_message_closes() {
    let ctx = context();
    let (mut session, _rx) = session(&ctx);

    assert!(matches!(
        session.handle(&mut [login::JS5_OPEN, 0, 0]),
        Err(ProtocolError::OutOfData { .. })
    ));
    assert_eq!(session.phase(), Phase::Closed);
}

#[test]
fn account_creation_steps_stay_in_new() {
    let ctx = context();
    let (mut session, mut rx) = session(&ctx);

    session
        .handle(&mut [login::CREATE_LOG_PROGRESS, 1, 2, 0x07, 0xC6, 0, 6])
        .unwrap();
    assert_eq!(session.phase(), Phase::New);

    let mut check = vec![login::CREATE_CHECK_NAME];
    check.extend_from_slice(&base37::encode("zezima").to_be_bytes());
    session.handle(&mut check).unwrap();
    assert_eq!(session.phase(), Phase::New);

    let replies = drain(&mut rx);
    assert_eq!(replies[0], vec![2]);
    assert_eq!(replies[1], vec![2]);
    assert_eq!(replies[2][..2], [login::CREATE_CHECK_NAME, 2]);
    let first = u64::from_be_bytes(replies[2][2..10].try_into().unwrap());
    assert_eq!(base37::decode(first).unwrap(), "zezima1");
}

#[test]
fn game_packets_are_deciphered_and_capped() {
    let ctx = context();
    let (mut session, _rx) = session(&ctx);
    session
        .handle(&mut login_frame(&ctx, login::WORLD_CONNECT, 578))
        .unwrap();

    let mut cipher = IsaacRandom::new(&SEED);
    let mut data: Vec<u8> = (0..15)
        .map(|_| client::NO_TIMEOUT.wrapping_add(cipher.next_u32() as u8))
        .collect();
    session.handle(&mut data).unwrap();

    let player = Arc::clone(session.player().unwrap());
    let messages = player.decode_messages(&ctx.opcodes).unwrap();
    assert_eq!(messages.len(), 10);
    assert!(messages.iter().all(|m| m.opcode == client::NO_TIMEOUT));

    let snapshot = ctx.metrics.snapshot();
    assert_eq!((snapshot.packets_queued, snapshot.packets_dropped), (10, 5));
    assert_eq!(session.phase(), Phase::Game);
}

#[test]
fn configured_opcode_lengths_drive_framing() {
    let mut lengths = CLIENT_PROT_LENGTHS;
    lengths[usize::from(client::NO_TIMEOUT)] = 2;
    let ctx = Arc::new(
        base_context(4, MemoryAssetStore::new()).with_opcodes(OpcodeTable::new(lengths)),
    );
    let (mut session, _rx) = session(&ctx);
    session
        .handle(&mut login_frame(&ctx, login::WORLD_CONNECT, 578))
        .unwrap();

    let mut cipher = IsaacRandom::new(&SEED);
    let mut data = Vec::new();
    for payload in [[0xAA, 0xBB], [0xCC, 0xDD]] {
        data.push(client::NO_TIMEOUT.wrapping_add(cipher.next_u32() as u8));
        data.extend_from_slice(&payload);
    }
    session.handle(&mut data).unwrap();

    let player = Arc::clone(session.player().unwrap());
    let messages = player.decode_messages(&ctx.opcodes).unwrap();
    let payloads: Vec<Vec<u8>> = messages
        .into_iter()
        .map(|m| m.payload.into_inner())
        .collect();
    assert_eq!(payloads, vec![vec![0xAA, 0xBB], vec![0xCC, 0xDD]]);
}

#[test]
fn dropping_session_frees_registry_slot() {
    let ctx = context_with(1, MemoryAssetStore::new());
    {
        let (mut session, _rx) = session(&ctx);
        session
            .handle(&mut login_frame(&ctx, login::WORLD_CONNECT, 578))
            .unwrap();
        assert_eq!(ctx.registry.len().unwrap(), 1);
    }
    assert!(ctx.registry.is_empty().unwrap());

    let (mut again, _rx) = session(&ctx);
    again
        .handle(&mut login_frame(&ctx, login::WORLD_CONNECT, 578))
        .unwrap();
    assert_eq!(again.player().unwrap().id(), 1);
}
