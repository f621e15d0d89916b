//! # Negotiation Handlers
//!
//! Handlers for the opcodes a fresh connection may open with, plus the file-request loop a
//! connection runs once the update server has accepted it.
//!
//! | Opcode | Reply | Next phase |
//! |---|---|---|
//! | `JS5_OPEN` | `[0]`, or `[6]` on a version mismatch | `Js5` / `Closed` |
//! | `WORLD_LIST_FETCH` | `[0]` then the world-list response | `WorldList` |
//! | `WORLD_HANDSHAKE` | `[0][seed:8]` | `Login` |
//! | `CREATE_LOG_PROGRESS` | `[2]` | `New` |
//! | `CREATE_CHECK_NAME` | `[2]` then name suggestions | `New` |
//! | `CREATE_ACCOUNT` | `[2]` | `New` |
//!
//! Login frames (`WORLD_CONNECT`/`WORLD_RECONNECT`) need the session's own state and are
//! handled by [`crate::protocol::session::Session`] directly.

use crate::context::ServerContext;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::js5;
use crate::protocol::login::{self, AccountCreation, CreationProgress};
use crate::protocol::opcodes::{self, worldlist};
use crate::protocol::session::Phase;
use crate::transport::outbox::Outbox;
use crate::utils::base37;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

/// Reply code acknowledging each account-creation step.
pub const CREATE_OK: u8 = 2;

/// What a handler can reach: the shared server context and this connection's outbox.
pub struct HandshakeContext<'a> {
    pub ctx: &'a ServerContext,
    pub outbox: &'a Outbox,
    pub peer: SocketAddr,
}

impl<'a> HandshakeContext<'a> {
    pub fn new(ctx: &'a ServerContext, outbox: &'a Outbox, peer: SocketAddr) -> Self {
        Self { ctx, outbox, peer }
    }

    fn send(&self, bytes: impl Into<bytes::Bytes>) -> Result<()> {
        self.outbox.send(bytes)
    }
}

/// Install every negotiation handler on `dispatcher`.
pub fn register_handlers(dispatcher: &Dispatcher) -> Result<()> {
    dispatcher.register(opcodes::login::JS5_OPEN, js5_open)?;
    dispatcher.register(opcodes::login::WORLD_LIST_FETCH, world_list_fetch)?;
    dispatcher.register(opcodes::login::WORLD_HANDSHAKE, world_handshake)?;
    dispatcher.register(opcodes::login::CREATE_LOG_PROGRESS, create_log_progress)?;
    dispatcher.register(opcodes::login::CREATE_CHECK_NAME, create_check_name)?;
    dispatcher.register(opcodes::login::CREATE_ACCOUNT, create_account)?;
    Ok(())
}

fn js5_open(hs: &HandshakeContext<'_>, packet: &mut Packet) -> Result<Phase> {
    let version = packet.read_u32()?;
    let expected = hs.ctx.settings.protocol.client_version;

    if version == expected {
        hs.send(vec![opcodes::js5::OUT_SUCCESS])?;
        debug!(peer = %hs.peer, version, "Update server session opened");
        Ok(Phase::Js5)
    } else {
        hs.send(vec![opcodes::js5::OUT_OUT_OF_DATE])?;
        info!(peer = %hs.peer, version, expected, "Client out of date");
        Ok(Phase::Closed)
    }
}

fn world_list_fetch(hs: &HandshakeContext<'_>, packet: &mut Packet) -> Result<Phase> {
    let checksum = packet.read_u32()?;

    let mut reply = vec![worldlist::OUT_SUCCESS];
    reply.extend(hs.ctx.world_list.encode_response(checksum)?);
    hs.send(reply)?;

    hs.ctx.metrics.worldlist_fetch();
    debug!(
        peer = %hs.peer,
        full = checksum != hs.ctx.world_list.checksum(),
        "World list sent"
    );
    Ok(Phase::WorldList)
}

fn world_handshake(hs: &HandshakeContext<'_>, _packet: &mut Packet) -> Result<Phase> {
    let mut reply = Packet::with_capacity(9);
    reply.write_u8(0);
    reply.write_u64(rand::random::<u64>());
    hs.send(reply.into_inner())?;
    Ok(Phase::Login)
}

fn create_log_progress(hs: &HandshakeContext<'_>, packet: &mut Packet) -> Result<Phase> {
    let progress = CreationProgress::decode(packet)?;
    debug!(
        peer = %hs.peer,
        day = progress.day,
        month = progress.month,
        year = progress.year,
        country = progress.country,
        "Account creation progress"
    );
    hs.send(vec![CREATE_OK])?;
    Ok(Phase::New)
}

fn create_check_name(hs: &HandshakeContext<'_>, packet: &mut Packet) -> Result<Phase> {
    let name = base37::decode(packet.read_u64()?).unwrap_or_default();
    debug!(peer = %hs.peer, name = %name, "Account name check");

    let suggestions = suggest_names(&name);
    let suggestions: Vec<&str> = suggestions.iter().map(String::as_str).collect();

    hs.send(vec![CREATE_OK])?;
    hs.send(login::encode_name_suggestions(&suggestions)?)?;
    Ok(Phase::New)
}

fn create_account(hs: &HandshakeContext<'_>, packet: &mut Packet) -> Result<Phase> {
    let account = AccountCreation::decode(packet, &hs.ctx.rsa_key)?;
    info!(
        peer = %hs.peer,
        username = %base37::decode(account.username).unwrap_or_default(),
        revision = account.revision,
        "Account creation request"
    );
    hs.send(vec![CREATE_OK])?;
    Ok(Phase::New)
}

/// Two alternatives to `name`, each still a valid base-37 name.
pub fn suggest_names(name: &str) -> Vec<String> {
    let stem: String = if name.is_empty() { "player" } else { name }
        .chars()
        .take(base37::MAX_NAME_LENGTH - 1)
        .collect();
    (1..=2).map(|n| format!("{stem}{n}")).collect()
}

/// Answer every file request in `packet`.
///
/// Groups missing from the asset store are skipped; the client re-requests them.
pub fn serve_file_requests(hs: &HandshakeContext<'_>, packet: &mut Packet) -> Result<usize> {
    let requests = js5::decode_requests(packet)?;
    let mut served = 0;

    for request in &requests {
        let file = match hs.ctx.assets.get(request.archive, request.group) {
            Ok(file) => file,
            Err(ProtocolError::AssetNotFound { archive, group }) => {
                warn!(peer = %hs.peer, archive, group, "Requested group not found");
                continue;
            }
            Err(e) => return Err(e),
        };

        hs.send(js5::encode_response(request, &file)?)?;
        hs.ctx.metrics.js5_request();
        served += 1;
    }

    Ok(served)
}
