//! # Session State Machine
//!
//! One [`Session`] per connection. It owns the connection's [`Phase`], routes each socket read
//! to the handler for that phase, and records the transition the handler returns.
//!
//! ```text
//! New ──JS5_OPEN──────────▶ Js5
//!  │ ──WORLD_LIST_FETCH──▶ WorldList
//!  │ ──WORLD_HANDSHAKE───▶ Login ──login frame──▶ Game
//!  │ ──account creation──▶ New
//!  └──────────────any fatal error──────────────▶ Closed
//! ```
//!
//! A login frame arriving while still in `New` is processed as if the handshake had been
//! skipped. Bytes left over after a negotiation message are handed to the next phase in the same
//! read.
//!
//! When an error is fatal for the phase it happened in (see
//! [`ProtocolError::is_connection_fatal`]) the session moves to `Closed`; the connection task
//! notices and drops the socket.

use crate::context::ServerContext;
use crate::core::packet::Packet;
use crate::engine::player::{Player, PlayerDetails};
use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::{self, HandshakeContext};
use crate::protocol::login::{self, LoginRequest};
use crate::protocol::opcodes::{self, LoginResponse};
use crate::transport::outbox::Outbox;
use crate::utils::isaac::IsaacRandom;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Protocol phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    New,
    Js5,
    WorldList,
    Login,
    Game,
    Closed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::New => "new",
            Phase::Js5 => "js5",
            Phase::WorldList => "worldlist",
            Phase::Login => "login",
            Phase::Game => "game",
            Phase::Closed => "closed",
        };
        f.write_str(name)
    }
}

pub struct Session {
    ctx: Arc<ServerContext>,
    outbox: Outbox,
    peer: SocketAddr,
    phase: Phase,
    player: Option<Arc<Player>>,
    cipher_in: Option<IsaacRandom>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("phase", &self.phase)
            .field("player", &self.player.as_ref().map(|p| p.id()))
            .finish()
    }
}

impl Session {
    pub fn new(ctx: Arc<ServerContext>, outbox: Outbox, peer: SocketAddr) -> Self {
        Self {
            ctx,
            outbox,
            peer,
            phase: Phase::New,
            player: None,
            cipher_in: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    pub fn player(&self) -> Option<&Arc<Player>> {
        self.player.as_ref()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Process one socket read. `data` may be rewritten in place.
    pub fn handle(&mut self, data: &mut [u8]) -> Result<()> {
        let result = self.process(data);
        if let Err(e) = &result {
            if e.is_connection_fatal(self.phase) {
                debug!(peer = %self.peer, phase = %self.phase, error = %e, "Closing session");
                self.phase = Phase::Closed;
            }
        }
        result
    }

    fn process(&mut self, data: &mut [u8]) -> Result<()> {
        if self.phase == Phase::Closed {
            return Err(ProtocolError::ConnectionClosed);
        }

        let mut offset = 0;
        while offset < data.len() {
            let rest = &mut data[offset..];
            match self.phase {
                Phase::New => offset += self.negotiate(rest)?,
                Phase::Login => offset += self.login(rest)?,
                Phase::Js5 => {
                    let mut packet = Packet::from_bytes(rest);
                    let hs = HandshakeContext::new(&self.ctx, &self.outbox, self.peer);
                    handshake::serve_file_requests(&hs, &mut packet)?;
                    return Ok(());
                }
                Phase::Game => return self.game(rest),
                Phase::WorldList => {
                    trace!(peer = %self.peer, len = rest.len(), "Ignoring data after world list");
                    return Ok(());
                }
                Phase::Closed => break,
            }
        }
        Ok(())
    }

    /// Handle one negotiation message and return how many bytes it used.
    fn negotiate(&mut self, data: &mut [u8]) -> Result<usize> {
        let opcode = data[0];
        if opcode == opcodes::login::WORLD_CONNECT || opcode == opcodes::login::WORLD_RECONNECT {
            self.phase = Phase::Login;
            return Ok(0);
        }

        let mut packet = Packet::from_bytes(&data[1..]);
        let hs = HandshakeContext::new(&self.ctx, &self.outbox, self.peer);
        let next = self.ctx.dispatcher.dispatch(opcode, &hs, &mut packet)?;

        if next != self.phase {
            trace!(peer = %self.peer, from = %self.phase, to = %next, "Phase change");
        }
        self.phase = next;
        Ok(1 + packet.position())
    }

    fn login(&mut self, data: &mut [u8]) -> Result<usize> {
        let mut packet = Packet::from_bytes(data);
        let request = match LoginRequest::decode(&mut packet, &self.ctx.rsa_key) {
            Ok(request) => request,
            Err(e) => {
                self.ctx.metrics.login_failed();
                return Err(e);
            }
        };
        let consumed = packet.position();

        let expected = self.ctx.settings.protocol.client_version;
        if request.revision != expected {
            info!(peer = %self.peer, revision = request.revision, expected, "Login from outdated client");
            self.reject(LoginResponse::OutOfDate)?;
            return Ok(consumed);
        }

        let details = PlayerDetails {
            username: request.display_name()?,
            window_mode: request.window_mode,
            reconnecting: request.is_reconnect(),
            peer: Some(self.peer),
        };
        let cipher_out = IsaacRandom::new(&request.outbound_seed());
        let outbox = self.outbox.clone();

        // The reply is queued while the registry is still locked, ahead of anything a tick
        // might flush for this player.
        let registered = self.ctx.registry.register(|slots| {
            outbox.send(login::encode_success(request.opcode, slots.id))?;
            Ok(Player::new(slots, details, Some(cipher_out), outbox.clone()))
        });
        let player = match registered {
            Ok(player) => player,
            Err(ProtocolError::RegistryFull) => {
                warn!(peer = %self.peer, "World full, rejecting login");
                self.reject(LoginResponse::WorldFull)?;
                return Ok(consumed);
            }
            Err(e) => {
                self.ctx.metrics.login_failed();
                return Err(e);
            }
        };

        self.cipher_in = Some(IsaacRandom::new(&request.inbound_seed()));
        self.player = Some(Arc::clone(&player));
        self.phase = Phase::Game;
        self.ctx.metrics.login_success();
        info!(
            peer = %self.peer,
            player_id = player.id(),
            username = %player.username(),
            reconnect = request.is_reconnect(),
            "Login complete"
        );

        if let Err(e) = self.ctx.hooks.on_connect(&player) {
            warn!(player_id = player.id(), error = %e, "Connect hook failed");
            self.ctx.metrics.hook_fault();
        }
        Ok(consumed)
    }

    fn reject(&mut self, code: LoginResponse) -> Result<()> {
        self.ctx.metrics.login_failed();
        self.phase = Phase::Closed;
        self.outbox.send(vec![u8::from(code)])
    }

    fn game(&mut self, data: &mut [u8]) -> Result<()> {
        let player = self.player.as_ref().ok_or(ProtocolError::ConnectionClosed)?;
        let report = player.frame_inbound(
            data,
            self.cipher_in.as_mut(),
            &self.ctx.opcodes,
            self.ctx.settings.world.per_opcode_cap,
        )?;

        self.ctx
            .metrics
            .packets_framed(report.queued as u64, report.dropped as u64);
        if let Some(overflow) = report.overflow() {
            debug!(
                player_id = player.id(),
                dropped = report.dropped,
                reason = %overflow,
                "Inbound packets dropped this tick"
            );
        }
        Ok(())
    }

    /// Leave the world, if logged in. Safe to call more than once.
    pub fn close(&mut self) {
        self.phase = Phase::Closed;
        let Some(player) = self.player.take() else {
            return;
        };

        match self.ctx.registry.remove(player.id()) {
            Ok(_) => self.ctx.hooks.on_disconnect(&player),
            Err(e) => warn!(player_id = player.id(), error = %e, "Failed to unregister player"),
        }
        debug!(peer = %self.peer, player_id = player.id(), "Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
