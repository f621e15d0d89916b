//! # Tick Scheduler
//!
//! Drives every registered player through three phases once per interval:
//!
//! 1. **Read**: decode the frames buffered in each inbound slot and pass them to
//!    [`WorldHooks::on_message`] in arrival order
//! 2. **Update**: call [`WorldHooks::on_tick`] for each player
//! 3. **Flush**: serialize each player's queued packets through the outbound slot, flush it,
//!    then empty the inbound slot and reset the per-opcode counters together
//!
//! Every phase completes for all players before the next begins. The player list is copied
//! once at the start of a tick; players that log out mid-tick are skipped from then on.
//!
//! A hook that returns an error or panics is logged and counted, and the pass carries on with
//! the next player.
//!
//! [`TickScheduler::run`] sleeps `interval - elapsed` between passes (never negative), so a slow
//! tick shortens the following wait instead of skipping a tick.

use crate::context::ServerContext;
use crate::engine::player::Player;
use crate::error::{ProtocolError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Summary of one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub players: usize,
    pub messages: usize,
    pub flushed: usize,
    pub faults: usize,
}

pub struct TickScheduler {
    ctx: Arc<ServerContext>,
}

impl TickScheduler {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    /// Run one read/update/flush pass over every registered player.
    pub fn tick(&self) -> Result<TickReport> {
        let players = self.ctx.registry.snapshot()?;
        let hooks = &self.ctx.hooks;
        let mut report = TickReport {
            players: players.len(),
            ..TickReport::default()
        };

        for player in players.iter().filter(|p| p.is_active()) {
            let messages = match player.decode_messages(&self.ctx.opcodes) {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(player_id = player.id(), error = %e, "Discarding malformed inbound slot");
                    continue;
                }
            };
            for mut message in messages {
                report.messages += 1;
                self.isolate(player, "read", &mut report, || {
                    hooks.on_message(player, message.opcode, &mut message.payload)
                });
            }
        }

        for player in players.iter().filter(|p| p.is_active()) {
            self.isolate(player, "update", &mut report, || hooks.on_tick(player));
        }

        for player in players.iter().filter(|p| p.is_active()) {
            match player.flush_outbound() {
                Ok(written) => report.flushed += written,
                Err(ProtocolError::ConnectionClosed) => {
                    debug!(player_id = player.id(), "Connection gone before flush");
                }
                Err(ProtocolError::OutboxFull) => {
                    debug!(player_id = player.id(), "Outbox full, connection closing");
                }
                Err(e) => warn!(player_id = player.id(), error = %e, "Flush failed"),
            }
            if let Err(e) = player.reset_inbound() {
                warn!(player_id = player.id(), error = %e, "Inbound reset failed");
            }
        }

        Ok(report)
    }

    fn isolate<F>(&self, player: &Player, phase: &'static str, report: &mut TickReport, hook: F)
    where
        F: FnOnce() -> Result<()>,
    {
        match catch_unwind(AssertUnwindSafe(hook)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(player_id = player.id(), phase, error = %e, "Hook failed");
                report.faults += 1;
                self.ctx.metrics.hook_fault();
            }
            Err(_) => {
                error!(player_id = player.id(), phase, "Hook panicked");
                report.faults += 1;
                self.ctx.metrics.hook_fault();
            }
        }
    }

    /// Tick until `shutdown` is cancelled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, shutdown: CancellationToken) {
        let interval = self.ctx.settings.world.tick_interval;
        info!(interval_ms = interval.as_millis() as u64, "Tick scheduler started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let started = Instant::now();
            match self.tick() {
                Ok(report) => debug!(
                    players = report.players,
                    messages = report.messages,
                    faults = report.faults,
                    "Tick complete"
                ),
                Err(e) => error!(error = %e, "Tick failed"),
            }
            let elapsed = started.elapsed();

            let overran = elapsed >= interval;
            self.ctx.metrics.tick_completed(overran);
            if overran {
                warn!(elapsed_ms = elapsed.as_millis() as u64, "Tick overran its interval");
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval.saturating_sub(elapsed)) => {}
            }
        }

        info!("Tick scheduler stopped");
    }
}
