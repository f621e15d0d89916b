//! # rt5-protocol
//!
//! Wire protocol engine and world loop for a revision 578 game server.
//!
//! A connection starts in the negotiation phase and moves to the update server (JS5), the world
//! list, or login. Logged-in players get a slot in each of two pre-allocated buffer arenas; their
//! inbound packets are framed into the inbound slot as they arrive and processed by the tick
//! scheduler every 600ms, which also serializes and flushes whatever the game logic queued.
//!
//! ## Modules
//! - [`core`]: byte and bit codec
//! - [`protocol`]: session phases and every packet format
//! - [`engine`]: players, registry, hooks and the tick scheduler
//! - [`transport`]: TCP supervisor and per-connection outboxes
//! - [`store`]: asset and map-key collaborators
//! - [`utils`]: ciphers, arena, metrics, logging, timeouts
//!
//! ## Example
//! ```rust,no_run
//! use rt5_protocol::config::ServerSettings;
//! use rt5_protocol::context::ServerContext;
//! use rt5_protocol::engine::{NoopHooks, TickScheduler};
//! use rt5_protocol::store::{JsonMapKeys, MemoryAssetStore};
//! use rt5_protocol::transport::Server;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> rt5_protocol::error::Result<()> {
//! let ctx = Arc::new(ServerContext::new(
//!     ServerSettings::default(),
//!     Arc::new(MemoryAssetStore::new()),
//!     Arc::new(JsonMapKeys::default()),
//!     Arc::new(NoopHooks),
//! )?);
//!
//! let server = Server::bind(Arc::clone(&ctx)).await?;
//! let stop = CancellationToken::new();
//! let ticks = TickScheduler::new(ctx);
//! let (served, ()) = tokio::join!(server.serve(), ticks.run(stop));
//! served?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod core;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod utils;

pub use config::ServerSettings;
pub use context::ServerContext;
pub use error::{ProtocolError, Result};
