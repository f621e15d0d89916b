//! # World Engine
//!
//! Authenticated players and the loop that drives them.
//!
//! ## Components
//! - **Player**: inbound/outbound slot state and outbound queue for one logged-in connection
//! - **Registry**: flat player table owning both buffer arenas
//! - **Hooks**: the `WorldHooks` extension trait and a bootstrap implementation
//! - **Tick**: the fixed-interval read/update/flush scheduler

pub mod hooks;
pub mod player;
pub mod registry;
pub mod tick;

pub use hooks::{BootstrapHooks, NoopHooks, WorldHooks};
pub use player::{Player, PlayerDetails, PlayerSlots};
pub use registry::WorldRegistry;
pub use tick::{TickReport, TickScheduler};
