//! Lifecycle capabilities and the start/stop engine.
//!
//! Services opt into lifecycle by implementing [`Starter`] and/or
//! [`Stopper`] and annotating their registration with `.as_starter()` /
//! `.as_stopper()`. The [`LifecycleEngine`] consumes the dependency edges
//! captured during resolution, starts services in parallel per dependency
//! layer, and stops them in strict reverse.

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

mod engine;
mod topo;

pub use engine::{BlameEntry, LifecycleEngine, LifecycleOptions};
pub(crate) use topo::layer_keys;

/// A lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Ordered startup, children before parents.
    Start,
    /// Ordered shutdown, strict reverse of startup.
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => f.write_str("start"),
            Phase::Stop => f.write_str("stop"),
        }
    }
}

/// Startup capability.
///
/// `on_start` is invoked once per start phase, after every dependency of the
/// service has finished its own `on_start`. The token is cancelled when the
/// hook's deadline or the phase budget expires, or when a sibling hook in
/// the same layer fails; implementations should stop work and return when
/// that happens — the engine will not wait past the deadline.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
///
/// struct Listener;
///
/// #[async_trait]
/// impl keel::Starter for Listener {
///     async fn on_start(&self, _ctx: CancellationToken) -> anyhow::Result<()> {
///         // bind sockets, spawn accept loops, ...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Starter: Send + Sync {
    async fn on_start(&self, ctx: CancellationToken) -> anyhow::Result<()>;
}

/// Shutdown capability, symmetric to [`Starter`].
///
/// `on_stop` is invoked once per stop phase, before any dependency of the
/// service is stopped: if this service used another service during startup,
/// that service is still usable here.
#[async_trait]
pub trait Stopper: Send + Sync {
    async fn on_stop(&self, ctx: CancellationToken) -> anyhow::Result<()>;
}
