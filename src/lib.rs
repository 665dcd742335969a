//! # keel
//!
//! Dependency injection container and lifecycle runtime for long-lived
//! server processes.
//!
//! ## Features
//!
//! - **Type-indexed registry**: register by concrete type or alias, with
//!   singleton / transient scopes, eager build-time instantiation and
//!   pre-built instances
//! - **Auto-discovered dependency graph**: nested resolutions record
//!   `parent -> child` edges as a side effect; nobody declares edges
//! - **Cycle detection**: per-thread resolution chains catch circular
//!   dependencies with the full rendered path, without deadlocking
//! - **Ordered lifecycle**: topological start layers run in parallel,
//!   shutdown is strict reverse, every hook runs under nested per-hook and
//!   per-phase deadlines
//! - **Guaranteed termination**: a stop phase that exceeds its budget arms
//!   a short grace countdown and then exits the process — no zombie
//!   shutdowns
//!
//! ## Quick start
//!
//! ```rust
//! use keel::Container;
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let c = Container::new();
//! c.bind::<Database>()
//!     .provider_fn(|_| Database { url: "postgres://localhost".into() })
//!     .unwrap();
//! c.bind::<UserService>()
//!     .provider(|c| Ok(UserService { db: c.resolve::<Database>()? }))
//!     .unwrap();
//! c.build().unwrap();
//!
//! let users = c.resolve::<UserService>().unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! ```
//!
//! ## Lifecycle
//!
//! Services implement [`Starter`] / [`Stopper`] and annotate their
//! registration; the engine orders them by the edges resolution captured:
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use keel::{Container, LifecycleOptions, Starter, Stopper};
//! use tokio_util::sync::CancellationToken;
//!
//! struct HttpServer;
//!
//! #[async_trait]
//! impl Starter for HttpServer {
//!     async fn on_start(&self, _ctx: CancellationToken) -> anyhow::Result<()> {
//!         Ok(()) // bind sockets, spawn the accept loop
//!     }
//! }
//!
//! #[async_trait]
//! impl Stopper for HttpServer {
//!     async fn on_stop(&self, _ctx: CancellationToken) -> anyhow::Result<()> {
//!         Ok(()) // drain connections
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let c = Container::new();
//!     c.bind::<HttpServer>()
//!         .eager()
//!         .as_starter()
//!         .as_stopper()
//!         .provider_fn(|_| HttpServer)?;
//!     c.build()?;
//!
//!     let engine = c.lifecycle(LifecycleOptions::default())?;
//!     engine.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     engine.stop().await?;
//!     Ok(())
//! }
//! ```

mod binding;
mod container;
mod error;
mod inject;
mod internal;
mod key;
pub mod lifecycle;
mod module;
mod registry;
mod scope;
mod wrapper;

pub use binding::Binding;
pub use container::Container;
pub use error::{Error, Result};
pub use inject::{FieldSpec, InjectFields, SetFieldError};
pub use key::{key_of, Key};
pub use lifecycle::{
    BlameEntry, LifecycleEngine, LifecycleOptions, Phase, Starter, Stopper,
};
pub use module::Module;
pub use scope::Scope;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn singleton_resolution_shares_one_instance() {
        let c = Container::new();
        c.bind::<usize>().instance(42).unwrap();

        let a = c.resolve::<usize>().unwrap();
        let b = c.resolve::<usize>().unwrap();
        assert_eq!(*a, 42);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn transient_resolution_creates_fresh_instances() {
        let c = Container::new();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter2 = counter.clone();
        c.bind::<String>()
            .transient()
            .provider_fn(move |_| {
                let n = counter2.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                format!("instance-{n}")
            })
            .unwrap();

        let a = c.resolve::<String>().unwrap();
        let b = c.resolve::<String>().unwrap();
        assert_eq!(a.as_str(), "instance-1");
        assert_eq!(b.as_str(), "instance-2");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn alias_resolution() {
        let c = Container::new();
        c.bind::<u32>().named("primary").instance(1).unwrap();
        c.bind::<u32>().named("replica").instance(2).unwrap();

        assert_eq!(*c.resolve_named::<u32>("primary").unwrap(), 1);
        assert_eq!(*c.resolve_named::<u32>("replica").unwrap(), 2);
        // Two candidates of the same type, no way to pick one.
        assert!(c.resolve::<u32>().unwrap_err().is_ambiguous());
    }
}
