//! Modular registration.

use crate::container::Container;

/// A reusable bundle of registrations.
///
/// Modules let a subsystem own its wiring: the hosting application applies
/// each module to the container, and duplicate module names are refused.
/// Registration errors raised inside `register` are attributed to the
/// module and aggregated into `build()`'s result.
///
/// # Examples
///
/// ```rust
/// use keel::{Container, Module};
///
/// struct Database { url: String }
///
/// struct StorageModule;
///
/// impl Module for StorageModule {
///     fn name(&self) -> &str {
///         "storage"
///     }
///
///     fn register(&self, c: &Container) -> anyhow::Result<()> {
///         c.bind::<Database>()
///             .provider_fn(|_| Database { url: "postgres://localhost".into() })?;
///         Ok(())
///     }
/// }
///
/// let c = Container::new();
/// c.apply(StorageModule).unwrap();
/// assert!(c.apply(StorageModule).unwrap_err().is_duplicate());
/// c.build().unwrap();
/// assert!(c.has::<Database>());
/// ```
pub trait Module {
    /// Unique module name, used for duplicate detection and error
    /// attribution.
    fn name(&self) -> &str;

    /// Registers the module's services into the container.
    fn register(&self, c: &Container) -> anyhow::Result<()>;
}
