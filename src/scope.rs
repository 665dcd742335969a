//! Service scope definitions.

/// Scope of a registration, controlling instance caching behavior.
///
/// # Scope characteristics
///
/// - **Singleton**: the factory runs at most once; the instance is cached on
///   the wrapper and shared by every resolution. Eager singletons run their
///   factory during `build()`, lazy ones on first resolve.
/// - **Transient**: the factory runs on every resolution and nothing is
///   cached. Transient registrations never participate in lifecycle.
///
/// # Examples
///
/// ```rust
/// use keel::Container;
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Probe;
///
/// let c = Container::new();
/// c.bind::<Config>()
///     .provider_fn(|_| Config { url: "postgres://localhost".into() })
///     .unwrap();
/// c.bind::<Probe>().transient().provider_fn(|_| Probe).unwrap();
///
/// // Singleton: same instance every time.
/// let a = c.resolve::<Config>().unwrap();
/// let b = c.resolve::<Config>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// // Transient: fresh instance every time.
/// let p = c.resolve::<Probe>().unwrap();
/// let q = c.resolve::<Probe>().unwrap();
/// assert!(!Arc::ptr_eq(&p, &q));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One cached instance per container.
    Singleton,
    /// A fresh instance per resolution, never cached.
    Transient,
}
