//! Fluent registration builder.

use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::container::Container;
use crate::error::{Error, Result};
use crate::inject::InjectFields;
use crate::key::{key_of, Key};
use crate::lifecycle::{Starter, Stopper};
use crate::scope::Scope;
use crate::wrapper::{AnyArc, Ctor, IfaceCaster, ServiceWrapper, Source, StarterProbe, StopperProbe};

type InjectStep<T> = Arc<dyn Fn(&mut T, &Container) -> Result<()> + Send + Sync>;

/// One in-flight registration, started with [`Container::bind`].
///
/// The chain configures the slot (alias, scope, eagerness, groups,
/// capability annotations) and a terminal method — [`provider`],
/// [`provider_fn`] or [`instance`] — registers it. Terminals return an
/// error when the registration is refused: `Duplicate` for an occupied key
/// without `.replace()` or a group, `AlreadyBuilt` for replace-after-build,
/// `InvalidProvider` for a malformed alias or an eager transient.
///
/// # Examples
///
/// ```rust
/// use keel::Container;
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let c = Container::new();
/// c.bind::<Database>()
///     .eager()
///     .provider_fn(|_| Database { url: "postgres://localhost".into() })
///     .unwrap();
/// c.bind::<UserService>()
///     .provider(|c| {
///         Ok(UserService { db: c.resolve::<Database>()? })
///     })
///     .unwrap();
///
/// c.build().unwrap();
/// let users = c.resolve::<UserService>().unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
/// ```
///
/// [`provider`]: Binding::provider
/// [`provider_fn`]: Binding::provider_fn
/// [`instance`]: Binding::instance
pub struct Binding<'c, T: Send + Sync + 'static> {
    container: &'c Container,
    alias: Option<&'static str>,
    scope: Scope,
    eager: bool,
    replace: bool,
    groups: Vec<&'static str>,
    hook_timeout: Option<Duration>,
    starter: Option<StarterProbe>,
    stopper: Option<StopperProbe>,
    ifaces: Vec<(&'static str, IfaceCaster)>,
    inject: Option<InjectStep<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<'c, T: Send + Sync + 'static> Binding<'c, T> {
    pub(crate) fn new(container: &'c Container) -> Self {
        Self {
            container,
            alias: None,
            scope: Scope::Singleton,
            eager: false,
            replace: false,
            groups: Vec::new(),
            hook_timeout: None,
            starter: None,
            stopper: None,
            ifaces: Vec::new(),
            inject: None,
            _marker: PhantomData,
        }
    }

    /// Registers under `alias` instead of `T`'s type key.
    ///
    /// Aliases must be non-empty `[A-Za-z0-9_-]`; the terminal refuses
    /// anything else with `InvalidProvider`.
    pub fn named(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    /// Makes the registration transient: a fresh instance per resolution,
    /// nothing cached, no lifecycle participation.
    pub fn transient(mut self) -> Self {
        self.scope = Scope::Transient;
        self
    }

    /// Forces instantiation during `build()` instead of on first resolve.
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// Permits overwriting an existing registration for the same key.
    /// Only legal before `build()`.
    pub fn replace(mut self) -> Self {
        self.replace = true;
        self
    }

    /// Adds the registration to `name`'s group.
    ///
    /// Grouped registrations may share a key with earlier records
    /// (multi-binding); such keys answer bulk queries but fail single-value
    /// resolution with `Ambiguous`.
    pub fn in_group(mut self, name: &'static str) -> Self {
        if !self.groups.contains(&name) {
            self.groups.push(name);
        }
        self
    }

    /// Overrides the engine's default per-hook deadline for this service.
    pub fn hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = Some(timeout);
        self
    }

    /// Declares that `T`'s instances take part in the start phase.
    pub fn as_starter(mut self) -> Self
    where
        T: Starter,
    {
        self.starter = Some(Arc::new(|any: &AnyArc| {
            any.clone()
                .downcast::<T>()
                .ok()
                .map(|t| t as Arc<dyn Starter>)
        }));
        self
    }

    /// Declares that `T`'s instances take part in the stop phase.
    pub fn as_stopper(mut self) -> Self
    where
        T: Stopper,
    {
        self.stopper = Some(Arc::new(|any: &AnyArc| {
            any.clone()
                .downcast::<T>()
                .ok()
                .map(|t| t as Arc<dyn Stopper>)
        }));
        self
    }

    /// Declares that `T` is resolvable through the interface `I` in bulk
    /// queries (`resolve_all_trait`, `resolve_group_trait`).
    ///
    /// The coercion closure is written at the call site, where the concrete
    /// type is known: `.as_trait::<dyn Health>(|svc| svc)`.
    pub fn as_trait<I>(mut self, coerce: fn(Arc<T>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let name = std::any::type_name::<I>();
        self.ifaces.push((
            name,
            Arc::new(move |any: &AnyArc| {
                any.clone()
                    .downcast::<T>()
                    .ok()
                    .map(|t| Box::new(coerce(t)) as Box<dyn std::any::Any + Send>)
            }),
        ));
        self
    }

    /// Runs tag-driven field injection on every instance the factory
    /// produces, before it is cached or returned.
    pub fn inject_fields(mut self) -> Self
    where
        T: InjectFields,
    {
        self.inject = Some(Arc::new(|value: &mut T, c: &Container| {
            crate::inject::apply(value, c)
        }));
        self
    }

    /// Registers a fallible factory and terminates the chain.
    ///
    /// The factory runs according to scope; an error it returns is wrapped
    /// with this registration's key unless it already is a container error,
    /// in which case its identity is preserved.
    pub fn provider<F>(self, factory: F) -> Result<()>
    where
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let key = self.key();
        let inject = self.inject.clone();
        let ctor: Ctor = Arc::new(move |c: &Container| -> Result<AnyArc> {
            let mut value = factory(c).map_err(|e| match e.downcast::<Error>() {
                Ok(inner) => inner,
                Err(other) => Error::Factory {
                    key: key.display_name().to_string(),
                    source: other,
                },
            })?;
            if let Some(inject) = &inject {
                inject(&mut value, c)?;
            }
            Ok(Arc::new(value) as AnyArc)
        });
        self.finish(Source::Factory(ctor))
    }

    /// Registers an infallible factory and terminates the chain.
    pub fn provider_fn<F>(self, factory: F) -> Result<()>
    where
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        self.provider(move |c| Ok(factory(c)))
    }

    /// Registers an already-constructed value and terminates the chain.
    ///
    /// The value is returned verbatim on every resolution; no factory runs
    /// and no field injection happens. Capability annotations still apply,
    /// so instance-registered services participate in lifecycle.
    pub fn instance(self, value: T) -> Result<()> {
        self.finish(Source::Instance(Arc::new(value)))
    }

    fn key(&self) -> Key {
        match self.alias {
            Some(alias) => Key::Alias(alias),
            None => key_of::<T>(),
        }
    }

    fn finish(self, source: Source) -> Result<()> {
        let key = self.key();

        if let Some(alias) = self.alias {
            let ok = !alias.is_empty()
                && alias
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
            if !ok {
                return Err(Error::InvalidProvider {
                    key: std::any::type_name::<T>().to_string(),
                    reason: format!("alias `{alias}` must be non-empty [A-Za-z0-9_-]"),
                });
            }
        }
        if self.eager && self.scope == Scope::Transient {
            return Err(Error::InvalidProvider {
                key: key.display_name().to_string(),
                reason: "a transient registration cannot be eager".to_string(),
            });
        }

        let wrapper = ServiceWrapper {
            key,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            scope: self.scope,
            eager: self.eager,
            groups: self.groups,
            source,
            cell: Mutex::new(None),
            starter: self.starter,
            stopper: self.stopper,
            ifaces: self.ifaces,
            hook_timeout: self.hook_timeout,
        };
        self.container.register_wrapper(wrapper, self.replace)
    }
}
