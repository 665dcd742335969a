//! The dependency-injection container.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::binding::Binding;
use crate::error::{Error, Result};
use crate::internal::chain;
use crate::key::{key_of, Key};
use crate::lifecycle::{LifecycleEngine, LifecycleOptions};
use crate::module::Module;
use crate::registry::Registry;
use crate::wrapper::{AnyArc, ServiceWrapper};

/// Type-indexed service container with dependency-edge capture.
///
/// The container is the single object a process wires itself through:
/// registrations go in through [`bind`](Container::bind) (or through
/// [`Module`]s), [`build`](Container::build) instantiates every eager
/// singleton, and the `resolve` family hands instances out. Resolution
/// records every `(parent, child)` dependency edge it observes as a side
/// effect; the captured graph is what the [`LifecycleEngine`] later orders
/// startup and shutdown by — nobody declares edges explicitly.
///
/// All methods take `&self` and are safe under concurrent use. Two
/// concurrent resolutions of the same singleton observe the same instance
/// and run the factory once; transient resolutions always produce fresh
/// instances.
///
/// # Examples
///
/// ```rust
/// use keel::Container;
/// use std::sync::Arc;
///
/// struct Config { workers: usize }
/// struct Pool { size: usize }
///
/// let c = Container::new();
/// c.bind::<Config>().instance(Config { workers: 4 }).unwrap();
/// c.bind::<Pool>()
///     .provider(|c| {
///         let cfg = c.resolve::<Config>()?;
///         Ok(Pool { size: cfg.workers })
///     })
///     .unwrap();
/// c.build().unwrap();
///
/// let pool = c.resolve::<Pool>().unwrap();
/// assert_eq!(pool.size, 4);
///
/// // The Pool -> Config edge was captured during resolution.
/// let graph = c.graph();
/// let children = &graph[&keel::key_of::<Pool>()];
/// assert!(children.contains(&keel::key_of::<Config>()));
/// ```
pub struct Container {
    registry: RwLock<Registry>,
    graph: Mutex<HashMap<Key, Vec<Key>>>,
    built: AtomicBool,
    modules: Mutex<ModuleState>,
}

#[derive(Default)]
struct ModuleState {
    names: HashSet<String>,
    deferred: Vec<Error>,
}

impl Container {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::new()),
            graph: Mutex::new(HashMap::new()),
            built: AtomicBool::new(false),
            modules: Mutex::new(ModuleState::default()),
        }
    }

    /// Starts a fluent registration for `T`.
    pub fn bind<T: Send + Sync + 'static>(&self) -> Binding<'_, T> {
        Binding::new(self)
    }

    /// Applies a module's registrations.
    ///
    /// A duplicate module name is refused immediately. Errors the module
    /// raises while registering are recorded against its name and returned,
    /// aggregated, from [`build`](Container::build).
    pub fn apply<M: Module>(&self, module: M) -> Result<()> {
        let name = module.name().to_string();
        {
            let mut state = self.modules.lock();
            if !state.names.insert(name.clone()) {
                return Err(Error::Duplicate { key: name });
            }
        }
        tracing::debug!(module = %name, "applying module");
        if let Err(source) = module.register(self) {
            let err = Error::Module {
                name: name.clone(),
                source,
            };
            tracing::warn!(module = %name, error = %err, "module registration failed; reported at build()");
            self.modules.lock().deferred.push(err);
        }
        Ok(())
    }

    /// Builds the container: reports deferred module errors, then
    /// instantiates every eager singleton in registration order.
    ///
    /// Idempotent — a second call finds every eager instance already cached
    /// and changes nothing observable.
    pub fn build(&self) -> Result<()> {
        self.built.store(true, Ordering::SeqCst);

        let deferred = std::mem::take(&mut self.modules.lock().deferred);
        if !deferred.is_empty() {
            return Err(Error::Aggregate { errors: deferred });
        }

        let eagers: Vec<Arc<ServiceWrapper>> = {
            let registry = self.registry.read();
            registry.wrappers().filter(|w| w.is_eager()).cloned().collect()
        };
        for wrapper in eagers {
            self.resolve_wrapper(&wrapper)?;
        }
        tracing::debug!("container built");
        Ok(())
    }

    /// Resolves a single instance of `T`.
    ///
    /// Looks up `T`'s exact type key first; when nothing is registered
    /// under it, falls back to the unique registration whose declared type
    /// is `T` (covering alias-only registrations). Several candidates and
    /// no way to pick one is `Ambiguous`.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = key_of::<T>();
        let any = self.resolve_single(&key, TypeId::of::<T>())?;
        self.downcast::<T>(&key, any)
    }

    /// Resolves the registration under `alias`, expecting an instance of
    /// `T`.
    pub fn resolve_named<T: Send + Sync + 'static>(&self, alias: &'static str) -> Result<Arc<T>> {
        let key = Key::Alias(alias);
        let wrapper = self.single_wrapper(&key)?;
        let any = self.resolve_wrapper(&wrapper)?;
        self.downcast::<T>(&key, any)
    }

    /// Resolves every registration whose declared type is `T`, in
    /// registration order. Instantiates each candidate; the first failure
    /// short-circuits.
    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        let candidates = self.registry.read().candidates_for_type(TypeId::of::<T>());
        let mut out = Vec::with_capacity(candidates.len());
        for wrapper in candidates {
            let any = self.resolve_wrapper(&wrapper)?;
            out.push(self.downcast::<T>(&wrapper.key, any)?);
        }
        Ok(out)
    }

    /// Resolves every registration annotated `.as_trait::<I>(..)`, coerced
    /// to the interface, in registration order.
    pub fn resolve_all_trait<I>(&self) -> Result<Vec<Arc<I>>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let trait_name = std::any::type_name::<I>();
        let candidates = self.registry.read().candidates_for_trait(trait_name);
        self.resolve_as_trait(candidates, trait_name)
    }

    /// Like [`resolve_all`](Container::resolve_all), restricted to members
    /// of `group`.
    pub fn resolve_group<T: Send + Sync + 'static>(&self, group: &str) -> Result<Vec<Arc<T>>> {
        let candidates: Vec<Arc<ServiceWrapper>> = self
            .registry
            .read()
            .candidates_in_group(group)
            .into_iter()
            .filter(|w| w.type_id == TypeId::of::<T>())
            .collect();
        let mut out = Vec::with_capacity(candidates.len());
        for wrapper in candidates {
            let any = self.resolve_wrapper(&wrapper)?;
            out.push(self.downcast::<T>(&wrapper.key, any)?);
        }
        Ok(out)
    }

    /// Like [`resolve_all_trait`](Container::resolve_all_trait), restricted
    /// to members of `group`.
    pub fn resolve_group_trait<I>(&self, group: &str) -> Result<Vec<Arc<I>>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let trait_name = std::any::type_name::<I>();
        let candidates: Vec<Arc<ServiceWrapper>> = self
            .registry
            .read()
            .candidates_in_group(group)
            .into_iter()
            .filter(|w| w.implements(trait_name))
            .collect();
        self.resolve_as_trait(candidates, trait_name)
    }

    /// Resolves `T`, panicking on error. The contract is otherwise
    /// identical to [`resolve`](Container::resolve).
    pub fn must_resolve<T: Send + Sync + 'static>(&self) -> Arc<T> {
        self.resolve::<T>()
            .unwrap_or_else(|e| panic!("must_resolve::<{}>: {e}", std::any::type_name::<T>()))
    }

    /// True when `T` is resolvable: its type key is registered, or at least
    /// one registration declares `T`.
    pub fn has<T: Send + Sync + 'static>(&self) -> bool {
        let registry = self.registry.read();
        registry.has(&key_of::<T>())
            || !registry.candidates_for_type(TypeId::of::<T>()).is_empty()
    }

    /// True when a registration exists under `alias`.
    pub fn has_named(&self, alias: &'static str) -> bool {
        self.registry.read().has(&Key::Alias(alias))
    }

    /// True when a registration exists under `key`.
    pub fn has_key(&self, key: &Key) -> bool {
        self.registry.read().has(key)
    }

    /// All registered keys, sorted by display name.
    pub fn list(&self) -> Vec<Key> {
        self.registry.read().list()
    }

    /// A deep copy of the captured dependency-edge map, for diagnostics.
    pub fn graph(&self) -> HashMap<Key, Vec<Key>> {
        self.graph.lock().clone()
    }

    /// Builds the lifecycle engine from the wrapper catalog and the
    /// captured edges. Fails with `Cycle` if the participant graph cannot
    /// be layered.
    pub fn lifecycle(&self, options: LifecycleOptions) -> Result<LifecycleEngine> {
        let participants: Vec<Arc<ServiceWrapper>> = {
            let registry = self.registry.read();
            registry
                .wrappers()
                .filter(|w| w.has_lifecycle())
                .cloned()
                .collect()
        };
        LifecycleEngine::new(participants, self.graph(), options)
    }

    // ----- crate-internal plumbing -----

    pub(crate) fn register_wrapper(&self, wrapper: ServiceWrapper, replace: bool) -> Result<()> {
        let key = wrapper.key;
        let type_name = wrapper.type_name;

        let mut registry = self.registry.write();
        if replace {
            if self.built.load(Ordering::SeqCst) {
                return Err(Error::AlreadyBuilt { op: "replace" });
            }
            registry.replace(Arc::new(wrapper));
        } else {
            // Group membership is the multi-binding reservation; an
            // ungrouped second registration for a key is refused.
            if registry.has(&key) && wrapper.groups.is_empty() {
                return Err(Error::duplicate(&key));
            }
            registry.register(Arc::new(wrapper));
        }
        tracing::debug!(key = %key, type_name, replace, "registered service");
        Ok(())
    }

    /// Resolves an exact key: the path the field injector and alias lookups
    /// use. No type fallback.
    pub(crate) fn resolve_key(&self, key: &Key) -> Result<AnyArc> {
        let wrapper = self.single_wrapper(key)?;
        self.resolve_wrapper(&wrapper)
    }

    /// Runs one wrapper under the thread's resolution chain: records the
    /// dependency edge against the current parent, opens this key's frame
    /// (the cycle check — before any wrapper lock), resolves, and annotates
    /// failures with the chain.
    pub(crate) fn resolve_wrapper(&self, wrapper: &Arc<ServiceWrapper>) -> Result<AnyArc> {
        if let Some(parent) = chain::parent() {
            self.record_edge(parent, wrapper.key);
        }
        let _guard = chain::enter(wrapper.key)?;
        tracing::trace!(key = %wrapper.key, "resolving");
        match wrapper.resolve(self) {
            Ok(value) => Ok(value),
            Err(err @ (Error::Chain { .. } | Error::Cycle { .. })) => Err(err),
            Err(err) => Err(Error::Chain {
                chain: chain::render(),
                source: Box::new(err),
            }),
        }
    }

    fn record_edge(&self, parent: Key, child: Key) {
        self.graph.lock().entry(parent).or_default().push(child);
    }

    /// The unique wrapper registered under `key`; `NotFound`/`Ambiguous`
    /// otherwise, annotated with the open chain when the lookup happens
    /// inside a factory.
    fn single_wrapper(&self, key: &Key) -> Result<Arc<ServiceWrapper>> {
        let registry = self.registry.read();
        match registry.get(key) {
            Some([wrapper]) => Ok(wrapper.clone()),
            Some(slot) => Err(self.annotate_lookup(Error::ambiguous(key, slot.len()), key)),
            None => Err(self.annotate_lookup(Error::not_found(key), key)),
        }
    }

    /// Single-value resolution with the assignable-candidate fallback.
    fn resolve_single(&self, key: &Key, type_id: TypeId) -> Result<AnyArc> {
        let exact = {
            let registry = self.registry.read();
            match registry.get(key) {
                Some([wrapper]) => Some(wrapper.clone()),
                Some(slot) => {
                    return Err(self.annotate_lookup(Error::ambiguous(key, slot.len()), key))
                }
                None => None,
            }
        };
        let wrapper = match exact {
            Some(wrapper) => wrapper,
            None => {
                let candidates = self.registry.read().candidates_for_type(type_id);
                match candidates.as_slice() {
                    [] => return Err(self.annotate_lookup(Error::not_found(key), key)),
                    [wrapper] => wrapper.clone(),
                    many => {
                        return Err(self.annotate_lookup(Error::ambiguous(key, many.len()), key))
                    }
                }
            }
        };
        self.resolve_wrapper(&wrapper)
    }

    fn resolve_as_trait<I>(
        &self,
        candidates: Vec<Arc<ServiceWrapper>>,
        trait_name: &'static str,
    ) -> Result<Vec<Arc<I>>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let mut out = Vec::with_capacity(candidates.len());
        for wrapper in candidates {
            let any = self.resolve_wrapper(&wrapper)?;
            let mismatch = || Error::TypeMismatch {
                key: wrapper.key.display_name().to_string(),
                expected: trait_name,
            };
            let boxed = wrapper
                .cast_iface(trait_name, &any)
                .ok_or_else(|| mismatch())?;
            let arc = boxed.downcast::<Arc<I>>().map_err(|_| mismatch())?;
            out.push(*arc);
        }
        Ok(out)
    }

    fn downcast<T: Send + Sync + 'static>(&self, key: &Key, any: AnyArc) -> Result<Arc<T>> {
        any.downcast::<T>().map_err(|_| Error::TypeMismatch {
            key: key.display_name().to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Prepends the open resolution chain to lookup failures raised from
    /// inside a factory, so the error reads `resolving a -> b: ...`.
    fn annotate_lookup(&self, err: Error, key: &Key) -> Error {
        if chain::depth() == 0 {
            return err;
        }
        Error::Chain {
            chain: format!("{} -> {}", chain::render(), key),
            source: Box::new(err),
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}
