//! Per-registration wrapper: scope dispatch, the once-guard, and cached
//! capability probes.

use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::container::Container;
use crate::error::Result;
use crate::key::Key;
use crate::lifecycle::{Starter, Stopper};
use crate::scope::Scope;

/// Type-erased shared instance.
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// Type-erased constructor. Runs the user factory and, when the
/// registration opted in, field injection, before the instance is cached.
pub(crate) type Ctor = Arc<dyn Fn(&Container) -> Result<AnyArc> + Send + Sync>;

/// Capability probes, captured at registration time where the concrete type
/// is known. Probing happens once; invocation downcasts the cached instance
/// and coerces it to the capability trait object.
pub(crate) type StarterProbe = Arc<dyn Fn(&AnyArc) -> Option<Arc<dyn Starter>> + Send + Sync>;
pub(crate) type StopperProbe = Arc<dyn Fn(&AnyArc) -> Option<Arc<dyn Stopper>> + Send + Sync>;

/// Interface caster for bulk queries: downcasts the erased instance and
/// returns the coerced `Arc<dyn I>` boxed as `Any`.
pub(crate) type IfaceCaster = Arc<dyn Fn(&AnyArc) -> Option<Box<dyn Any + Send>> + Send + Sync>;

/// Where instances come from.
pub(crate) enum Source {
    /// A factory invoked according to scope.
    Factory(Ctor),
    /// A pre-built value, returned verbatim.
    Instance(AnyArc),
}

/// One registration record plus its runtime state.
///
/// Singleton wrappers own their cached instance behind a mutex that doubles
/// as the once-guard: the factory runs with the lock held, so a concurrent
/// resolve blocks until the first one finishes. A failed factory leaves the
/// cell empty and the next resolve retries. The cycle check runs against
/// the thread's resolution chain *before* this lock is taken (see
/// `internal::chain`), which is what keeps a self-referential factory from
/// deadlocking here.
pub(crate) struct ServiceWrapper {
    pub(crate) key: Key,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) scope: Scope,
    pub(crate) eager: bool,
    pub(crate) groups: Vec<&'static str>,
    pub(crate) source: Source,
    pub(crate) cell: Mutex<Option<AnyArc>>,
    pub(crate) starter: Option<StarterProbe>,
    pub(crate) stopper: Option<StopperProbe>,
    pub(crate) ifaces: Vec<(&'static str, IfaceCaster)>,
    pub(crate) hook_timeout: Option<Duration>,
}

impl ServiceWrapper {
    /// Resolves one instance according to scope.
    ///
    /// The caller (the container) has already pushed this wrapper's frame
    /// onto the resolution chain and recorded the dependency edge.
    pub(crate) fn resolve(&self, c: &Container) -> Result<AnyArc> {
        match (&self.source, self.scope) {
            (Source::Instance(value), _) => Ok(value.clone()),
            (Source::Factory(ctor), Scope::Transient) => ctor(c),
            (Source::Factory(ctor), Scope::Singleton) => {
                let mut cell = self.cell.lock();
                if let Some(value) = cell.as_ref() {
                    return Ok(value.clone());
                }
                let value = ctor(c)?;
                *cell = Some(value.clone());
                Ok(value)
            }
        }
    }

    pub(crate) fn is_eager(&self) -> bool {
        self.eager
    }

    pub(crate) fn is_transient(&self) -> bool {
        self.scope == Scope::Transient
    }

    /// Whether this wrapper participates in lifecycle phases.
    ///
    /// Transient wrappers never do: there is no cached instance to drive.
    pub(crate) fn has_lifecycle(&self) -> bool {
        !self.is_transient() && (self.starter.is_some() || self.stopper.is_some())
    }

    pub(crate) fn in_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| *g == name)
    }

    /// Applies the caster registered for `trait_name`, if any.
    pub(crate) fn cast_iface(&self, trait_name: &str, value: &AnyArc) -> Option<Box<dyn Any + Send>> {
        self.ifaces
            .iter()
            .find(|(name, _)| *name == trait_name)
            .and_then(|(_, cast)| cast(value))
    }

    pub(crate) fn implements(&self, trait_name: &str) -> bool {
        self.ifaces.iter().any(|(name, _)| *name == trait_name)
    }

    /// The cached instance, if one was ever built.
    ///
    /// Instance registrations are always "built"; lazy singletons that were
    /// never resolved return `None` and their hooks no-op.
    pub(crate) fn built_instance(&self) -> Option<AnyArc> {
        match &self.source {
            Source::Instance(value) => Some(value.clone()),
            Source::Factory(_) => self.cell.lock().clone(),
        }
    }

    /// Invokes the instance's `on_start`, or does nothing when the instance
    /// was never built or carries no start capability.
    pub(crate) async fn start(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        let Some(probe) = &self.starter else {
            return Ok(());
        };
        let Some(instance) = self.built_instance() else {
            return Ok(());
        };
        match probe(&instance) {
            Some(starter) => starter.on_start(ctx).await,
            None => Ok(()),
        }
    }

    /// Invokes the instance's `on_stop`, symmetric to [`start`](Self::start).
    pub(crate) async fn stop(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        let Some(probe) = &self.stopper else {
            return Ok(());
        };
        let Some(instance) = self.built_instance() else {
            return Ok(());
        };
        match probe(&instance) {
            Some(stopper) => stopper.on_stop(ctx).await,
            None => Ok(()),
        }
    }
}
