//! The registration store: key-indexed wrapper lists plus candidate queries.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::key::Key;
use crate::wrapper::ServiceWrapper;

/// Key-indexed store of service wrappers.
///
/// The registry itself is permissive append-only: a key may hold several
/// wrappers (multi-binding). The duplicate policy — replace, append via a
/// group, or refuse — is enforced one level up, by the builder. All access
/// goes through the container's reader-writer lock.
#[derive(Default)]
pub(crate) struct Registry {
    slots: HashMap<Key, Vec<Arc<ServiceWrapper>>>,
    /// Every wrapper in registration order, for deterministic iteration and
    /// registration-ordered bulk queries.
    order: Vec<Arc<ServiceWrapper>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a wrapper under its key.
    pub(crate) fn register(&mut self, wrapper: Arc<ServiceWrapper>) {
        self.slots
            .entry(wrapper.key)
            .or_default()
            .push(wrapper.clone());
        self.order.push(wrapper);
    }

    /// Truncates the key's slot to the single incoming wrapper.
    pub(crate) fn replace(&mut self, wrapper: Arc<ServiceWrapper>) {
        self.order.retain(|w| w.key != wrapper.key);
        self.slots.insert(wrapper.key, vec![wrapper.clone()]);
        self.order.push(wrapper);
    }

    pub(crate) fn has(&self, key: &Key) -> bool {
        self.slots.contains_key(key)
    }

    pub(crate) fn get(&self, key: &Key) -> Option<&[Arc<ServiceWrapper>]> {
        self.slots.get(key).map(|v| v.as_slice())
    }

    /// Every wrapper, in registration order.
    pub(crate) fn wrappers(&self) -> impl Iterator<Item = &Arc<ServiceWrapper>> {
        self.order.iter()
    }

    /// Wrappers whose declared concrete type is `type_id`, in registration
    /// order. This is the assignability test for concrete types: named
    /// aliases and multi-bound records of the same type all match.
    pub(crate) fn candidates_for_type(&self, type_id: TypeId) -> Vec<Arc<ServiceWrapper>> {
        self.order
            .iter()
            .filter(|w| w.type_id == type_id)
            .cloned()
            .collect()
    }

    /// Wrappers carrying an interface caster for `trait_name`, in
    /// registration order.
    pub(crate) fn candidates_for_trait(&self, trait_name: &str) -> Vec<Arc<ServiceWrapper>> {
        self.order
            .iter()
            .filter(|w| w.implements(trait_name))
            .cloned()
            .collect()
    }

    /// Wrappers whose group set contains `name`, in registration order.
    pub(crate) fn candidates_in_group(&self, name: &str) -> Vec<Arc<ServiceWrapper>> {
        self.order
            .iter()
            .filter(|w| w.in_group(name))
            .cloned()
            .collect()
    }

    /// All registered keys, sorted.
    pub(crate) fn list(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.slots.keys().copied().collect();
        keys.sort();
        keys
    }
}
