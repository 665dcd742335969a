//! Service key types for the container.

use std::any::TypeId;
use std::fmt;

/// Key for service storage and lookup.
///
/// Keys uniquely identify registration slots in the container. A slot is
/// either indexed by a concrete Rust type or by a user-supplied alias, and
/// the two namespaces cannot collide because they are separate enum arms.
///
/// # Examples
///
/// ```rust
/// use keel::{Container, Key, key_of};
/// use std::any::TypeId;
///
/// struct Database;
///
/// let c = Container::new();
/// c.bind::<Database>().provider_fn(|_| Database).unwrap();
/// c.bind::<u16>().named("http-port").instance(8080).unwrap();
///
/// assert!(c.has::<Database>());
/// assert!(c.has_named("http-port"));
/// assert_eq!(
///     key_of::<Database>(),
///     Key::Type(TypeId::of::<Database>(), std::any::type_name::<Database>()),
/// );
/// ```
#[derive(Debug, Clone, Copy)]
pub enum Key {
    /// Concrete type key: `TypeId` for identity, full type path for display.
    ///
    /// The type path is `std::any::type_name::<T>()`, which renders as
    /// `crate::module::TypeName` and is what diagnostics and the rendered
    /// resolution chain show.
    Type(TypeId, &'static str),
    /// User-supplied alias.
    ///
    /// Aliases live in their own namespace; an alias never shadows a type
    /// key. The builder validates aliases to `[A-Za-z0-9_-]+` before
    /// accepting a registration.
    Alias(&'static str),
}

impl Key {
    /// Human-readable form used in error messages, logs and `list()` output.
    pub fn display_name(&self) -> &'static str {
        match self {
            Key::Type(_, name) => name,
            Key::Alias(name) => name,
        }
    }

    /// Returns the alias for alias keys, `None` for type keys.
    pub fn alias(&self) -> Option<&'static str> {
        match self {
            Key::Type(_, _) => None,
            Key::Alias(name) => Some(name),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// TypeId-only comparison for type keys; the path string is display baggage.
impl PartialEq for Key {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Type(a, _), Key::Type(b, _)) => a == b,
            (Key::Alias(a), Key::Alias(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl std::hash::Hash for Key {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Key::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            Key::Alias(name) => {
                1u8.hash(state);
                name.hash(state);
            }
        }
    }
}

// Ordering for `Container::list()`: by display name, ties broken by variant
// and TypeId so distinct keys never compare equal.
impl PartialOrd for Key {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        match self.display_name().cmp(other.display_name()) {
            Ordering::Equal => match (self, other) {
                (Key::Type(a, _), Key::Type(b, _)) => a.cmp(b),
                (Key::Alias(_), Key::Alias(_)) => Ordering::Equal,
                (Key::Type(_, _), Key::Alias(_)) => Ordering::Less,
                (Key::Alias(_), Key::Type(_, _)) => Ordering::Greater,
            },
            ord => ord,
        }
    }
}

/// Builds the canonical type key for `T`.
#[inline]
pub fn key_of<T: 'static>() -> Key {
    Key::Type(TypeId::of::<T>(), std::any::type_name::<T>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_and_alias_never_collide() {
        // An alias spelled exactly like a type path is still a different key.
        let t = Key::Type(TypeId::of::<u32>(), "u32");
        let a = Key::Alias("u32");
        assert_ne!(t, a);
        assert_eq!(t.display_name(), a.display_name());
    }

    #[test]
    fn alias_equality_is_string_equality() {
        assert_eq!(Key::Alias("primary"), Key::Alias("primary"));
        assert_ne!(Key::Alias("primary"), Key::Alias("replica"));
    }

    #[test]
    fn ordering_follows_display_name() {
        let mut keys = vec![key_of::<u32>(), Key::Alias("alpha"), key_of::<String>()];
        keys.sort();
        let names: Vec<_> = keys.iter().map(|k| k.display_name()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
