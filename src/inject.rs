//! Tag-driven field injection.
//!
//! A type opts in by implementing [`InjectFields`] and registering with
//! `.inject_fields()`. After its factory succeeds, and before the instance
//! is cached or returned, the resolver walks the type's field specs,
//! resolves each dependency (by alias when the tag carries `name=`, else by
//! the field's declared type) and hands it to `set_field`.
//!
//! Tag grammar: `"inject" ("," "name" "=" <alias>)? ("," "optional")?`.
//!
//! # Examples
//!
//! ```rust
//! use keel::{Container, FieldSpec, InjectFields, SetFieldError};
//! use std::any::Any;
//! use std::sync::Arc;
//!
//! struct Database;
//!
//! #[derive(Default)]
//! struct Reporting {
//!     db: Option<Arc<Database>>,
//! }
//!
//! impl InjectFields for Reporting {
//!     fn inject_specs() -> Vec<FieldSpec> {
//!         vec![FieldSpec::of::<Database>("db", "inject")]
//!     }
//!
//!     fn set_field(
//!         &mut self,
//!         field: &str,
//!         value: Arc<dyn Any + Send + Sync>,
//!     ) -> Result<(), SetFieldError> {
//!         match field {
//!             "db" => {
//!                 self.db = Some(value.downcast().map_err(|_| SetFieldError::TypeMismatch)?);
//!                 Ok(())
//!             }
//!             _ => Err(SetFieldError::NotSettable),
//!         }
//!     }
//! }
//!
//! let c = Container::new();
//! c.bind::<Database>().provider_fn(|_| Database).unwrap();
//! c.bind::<Reporting>()
//!     .inject_fields()
//!     .provider_fn(|_| Reporting::default())
//!     .unwrap();
//!
//! let reporting = c.resolve::<Reporting>().unwrap();
//! assert!(reporting.db.is_some());
//! ```

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::container::Container;
use crate::error::{Error, Result};
use crate::key::Key;

/// Declares one injectable field: its name, its tag, and the type resolved
/// when the tag carries no `name=` option.
pub struct FieldSpec {
    pub field: &'static str,
    pub tag: &'static str,
    type_id: TypeId,
    type_name: &'static str,
}

impl FieldSpec {
    /// Spec for a field of type `Arc<U>`.
    pub fn of<U: Send + Sync + 'static>(field: &'static str, tag: &'static str) -> Self {
        Self {
            field,
            tag,
            type_id: TypeId::of::<U>(),
            type_name: std::any::type_name::<U>(),
        }
    }
}

/// Outcome of a single `set_field` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetFieldError {
    /// The type refuses to write this field.
    NotSettable,
    /// The supplied value is not the field's type.
    TypeMismatch,
}

/// Field-injection contract.
///
/// `inject_specs` lists the injectable fields; `set_field` writes one of
/// them. A field the implementation does not recognize must return
/// [`SetFieldError::NotSettable`].
pub trait InjectFields: Send + Sync + 'static {
    fn inject_specs() -> Vec<FieldSpec>
    where
        Self: Sized;

    fn set_field(
        &mut self,
        field: &str,
        value: Arc<dyn Any + Send + Sync>,
    ) -> Result<(), SetFieldError>;
}

#[derive(Debug)]
struct Tag {
    name: Option<&'static str>,
    optional: bool,
}

/// Parses the tag grammar. Unknown options and malformed `name=` are
/// registration defects, reported as `InvalidProvider`.
fn parse_tag(tag: &'static str, owner: &'static str, field: &str) -> Result<Tag> {
    let invalid = |reason: String| Error::InvalidProvider {
        key: owner.to_string(),
        reason: format!("field `{field}`: {reason}"),
    };

    let mut parts = tag.split(',');
    if parts.next() != Some("inject") {
        return Err(invalid(format!("tag `{tag}` must start with `inject`")));
    }

    let mut parsed = Tag {
        name: None,
        optional: false,
    };
    for part in parts {
        if let Some(alias) = part.strip_prefix("name=") {
            if alias.is_empty() {
                return Err(invalid(format!("tag `{tag}` has an empty `name=`")));
            }
            parsed.name = Some(alias);
        } else if part == "optional" {
            parsed.optional = true;
        } else {
            return Err(invalid(format!("tag `{tag}` has unknown option `{part}`")));
        }
    }
    Ok(parsed)
}

/// Runs injection for `target`. Called by the wrapper's constructor closure
/// while the owning key's resolution frame is still open, so dependency
/// edges land on the owner.
pub(crate) fn apply<T: InjectFields>(target: &mut T, c: &Container) -> Result<()> {
    let owner = std::any::type_name::<T>();

    for spec in T::inject_specs() {
        let tag = parse_tag(spec.tag, owner, spec.field)?;
        let key = match tag.name {
            Some(alias) => Key::Alias(alias),
            None => Key::Type(spec.type_id, spec.type_name),
        };

        let value = match c.resolve_key(&key) {
            Ok(value) => value,
            Err(err) if err.is_not_found() && tag.optional => continue,
            Err(err) => return Err(err),
        };

        target.set_field(spec.field, value).map_err(|e| match e {
            SetFieldError::NotSettable => Error::NotSettable {
                type_name: owner,
                field: spec.field.to_string(),
            },
            SetFieldError::TypeMismatch => Error::TypeMismatch {
                key: key.display_name().to_string(),
                expected: spec.type_name,
            },
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_tag() {
        let tag = parse_tag("inject", "T", "f").unwrap();
        assert!(tag.name.is_none());
        assert!(!tag.optional);
    }

    #[test]
    fn parses_named_optional_tag() {
        let tag = parse_tag("inject,name=primary,optional", "T", "f").unwrap();
        assert_eq!(tag.name, Some("primary"));
        assert!(tag.optional);
    }

    #[test]
    fn rejects_unknown_option() {
        let err = parse_tag("inject,lazy", "T", "f").unwrap_err();
        assert!(err.is_invalid_provider());
    }

    #[test]
    fn rejects_missing_inject_prefix() {
        let err = parse_tag("name=primary", "T", "f").unwrap_err();
        assert!(err.is_invalid_provider());
    }

    #[test]
    fn rejects_empty_name() {
        let err = parse_tag("inject,name=", "T", "f").unwrap_err();
        assert!(err.is_invalid_provider());
    }
}
