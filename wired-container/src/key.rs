//! Lookup keys.
//!
//! [`QualifiedTypeIdentifier`] is the key the container resolves: a
//! [`TypeIdentifier`] plus an optional [`Qualifier`] for cases where several
//! providers supply the same type.

use std::fmt;
use std::sync::Arc;

use crate::type_id::TypeIdentifier;

/// A name distinguishing providers of the same type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Qualifier(Arc<str>);

impl Qualifier {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Qualifier {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Qualifier {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Debug for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Qualifier({:?})", self.0)
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A type identifier with an optional qualifier. Equality is structural.
///
/// # Examples
/// ```
/// use wired_container::key::QualifiedTypeIdentifier;
///
/// let plain = QualifiedTypeIdentifier::of::<String>();
/// assert_eq!(plain.qualifier(), None);
///
/// let primary = QualifiedTypeIdentifier::qualified::<String>("primary_db");
/// let replica = QualifiedTypeIdentifier::qualified::<String>("replica_db");
/// assert_ne!(primary, replica);
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct QualifiedTypeIdentifier {
    type_identifier: TypeIdentifier,
    qualifier: Option<Qualifier>,
}

impl QualifiedTypeIdentifier {
    pub fn new(type_identifier: TypeIdentifier, qualifier: Option<Qualifier>) -> Self {
        Self {
            type_identifier,
            qualifier,
        }
    }

    /// Unqualified key for `type_identifier`.
    #[inline]
    pub fn unqualified(type_identifier: TypeIdentifier) -> Self {
        Self::new(type_identifier, None)
    }

    /// Unqualified key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::unqualified(TypeIdentifier::of::<T>())
    }

    /// Key for type `T` restricted to providers carrying `qualifier`.
    #[inline]
    pub fn qualified<T: ?Sized + 'static>(qualifier: impl Into<Qualifier>) -> Self {
        Self::new(TypeIdentifier::of::<T>(), Some(qualifier.into()))
    }

    #[inline]
    pub fn type_identifier(&self) -> &TypeIdentifier {
        &self.type_identifier
    }

    #[inline]
    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }

    /// The same key with generic parameters erased.
    #[must_use]
    pub fn erasure(&self) -> Self {
        Self::new(self.type_identifier.erasure(), self.qualifier.clone())
    }

    /// The same type without its qualifier.
    #[must_use]
    pub fn without_qualifier(&self) -> Self {
        Self::unqualified(self.type_identifier.clone())
    }
}

impl From<TypeIdentifier> for QualifiedTypeIdentifier {
    fn from(type_identifier: TypeIdentifier) -> Self {
        Self::unqualified(type_identifier)
    }
}

impl fmt::Debug for QualifiedTypeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "QualifiedTypeIdentifier({}, qualifier={:?})", self.type_identifier, q.name()),
            None => write!(f, "QualifiedTypeIdentifier({})", self.type_identifier),
        }
    }
}

impl fmt::Display for QualifiedTypeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{} (qualifier={:?})", self.type_identifier, q.name()),
            None => write!(f, "{}", self.type_identifier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mailer;

    #[test]
    fn key_of_type() {
        let key = QualifiedTypeIdentifier::of::<Mailer>();
        assert!(key.type_identifier().root().contains("Mailer"));
        assert_eq!(key.qualifier(), None);
    }

    #[test]
    fn qualified_vs_unqualified_different() {
        assert_ne!(
            QualifiedTypeIdentifier::qualified::<String>("a"),
            QualifiedTypeIdentifier::of::<String>()
        );
    }

    #[test]
    fn erasure_keeps_qualifier() {
        let key = QualifiedTypeIdentifier::qualified::<Vec<u8>>("blob");
        let erased = key.erasure();
        assert!(erased.type_identifier().is_raw());
        assert_eq!(erased.qualifier().map(Qualifier::name), Some("blob"));
        assert_eq!(erased.without_qualifier().qualifier(), None);
    }

    #[test]
    fn key_in_hashmap() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(QualifiedTypeIdentifier::qualified::<String>("x"), 1);
        map.insert(QualifiedTypeIdentifier::of::<String>(), 2);
        assert_eq!(map.get(&QualifiedTypeIdentifier::qualified::<String>("x")), Some(&1));
        assert_eq!(map.get(&QualifiedTypeIdentifier::of::<i32>()), None);
    }

    #[test]
    fn display_shows_qualifier() {
        let key = QualifiedTypeIdentifier::qualified::<String>("replica");
        assert_eq!(key.to_string(), "alloc::string::String (qualifier=\"replica\")");
    }
}
