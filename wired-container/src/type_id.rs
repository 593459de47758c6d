//! Generics-aware type identity.
//!
//! A [`TypeIdentifier`] is a root type name plus an ordered list of generic
//! parameters. Identifiers are compared by fully-qualified name, never by
//! [`TypeId`](std::any::TypeId), so identifiers parsed from text and
//! identifiers built from a Rust type agree with each other.
//!
//! # Matching
//! Structural `==` is what maps use. Lookups use [`TypeIdentifier::matches`],
//! which is deliberately asymmetric: a less specific identifier matches a
//! more specific one, never the other way round.
//!
//! ```
//! use wired_container::type_id::TypeIdentifier;
//!
//! let raw = TypeIdentifier::just::<Vec<String>>();
//! let full = TypeIdentifier::of::<Vec<String>>();
//!
//! assert!(raw.matches(&full));
//! assert!(!full.matches(&raw));
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use wired_support::rendering::shorten_type_name;

use crate::error::{Result, WireError};

const POINTER_WRAPPERS: [&str; 3] = ["alloc::sync::Arc", "alloc::rc::Rc", "alloc::boxed::Box"];

/// An immutable, generics-aware type token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeIdentifier {
    root: Arc<str>,
    generics: Arc<[TypeIdentifier]>,
}

impl TypeIdentifier {
    /// Creates the fully parameterized identifier of `T`.
    ///
    /// Never fails: type shapes the parser does not understand (tuples,
    /// references, ...) are kept whole as an opaque root without generics.
    pub fn of<T: ?Sized + 'static>() -> Self {
        let name = type_name::<T>();
        Self::parse(name).unwrap_or_else(|_| Self::raw(name))
    }

    /// Creates the erased identifier of `T` (see [`erasure`](Self::erasure)).
    ///
    /// ```
    /// use wired_container::type_id::TypeIdentifier;
    ///
    /// let id = TypeIdentifier::just::<Option<u8>>();
    /// assert_eq!(id.root(), "core::option::Option");
    /// assert!(id.is_raw());
    /// ```
    pub fn just<T: ?Sized + 'static>() -> Self {
        Self::of::<T>().erasure()
    }

    /// Creates a root identifier from a fully-qualified path.
    pub fn raw(root: impl Into<Arc<str>>) -> Self {
        Self {
            root: root.into(),
            generics: Arc::from(Vec::new()),
        }
    }

    /// Parses a type name as printed by [`std::any::type_name`].
    ///
    /// Path types with generic arguments are unpacked recursively, and
    /// `dyn Trait + Bounds` objects are accepted.
    ///
    /// # Errors
    /// [`WireError::UnsupportedType`] for references, pointers, slices,
    /// arrays, tuples, function pointers, lifetimes, `impl Trait` and
    /// inferred placeholders.
    ///
    /// ```
    /// use wired_container::type_id::TypeIdentifier;
    ///
    /// let id = TypeIdentifier::parse("alloc::vec::Vec<alloc::string::String>").unwrap();
    /// assert_eq!(id.generics().len(), 1);
    /// assert!(TypeIdentifier::parse("&str").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self> {
        let mut parser = Parser { src: name, pos: 0 };
        let parsed = parser.parse_type().and_then(|id| {
            parser.skip_ws();
            if parser.pos == parser.src.len() {
                Ok(id)
            } else {
                Err("trailing tokens")
            }
        });

        parsed.map_err(|reason| WireError::UnsupportedType {
            type_name: name.to_string(),
            reason,
        })
    }

    /// Returns a copy with `generic` appended to the parameter list.
    ///
    /// ```
    /// use wired_container::type_id::TypeIdentifier;
    ///
    /// let list = TypeIdentifier::raw("alloc::vec::Vec")
    ///     .with_generic(TypeIdentifier::of::<String>());
    /// assert_eq!(list, TypeIdentifier::of::<Vec<String>>());
    /// ```
    #[must_use]
    pub fn with_generic(&self, generic: TypeIdentifier) -> Self {
        let mut generics = self.generics.to_vec();
        generics.push(generic);
        Self {
            root: self.root.clone(),
            generics: generics.into(),
        }
    }

    /// Returns the identifier without generic parameters. Idempotent.
    ///
    /// Owning pointers (`Arc`, `Rc`, `Box`) are transparent: their pointee
    /// is erased instead, so `Arc<Vec<u8>>` erases to `Arc<Vec>` rather than
    /// collapsing every shared service onto `Arc`. A consequence is that a
    /// bare `TypeIdentifier::raw("alloc::sync::Arc")` lookup never reaches a
    /// provider of a parameterized `Arc`: erased keys of `Arc` always keep
    /// their pointee.
    #[must_use]
    pub fn erasure(&self) -> Self {
        if self.generics.is_empty() {
            return self.clone();
        }
        if self.generics.len() == 1 && POINTER_WRAPPERS.contains(&&*self.root) {
            return Self {
                root: self.root.clone(),
                generics: Arc::from(vec![self.generics[0].erasure()]),
            };
        }
        Self::raw(self.root.clone())
    }

    /// Fully-qualified root name, e.g. `alloc::vec::Vec`.
    #[inline]
    pub fn root(&self) -> &str {
        &self.root
    }

    #[inline]
    pub fn generics(&self) -> &[TypeIdentifier] {
        &self.generics
    }

    /// Returns `true` if no generic parameters are known.
    #[inline]
    pub fn is_raw(&self) -> bool {
        self.generics.is_empty()
    }

    /// Asymmetric equality used for lookups.
    ///
    /// `self` matches `other` when the roots are equal and every generic
    /// parameter of `self` matches the parameter at the same position in
    /// `other`. `other` may carry more parameters than `self`, not fewer.
    pub fn matches(&self, other: &TypeIdentifier) -> bool {
        self.root == other.root
            && self.generics.len() <= other.generics.len()
            && self
                .generics
                .iter()
                .zip(other.generics.iter())
                .all(|(mine, theirs)| mine.matches(theirs))
    }

    /// Returns `true` if a value of type `other` can stand in for `self`.
    ///
    /// Directional: a parameter missing on `self` accepts anything, a
    /// parameter missing on `other` does not. Trait objects follow unsizing
    /// rules, so `dyn Repo` accepts `dyn Repo + Send + Sync` but not the
    /// reverse.
    ///
    /// ```
    /// use wired_container::type_id::TypeIdentifier;
    ///
    /// let raw = TypeIdentifier::just::<Vec<String>>();
    /// let full = TypeIdentifier::of::<Vec<String>>();
    /// assert!(raw.is_assignable_from(&full));
    /// assert!(!full.is_assignable_from(&raw));
    /// ```
    pub fn is_assignable_from(&self, other: &TypeIdentifier) -> bool {
        root_accepts(&self.root, &other.root)
            && self.generics.len() <= other.generics.len()
            && self
                .generics
                .iter()
                .zip(other.generics.iter())
                .all(|(mine, theirs)| mine.is_assignable_from(theirs))
    }

    /// Converse of [`is_assignable_from`](Self::is_assignable_from): `self`
    /// can stand in for `other`.
    #[inline]
    pub fn is_instance_of(&self, other: &TypeIdentifier) -> bool {
        other.is_assignable_from(self)
    }
}

impl fmt::Display for TypeIdentifier {
    /// `{}` prints fully-qualified names, `{:#}` the shortened form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return write!(f, "{}", shorten_type_name(&self.full_name()));
        }
        write!(f, "{}", self.full_name())
    }
}

impl fmt::Debug for TypeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeIdentifier({})", self.full_name())
    }
}

impl TypeIdentifier {
    fn full_name(&self) -> String {
        if self.generics.is_empty() {
            return self.root.to_string();
        }
        let params: Vec<String> = self.generics.iter().map(|g| g.full_name()).collect();
        format!("{}<{}>", self.root, params.join(", "))
    }
}

/// `target` accepts `source` when the roots are equal, or when both are
/// trait objects with the same principal trait and `target`'s extra bounds
/// are a subset of `source`'s.
fn root_accepts(target: &str, source: &str) -> bool {
    if target == source {
        return true;
    }
    let (Some(target), Some(source)) = (target.strip_prefix("dyn "), source.strip_prefix("dyn ")) else {
        return false;
    };

    let mut target_bounds = target.split(" + ");
    let mut source_bounds = source.split(" + ");
    if target_bounds.next() != source_bounds.next() {
        return false;
    }
    let source_bounds: Vec<&str> = source_bounds.collect();
    target_bounds.all(|bound| source_bounds.contains(&bound))
}

/// Recursive descent over `type_name` output.
struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn parse_type(&mut self) -> std::result::Result<TypeIdentifier, &'static str> {
        self.skip_ws();
        let rest = self.rest();

        if rest.starts_with("dyn ") {
            self.pos += 4;
            return self.parse_trait_object();
        }
        if rest.starts_with("impl ") {
            return Err("impl Trait types");
        }
        if rest.starts_with("fn(")
            || rest.starts_with("unsafe ")
            || rest.starts_with("extern ")
        {
            return Err("function pointers");
        }

        match self.peek() {
            Some('&') => Err("references"),
            Some('*') => Err("raw pointers"),
            Some('[') => Err("slices and arrays"),
            Some('(') => Err("tuples"),
            Some('\'') => Err("lifetimes"),
            Some('!') => Err("never types"),
            Some('_') if !rest[1..].starts_with(|c: char| c.is_alphanumeric() || c == '_') => {
                Err("inferred placeholders")
            }
            None => Err("empty type names"),
            _ => self.parse_path(),
        }
    }

    fn parse_trait_object(&mut self) -> std::result::Result<TypeIdentifier, &'static str> {
        let principal = self.parse_path()?;
        let mut root = format!("dyn {}", principal.root);

        loop {
            let save = self.pos;
            self.skip_ws();
            if !self.eat('+') {
                self.pos = save;
                break;
            }
            self.skip_ws();
            let bound = self.parse_path()?;
            root.push_str(" + ");
            root.push_str(&bound.full_name());
        }

        Ok(TypeIdentifier {
            root: root.into(),
            generics: principal.generics,
        })
    }

    fn parse_path(&mut self) -> std::result::Result<TypeIdentifier, &'static str> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if matches!(ch, '<' | '>' | ',' | ' ' | '+' | '(' | ')' | '[' | ']' | ';' | '&' | '*') {
                break;
            }
            self.pos += ch.len_utf8();
        }

        let root = &self.src[start..self.pos];
        if root.is_empty() || root.ends_with(':') {
            return Err("empty path segments");
        }

        let mut generics = Vec::new();
        if self.eat('<') {
            loop {
                generics.push(self.parse_type()?);
                self.skip_ws();
                if self.eat(',') {
                    continue;
                }
                if self.eat('>') {
                    break;
                }
                return Err("unterminated generic lists");
            }

            if self.rest().starts_with("::") {
                return Err("associated type paths");
            }
        }

        Ok(TypeIdentifier {
            root: root.into(),
            generics: generics.into(),
        })
    }
}
