//! Providers: the unit the container registers.
//!
//! An [`IdentifiableProvider`] describes what it produces (its own type plus
//! any additional wire types), how it is qualified, ordered and scoped,
//! whether it is gated by a [`LoadCondition`], and how to build an instance.
//!
//! [`SimpleProvider`] is the builder most code uses:
//!
//! ```rust
//! use std::sync::Arc;
//! use wired_container::provider::SimpleProvider;
//!
//! trait Mailer: Send + Sync {}
//! struct SmtpMailer;
//! impl Mailer for SmtpMailer {}
//!
//! let provider = SimpleProvider::lazy(|_| Ok(Arc::new(SmtpMailer)))
//!     .wire_as(|smtp: &Arc<SmtpMailer>| smtp.clone() as Arc<dyn Mailer>)
//!     .qualified("smtp")
//!     .primary();
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::condition::LoadCondition;
use crate::error::Result;
use crate::key::{QualifiedTypeIdentifier, Qualifier};
use crate::resolver::{FactoryFn, Instance, Resolver};
use crate::scope::ScopeKey;
use crate::type_id::TypeIdentifier;

/// Converts an instance of the provider's own type into an additional wire type.
pub type CastFn = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;

/// The capability every registered provider exposes.
pub trait IdentifiableProvider: Send + Sync {
    /// The type this provider produces.
    fn type_identifier(&self) -> &TypeIdentifier;

    /// Further types the produced instance can be wired as.
    fn additional_wire_types(&self) -> &[TypeIdentifier] {
        &[]
    }

    fn qualifiers(&self) -> &[Qualifier] {
        &[]
    }

    /// Singleton providers produce one instance for their whole lifetime.
    fn is_singleton(&self) -> bool {
        false
    }

    /// The primary provider wins unqualified lookups among its competitors.
    fn is_primary(&self) -> bool {
        false
    }

    /// `None` means the provider is registered unconditionally.
    fn condition(&self) -> Option<&dyn LoadCondition> {
        None
    }

    /// `None` selects the container's default scope.
    fn scope(&self) -> Option<&ScopeKey> {
        None
    }

    /// Ascending priority used for `get_all` and the convergence rounds.
    fn order(&self) -> i32 {
        0
    }

    /// Human-readable name for logs and error messages.
    fn name(&self) -> &str {
        self.type_identifier().root()
    }

    /// Builds a new instance of [`type_identifier`](Self::type_identifier).
    fn instantiate(&self, resolver: &dyn Resolver) -> Result<Instance>;

    /// Views `instance` as `target`, one of the types this provider supplies.
    fn cast(&self, instance: Instance, target: &TypeIdentifier) -> Option<Instance> {
        if target.matches(self.type_identifier())
            || self.additional_wire_types().iter().any(|t| target.matches(t))
        {
            Some(instance)
        } else {
            None
        }
    }
}

/// Identity of a registered provider (address of its allocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(usize);

/// Shared handle to a provider, compared by identity.
#[derive(Clone)]
pub struct ProviderRef(Arc<dyn IdentifiableProvider>);

impl ProviderRef {
    pub fn new(provider: impl IdentifiableProvider + 'static) -> Self {
        Self(Arc::new(provider))
    }

    pub fn from_arc(provider: Arc<dyn IdentifiableProvider>) -> Self {
        Self(provider)
    }

    #[inline]
    pub fn id(&self) -> ProviderId {
        ProviderId(Arc::as_ptr(&self.0) as *const () as usize)
    }

    /// Own type followed by every additional wire type.
    pub fn types(&self) -> impl Iterator<Item = &TypeIdentifier> {
        std::iter::once(self.0.type_identifier()).chain(self.0.additional_wire_types().iter())
    }

    /// Erased forms of [`types`](Self::types), without duplicates.
    pub fn erased_types(&self) -> Vec<TypeIdentifier> {
        let mut erased: Vec<TypeIdentifier> = Vec::new();
        for t in self.types() {
            let e = t.erasure();
            if !erased.contains(&e) {
                erased.push(e);
            }
        }
        erased
    }

    /// Returns the supplied type `key` matches, if any.
    ///
    /// An unqualified key accepts qualified providers; a qualified key only
    /// accepts providers carrying that qualifier.
    pub fn supplied_type(&self, key: &QualifiedTypeIdentifier) -> Option<&TypeIdentifier> {
        if let Some(q) = key.qualifier() {
            if !self.0.qualifiers().contains(q) {
                return None;
            }
        }
        self.types().find(|t| key.type_identifier().matches(t))
    }

    #[inline]
    pub fn provides(&self, key: &QualifiedTypeIdentifier) -> bool {
        self.supplied_type(key).is_some()
    }

    /// Returns `true` if a provider is gated by a condition.
    #[inline]
    pub fn is_conditional(&self) -> bool {
        self.0.condition().is_some()
    }
}

impl Deref for ProviderRef {
    type Target = dyn IdentifiableProvider;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for ProviderRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ProviderRef {}

impl Hash for ProviderRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRef")
            .field("name", &self.0.name())
            .field("type", self.0.type_identifier())
            .field("primary", &self.0.is_primary())
            .field("order", &self.0.order())
            .finish()
    }
}

/// How a [`SimpleProvider`] produces instances.
pub enum ProviderKind {
    /// A pre-built value, shared forever.
    Singleton(Instance),
    /// A factory run once on first use; the result is cached.
    LazySingleton {
        factory: FactoryFn,
        cell: OnceCell<Instance>,
    },
    /// A factory run for every request.
    Multiton(FactoryFn),
}

impl fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Singleton(_) => f.write_str("Singleton"),
            ProviderKind::LazySingleton { cell, .. } => {
                write!(f, "LazySingleton(initialized={})", cell.get().is_some())
            }
            ProviderKind::Multiton(_) => f.write_str("Multiton"),
        }
    }
}

/// Builder-style provider backed by a value or a factory closure.
pub struct SimpleProvider {
    name: String,
    type_identifier: TypeIdentifier,
    wire_types: Vec<TypeIdentifier>,
    casts: Vec<(TypeIdentifier, CastFn)>,
    qualifiers: Vec<Qualifier>,
    primary: bool,
    order: i32,
    condition: Option<Arc<dyn LoadCondition>>,
    scope: Option<ScopeKey>,
    kind: ProviderKind,
}

impl SimpleProvider {
    fn with_kind<T: ?Sized + 'static>(kind: ProviderKind) -> Self {
        let type_identifier = TypeIdentifier::of::<T>();
        Self {
            name: format!("{type_identifier:#}"),
            type_identifier,
            wire_types: Vec::new(),
            casts: Vec::new(),
            qualifiers: Vec::new(),
            primary: false,
            order: 0,
            condition: None,
            scope: None,
            kind,
        }
    }

    /// A pre-built value.
    pub fn singleton<T: Send + Sync + 'static>(value: T) -> Self {
        Self::with_kind::<T>(ProviderKind::Singleton(Arc::new(value)))
    }

    /// A factory called once, on first use.
    pub fn lazy<T: Send + Sync + 'static>(
        factory: impl Fn(&dyn Resolver) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self::with_kind::<T>(ProviderKind::LazySingleton {
            factory: erase(factory),
            cell: OnceCell::new(),
        })
    }

    /// A factory called for every request.
    pub fn multiton<T: Send + Sync + 'static>(
        factory: impl Fn(&dyn Resolver) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self::with_kind::<T>(ProviderKind::Multiton(erase(factory)))
    }

    /// Also supply the instance as `U`, converted by `cast`.
    ///
    /// `T` must be the provider's own type.
    #[must_use]
    pub fn wire_as<T: 'static, U: Send + Sync + 'static>(
        mut self,
        cast: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> Self {
        let target = TypeIdentifier::of::<U>();
        let cast: CastFn = Arc::new(move |instance: &Instance| {
            instance
                .downcast_ref::<T>()
                .map(|value| Arc::new(cast(value)) as Instance)
        });
        self.wire_types.push(target.clone());
        self.casts.push((target, cast));
        self
    }

    /// Also supply the instance, unchanged, under `type_identifier`.
    #[must_use]
    pub fn with_wire_type(mut self, type_identifier: TypeIdentifier) -> Self {
        self.wire_types.push(type_identifier);
        self
    }

    #[must_use]
    pub fn qualified(mut self, qualifier: impl Into<Qualifier>) -> Self {
        self.qualifiers.push(qualifier.into());
        self
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Gate registration on `condition`.
    #[must_use]
    pub fn when(mut self, condition: impl LoadCondition + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    #[must_use]
    pub fn in_scope(mut self, scope: ScopeKey) -> Self {
        self.scope = Some(scope);
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }
}

fn erase<T: Send + Sync + 'static>(
    factory: impl Fn(&dyn Resolver) -> Result<T> + Send + Sync + 'static,
) -> FactoryFn {
    Arc::new(move |resolver: &dyn Resolver| Ok(Arc::new(factory(resolver)?) as Instance))
}

impl IdentifiableProvider for SimpleProvider {
    fn type_identifier(&self) -> &TypeIdentifier {
        &self.type_identifier
    }

    fn additional_wire_types(&self) -> &[TypeIdentifier] {
        &self.wire_types
    }

    fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    fn is_singleton(&self) -> bool {
        !matches!(self.kind, ProviderKind::Multiton(_))
    }

    fn is_primary(&self) -> bool {
        self.primary
    }

    fn condition(&self) -> Option<&dyn LoadCondition> {
        self.condition.as_deref()
    }

    fn scope(&self) -> Option<&ScopeKey> {
        self.scope.as_ref()
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self, resolver: &dyn Resolver) -> Result<Instance> {
        match &self.kind {
            ProviderKind::Singleton(value) => Ok(value.clone()),
            ProviderKind::LazySingleton { factory, cell } => {
                cell.get_or_try_init(|| factory(resolver)).cloned()
            }
            ProviderKind::Multiton(factory) => factory(resolver),
        }
    }

    fn cast(&self, instance: Instance, target: &TypeIdentifier) -> Option<Instance> {
        if target.matches(&self.type_identifier) {
            return Some(instance);
        }
        if let Some((_, cast)) = self.casts.iter().find(|(t, _)| target.matches(t)) {
            return cast(&instance);
        }
        self.wire_types
            .iter()
            .any(|t| target.matches(t))
            .then_some(instance)
    }
}

impl fmt::Debug for SimpleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleProvider")
            .field("name", &self.name)
            .field("type", &self.type_identifier)
            .field("wire_types", &self.wire_types)
            .field("qualifiers", &self.qualifiers)
            .field("primary", &self.primary)
            .field("order", &self.order)
            .field("conditional", &self.condition.is_some())
            .field("scope", &self.scope)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireError;
    use std::sync::atomic::{AtomicU32, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    // Factories in these tests never resolve anything.
    struct NoResolver;
    impl Resolver for NoResolver {
        fn resolve_key(&self, key: &QualifiedTypeIdentifier) -> Result<Instance> {
            Err(WireError::construction(key, "no resolver in unit tests"))
        }
        fn try_resolve_key(&self, _key: &QualifiedTypeIdentifier) -> Result<Option<Instance>> {
            Ok(None)
        }
        fn resolve_all(&self, _type_identifier: &TypeIdentifier) -> Result<Vec<Instance>> {
            Ok(vec![])
        }
    }

    #[test]
    fn lazy_singleton_runs_factory_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = SimpleProvider::lazy({
            let calls = calls.clone();
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7u32)
            }
        });

        let a = provider.instantiate(&NoResolver).unwrap();
        let b = provider.instantiate(&NoResolver).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(provider.is_singleton());
    }

    #[test]
    fn multiton_builds_every_time() {
        let provider = SimpleProvider::multiton(|_| Ok(String::from("x")));
        let a = provider.instantiate(&NoResolver).unwrap();
        let b = provider.instantiate(&NoResolver).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!provider.is_singleton());
    }

    #[test]
    fn wire_as_casts_to_trait_object() {
        let provider = SimpleProvider::singleton(Arc::new(English))
            .wire_as(|e: &Arc<English>| e.clone() as Arc<dyn Greeter>);

        let instance = provider.instantiate(&NoResolver).unwrap();
        let target = TypeIdentifier::of::<Arc<dyn Greeter>>();
        let cast = provider.cast(instance, &target).unwrap();
        let greeter = cast.downcast_ref::<Arc<dyn Greeter>>().unwrap();
        assert_eq!(greeter.greet(), "hello");
    }

    #[test]
    fn cast_rejects_unrelated_types() {
        let provider = SimpleProvider::singleton(1u8);
        let instance = provider.instantiate(&NoResolver).unwrap();
        assert!(provider.cast(instance, &TypeIdentifier::of::<u16>()).is_none());
    }

    #[test]
    fn provider_ref_identity() {
        let a = ProviderRef::new(SimpleProvider::singleton(1u8));
        let b = ProviderRef::new(SimpleProvider::singleton(1u8));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn qualified_key_requires_qualifier() {
        let provider = ProviderRef::new(SimpleProvider::singleton(String::new()).qualified("main"));
        assert!(provider.provides(&QualifiedTypeIdentifier::of::<String>()));
        assert!(provider.provides(&QualifiedTypeIdentifier::qualified::<String>("main")));
        assert!(!provider.provides(&QualifiedTypeIdentifier::qualified::<String>("other")));
    }

    #[test]
    fn raw_key_reaches_parameterized_provider() {
        let provider = ProviderRef::new(SimpleProvider::singleton(vec![1u8]));
        let raw = QualifiedTypeIdentifier::unqualified(TypeIdentifier::just::<Vec<u8>>());
        assert!(provider.provides(&raw));
        assert_eq!(provider.erased_types(), vec![TypeIdentifier::just::<Vec<u8>>()]);
    }
}
