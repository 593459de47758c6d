//! Resolution interface handed to provider factories.
//!
//! Factories receive a `&dyn Resolver` to fetch their own dependencies.
//! It is separated from the container so scopes can hold a weak link to it
//! without a reference cycle.

use std::any::{Any, type_name};
use std::cell::RefCell;
use std::sync::Arc;

use tracing::warn;

use crate::error::{CircularDependencyError, Result, WireError};
use crate::key::{QualifiedTypeIdentifier, Qualifier};
use crate::provider::{ProviderId, ProviderRef};
use crate::type_id::TypeIdentifier;

/// A type-erased instance produced by a provider.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Type alias for factory functions.
///
/// `Arc` and not `Box`: factories are shared between threads and cloned
/// into the providers built from them.
pub type FactoryFn = Arc<dyn Fn(&dyn Resolver) -> Result<Instance> + Send + Sync>;

/// Type-erased lookups, implemented by the container.
pub trait Resolver: Send + Sync {
    /// Resolves exactly one instance for `key`.
    fn resolve_key(&self, key: &QualifiedTypeIdentifier) -> Result<Instance>;

    /// Like [`resolve_key`](Self::resolve_key) but absence is `Ok(None)`.
    fn try_resolve_key(&self, key: &QualifiedTypeIdentifier) -> Result<Option<Instance>>;

    /// Every instance whose provider matches `type_identifier`, by ascending order.
    fn resolve_all(&self, type_identifier: &TypeIdentifier) -> Result<Vec<Instance>>;
}

/// Typed helpers on top of [`Resolver`].
///
/// ```rust,ignore
/// SimpleProvider::lazy(|r| {
///     let db: Arc<Database> = r.get()?;
///     Ok(Arc::new(UserRepository { db }))
/// })
/// ```
pub trait ResolverExt {
    fn get<T: Clone + Send + Sync + 'static>(&self) -> Result<T>;
    fn get_qualified<T: Clone + Send + Sync + 'static>(&self, qualifier: impl Into<Qualifier>) -> Result<T>;
    fn try_get<T: Clone + Send + Sync + 'static>(&self) -> Result<Option<T>>;
    fn get_all<T: Clone + Send + Sync + 'static>(&self) -> Result<Vec<T>>;
}

impl<R: Resolver + ?Sized> ResolverExt for R {
    fn get<T: Clone + Send + Sync + 'static>(&self) -> Result<T> {
        let key = QualifiedTypeIdentifier::of::<T>();
        downcast(self.resolve_key(&key)?, &key)
    }

    fn get_qualified<T: Clone + Send + Sync + 'static>(&self, qualifier: impl Into<Qualifier>) -> Result<T> {
        let key = QualifiedTypeIdentifier::qualified::<T>(qualifier);
        downcast(self.resolve_key(&key)?, &key)
    }

    fn try_get<T: Clone + Send + Sync + 'static>(&self) -> Result<Option<T>> {
        let key = QualifiedTypeIdentifier::of::<T>();
        self.try_resolve_key(&key)?
            .map(|instance| downcast(instance, &key))
            .transpose()
    }

    fn get_all<T: Clone + Send + Sync + 'static>(&self) -> Result<Vec<T>> {
        let key = QualifiedTypeIdentifier::of::<T>();
        self.resolve_all(key.type_identifier())?
            .into_iter()
            .map(|instance| downcast(instance, &key))
            .collect()
    }
}

/// Clones a `T` out of a type-erased instance.
pub fn downcast<T: Clone + 'static>(instance: Instance, key: &QualifiedTypeIdentifier) -> Result<T> {
    instance
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| WireError::TypeMismatch {
            requested: format!("{key} as {}", type_name::<T>()),
            provider: key.type_identifier().to_string(),
        })
}

thread_local! {
    static RESOLVING: RefCell<Vec<(ProviderId, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a provider as "under construction" on the current thread.
///
/// Entering a provider already on the stack is a cycle. Dropping the guard
/// pops the provider again.
pub(crate) struct ResolutionGuard {
    id: ProviderId,
}

impl ResolutionGuard {
    pub(crate) fn enter(provider: &ProviderRef) -> Result<Self> {
        let id = provider.id();
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack.iter().position(|(entry, _)| *entry == id) {
                let mut chain: Vec<String> = stack[start..].iter().map(|(_, name)| name.clone()).collect();
                chain.push(provider.name().to_string());
                warn!(cycle = ?chain, "Circular dependency detected");
                return Err(WireError::CircularDependency(CircularDependencyError { chain }));
            }
            stack.push((id, provider.name().to_string()));
            Ok(Self { id })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|(entry, _)| *entry == self.id) {
                stack.truncate(pos);
            }
        });
    }
}
