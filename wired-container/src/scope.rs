//! Scopes: partitions governing instance lifetime.
//!
//! - [`SingletonScope`]: the default; singleton providers are built once
//! - [`PrototypeScope`]: a new instance on every request
//! - [`ThreadLocalScope`]: one instance per thread, dropped on `finish()`
//! - [`CompositeScope`]: an ordered list of child scopes, typically
//!   `[specific, default]`
//!
//! Every scope stores its providers in a [`ProviderStore`] indexed by erased
//! type. Scopes are linked to their container through a weak [`Resolver`]
//! reference that factories use for their own dependencies.

use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{AmbiguousProvidersError, NotFoundError, Result, WireError};
use crate::key::QualifiedTypeIdentifier;
use crate::provider::{ProviderId, ProviderRef};
use crate::resolver::{Instance, ResolutionGuard, Resolver};
use crate::type_id::TypeIdentifier;

/// Selects the scope a provider is registered into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// The container's default scope.
    Singleton,
    /// New instance per request.
    Prototype,
    /// One instance per thread.
    ThreadLocal,
    /// A custom scope created by a registered factory.
    Named(Arc<str>),
}

impl ScopeKey {
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        ScopeKey::Named(name.into())
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Singleton => write!(f, "singleton"),
            ScopeKey::Prototype => write!(f, "prototype"),
            ScopeKey::ThreadLocal => write!(f, "thread-local"),
            ScopeKey::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Registered providers of one scope.
pub trait Scope: Send + Sync {
    fn key(&self) -> &ScopeKey;

    fn register(&self, provider: ProviderRef) -> Result<()>;

    /// Every provider able to supply `key`, by ascending order.
    fn providers_for(&self, key: &QualifiedTypeIdentifier) -> Vec<ProviderRef>;

    fn contains_provider(&self, provider: &ProviderRef) -> bool;

    /// Every provider registered here, in registration order.
    fn providers(&self) -> Vec<ProviderRef>;

    /// Returns (or creates, following this scope's lifetime rules) the
    /// instance of `provider`, viewed as `target`.
    fn instance_of(&self, provider: &ProviderRef, target: &TypeIdentifier) -> Result<Instance>;

    /// Connects the scope to the container whose resolver factories receive.
    fn link(&self, resolver: Weak<dyn Resolver>);

    fn start(&self) {}

    /// Ends the scope's lifetime: cached instances are dropped.
    fn finish(&self) {}

    fn contains(&self, key: &QualifiedTypeIdentifier) -> bool {
        !self.providers_for(key).is_empty()
    }

    /// Returns `true` if some provider supplies a type assignable to `type_identifier`.
    fn can_supply(&self, type_identifier: &TypeIdentifier) -> bool {
        self.providers_for(&QualifiedTypeIdentifier::unqualified(type_identifier.erasure()))
            .iter()
            .any(|p| p.types().any(|t| type_identifier.is_assignable_from(t)))
    }

    fn try_get(&self, key: &QualifiedTypeIdentifier) -> Result<Option<Instance>> {
        match select_provider(key, self.providers_for(key))? {
            Some(provider) => self.instance_of(&provider, key.type_identifier()).map(Some),
            None => Ok(None),
        }
    }

    fn get(&self, key: &QualifiedTypeIdentifier) -> Result<Instance> {
        self.try_get(key)?.ok_or_else(|| {
            WireError::NotFound(NotFoundError {
                requested: key.clone(),
                suggestions: vec![],
            })
        })
    }

    /// Instances of every matching provider, by ascending order.
    fn get_all(&self, type_identifier: &TypeIdentifier) -> Result<Vec<Instance>> {
        self.providers_for(&QualifiedTypeIdentifier::unqualified(type_identifier.clone()))
            .iter()
            .map(|provider| self.instance_of(provider, type_identifier))
            .collect()
    }
}

/// Picks the provider answering a single-instance lookup.
///
/// One candidate wins outright; among several, a single primary wins;
/// anything else is ambiguous.
pub fn select_provider(
    key: &QualifiedTypeIdentifier,
    candidates: Vec<ProviderRef>,
) -> Result<Option<ProviderRef>> {
    if candidates.len() <= 1 {
        return Ok(candidates.into_iter().next());
    }

    let mut primaries = candidates.iter().filter(|p| p.is_primary());
    if let (Some(primary), None) = (primaries.next(), primaries.next()) {
        trace!(key = %key, provider = primary.name(), "Primary provider wins");
        return Ok(Some(primary.clone()));
    }

    Err(WireError::AmbiguousProviders(AmbiguousProvidersError {
        requested: key.clone(),
        candidates: candidates.iter().map(|p| p.name().to_string()).collect(),
    }))
}

/// Providers of one scope, indexed by erased type.
#[derive(Default)]
pub struct ProviderStore {
    by_type: DashMap<TypeIdentifier, Vec<ProviderRef>>,
    all: RwLock<Vec<ProviderRef>>,
}

impl ProviderStore {
    /// Adds `provider`; returns `false` if it was already present.
    pub fn insert(&self, provider: ProviderRef) -> bool {
        {
            let mut all = self.all.write();
            if all.contains(&provider) {
                return false;
            }
            all.push(provider.clone());
        }
        for erased in provider.erased_types() {
            self.by_type.entry(erased).or_default().push(provider.clone());
        }
        true
    }

    pub fn candidates(&self, key: &QualifiedTypeIdentifier) -> Vec<ProviderRef> {
        let mut found: Vec<ProviderRef> = self
            .by_type
            .get(&key.type_identifier().erasure())
            .map(|entry| entry.iter().filter(|p| p.provides(key)).cloned().collect())
            .unwrap_or_default();
        found.sort_by_key(|p| p.order());
        found
    }

    pub fn contains(&self, provider: &ProviderRef) -> bool {
        self.all.read().contains(provider)
    }

    pub fn providers(&self) -> Vec<ProviderRef> {
        self.all.read().clone()
    }

    pub fn len(&self) -> usize {
        self.all.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.read().is_empty()
    }

    pub fn clear(&self) {
        self.all.write().clear();
        self.by_type.clear();
    }
}

/// State shared by the leaf scopes.
struct ScopeCore {
    key: ScopeKey,
    store: ProviderStore,
    resolver: RwLock<Option<Weak<dyn Resolver>>>,
}

impl ScopeCore {
    fn new(key: ScopeKey) -> Self {
        Self {
            key,
            store: ProviderStore::default(),
            resolver: RwLock::new(None),
        }
    }

    fn register(&self, provider: ProviderRef) {
        if self.store.insert(provider.clone()) {
            debug!(scope = %self.key, provider = provider.name(), "Registered provider");
        } else {
            trace!(scope = %self.key, provider = provider.name(), "Provider already registered");
        }
    }

    fn resolver(&self) -> Result<Arc<dyn Resolver>> {
        self.resolver
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| WireError::ScopeNotLinked {
                scope: self.key.clone(),
            })
    }

    fn link(&self, resolver: Weak<dyn Resolver>) {
        *self.resolver.write() = Some(resolver);
    }

    /// Builds a fresh instance under the cycle guard.
    fn create(&self, provider: &ProviderRef) -> Result<Instance> {
        let _guard = ResolutionGuard::enter(provider)?;
        self.build(provider)
    }

    /// Callers must hold the provider's [`ResolutionGuard`].
    fn build(&self, provider: &ProviderRef) -> Result<Instance> {
        let resolver = self.resolver()?;
        trace!(scope = %self.key, provider = provider.name(), "Creating instance");
        provider.instantiate(resolver.as_ref())
    }
}

fn view_as(provider: &ProviderRef, instance: Instance, target: &TypeIdentifier) -> Result<Instance> {
    provider
        .cast(instance, target)
        .ok_or_else(|| WireError::TypeMismatch {
            requested: target.to_string(),
            provider: provider.name().to_string(),
        })
}

macro_rules! delegate_to_core {
    () => {
        fn key(&self) -> &ScopeKey {
            &self.core.key
        }

        fn register(&self, provider: ProviderRef) -> Result<()> {
            self.core.register(provider);
            Ok(())
        }

        fn providers_for(&self, key: &QualifiedTypeIdentifier) -> Vec<ProviderRef> {
            self.core.store.candidates(key)
        }

        fn contains_provider(&self, provider: &ProviderRef) -> bool {
            self.core.store.contains(provider)
        }

        fn providers(&self) -> Vec<ProviderRef> {
            self.core.store.providers()
        }

        fn link(&self, resolver: Weak<dyn Resolver>) {
            self.core.link(resolver);
        }
    };
}

/// The default scope: singleton providers produce one cached instance.
pub struct SingletonScope {
    core: ScopeCore,
    instances: DashMap<ProviderId, Arc<OnceCell<Instance>>>,
}

impl SingletonScope {
    pub fn new() -> Self {
        Self::with_key(ScopeKey::Singleton)
    }

    pub fn with_key(key: ScopeKey) -> Self {
        Self {
            core: ScopeCore::new(key),
            instances: DashMap::new(),
        }
    }
}

impl Default for SingletonScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope for SingletonScope {
    delegate_to_core!();

    fn instance_of(&self, provider: &ProviderRef, target: &TypeIdentifier) -> Result<Instance> {
        if !provider.is_singleton() {
            return view_as(provider, self.core.create(provider)?, target);
        }

        // Clone the cell out so the shard lock is not held during construction.
        let cell = self
            .instances
            .entry(provider.id())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        // The guard is entered before the cell: re-entering an initializing
        // cell on the same thread would block forever.
        let instance = match cell.get() {
            Some(instance) => instance.clone(),
            None => {
                let _guard = ResolutionGuard::enter(provider)?;
                cell.get_or_try_init(|| self.core.build(provider))?.clone()
            }
        };
        view_as(provider, instance, target)
    }

    fn finish(&self) {
        debug!(scope = %self.core.key, cached = self.instances.len(), "Finishing scope");
        self.instances.clear();
        self.core.store.clear();
    }
}

/// Every request creates a new instance.
pub struct PrototypeScope {
    core: ScopeCore,
}

impl PrototypeScope {
    pub fn new() -> Self {
        Self {
            core: ScopeCore::new(ScopeKey::Prototype),
        }
    }
}

impl Default for PrototypeScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope for PrototypeScope {
    delegate_to_core!();

    fn instance_of(&self, provider: &ProviderRef, target: &TypeIdentifier) -> Result<Instance> {
        view_as(provider, self.core.create(provider)?, target)
    }

    fn finish(&self) {
        self.core.store.clear();
    }
}

/// One instance per thread and provider.
///
/// Use multiton providers here: a lazy singleton provider caches its
/// instance itself and would hand the same one to every thread.
pub struct ThreadLocalScope {
    core: ScopeCore,
    instances: DashMap<(ThreadId, ProviderId), Instance>,
}

impl ThreadLocalScope {
    pub fn new() -> Self {
        Self {
            core: ScopeCore::new(ScopeKey::ThreadLocal),
            instances: DashMap::new(),
        }
    }

    /// Drops the instances owned by the calling thread.
    pub fn clear_current_thread(&self) {
        let current = std::thread::current().id();
        self.instances.retain(|(thread, _), _| *thread != current);
    }
}

impl Default for ThreadLocalScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope for ThreadLocalScope {
    delegate_to_core!();

    fn instance_of(&self, provider: &ProviderRef, target: &TypeIdentifier) -> Result<Instance> {
        let slot = (std::thread::current().id(), provider.id());
        if let Some(existing) = self.instances.get(&slot) {
            return view_as(provider, existing.clone(), target);
        }

        // Only this thread writes its own slots, so no race between check and insert.
        let created = self.core.create(provider)?;
        self.instances.insert(slot, created.clone());
        view_as(provider, created, target)
    }

    fn finish(&self) {
        debug!(scope = %self.core.key, cached = self.instances.len(), "Finishing scope");
        self.instances.clear();
        self.core.store.clear();
    }
}

/// Delegates to an ordered list of child scopes.
///
/// Registration goes to the first child; lookups consult every child in
/// order, so `[specific, default]` answers `get_all` with both.
pub struct CompositeScope {
    key: ScopeKey,
    children: Vec<Arc<dyn Scope>>,
}

impl CompositeScope {
    pub fn new(key: ScopeKey, children: Vec<Arc<dyn Scope>>) -> Self {
        Self { key, children }
    }

    /// The child a provider was registered into.
    pub fn primary_child(&self) -> Option<&Arc<dyn Scope>> {
        self.children.first()
    }

    fn owner_of(&self, provider: &ProviderRef) -> Option<&Arc<dyn Scope>> {
        self.children.iter().find(|child| child.contains_provider(provider))
    }
}

impl Scope for CompositeScope {
    fn key(&self) -> &ScopeKey {
        &self.key
    }

    fn register(&self, provider: ProviderRef) -> Result<()> {
        match self.children.first() {
            Some(child) => child.register(provider),
            None => Err(WireError::UnknownScope {
                key: self.key.clone(),
            }),
        }
    }

    fn providers_for(&self, key: &QualifiedTypeIdentifier) -> Vec<ProviderRef> {
        let mut found: Vec<ProviderRef> = Vec::new();
        for child in &self.children {
            for provider in child.providers_for(key) {
                if !found.contains(&provider) {
                    found.push(provider);
                }
            }
        }
        found.sort_by_key(|p| p.order());
        found
    }

    fn contains_provider(&self, provider: &ProviderRef) -> bool {
        self.owner_of(provider).is_some()
    }

    fn providers(&self) -> Vec<ProviderRef> {
        let mut all: Vec<ProviderRef> = Vec::new();
        for provider in self.children.iter().flat_map(|child| child.providers()) {
            if !all.contains(&provider) {
                all.push(provider);
            }
        }
        all
    }

    fn instance_of(&self, provider: &ProviderRef, target: &TypeIdentifier) -> Result<Instance> {
        match self.owner_of(provider) {
            Some(child) => child.instance_of(provider, target),
            None => Err(WireError::NotFound(NotFoundError {
                requested: QualifiedTypeIdentifier::unqualified(target.clone()),
                suggestions: vec![],
            })),
        }
    }

    fn link(&self, resolver: Weak<dyn Resolver>) {
        for child in &self.children {
            child.link(resolver.clone());
        }
    }

    fn start(&self) {
        if let Some(child) = self.children.first() {
            child.start();
        }
    }

    /// Only the first child is owned; later children (the default scope)
    /// are finished by whoever owns them.
    fn finish(&self) {
        if let Some(child) = self.children.first() {
            child.finish();
        }
    }
}
