//! Scope registry: owns every scope of a container.
//!
//! The registry decides which scope a provider is registered into, keeps
//! the [`ScopeRegistryCache`] in step with registrations, and answers
//! lookups by asking the cache which scope serves a key.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use wired_support::rendering::suggest_similar;

use crate::cache::ScopeRegistryCache;
use crate::error::{NotFoundError, Result, WireError};
use crate::key::QualifiedTypeIdentifier;
use crate::provider::ProviderRef;
use crate::resolver::{Instance, Resolver};
use crate::scope::{
    select_provider, CompositeScope, PrototypeScope, Scope, ScopeKey, SingletonScope, ThreadLocalScope,
};
use crate::type_id::TypeIdentifier;

/// Creates the leaf scope for a named [`ScopeKey`].
pub type ScopeFactory = Arc<dyn Fn(&ScopeKey) -> Arc<dyn Scope> + Send + Sync>;

/// Registry of the scopes of one container.
pub struct ScopeRegistry {
    default_scope: RwLock<Arc<dyn Scope>>,
    scopes: RwLock<HashMap<ScopeKey, Arc<dyn Scope>>>,
    factories: RwLock<HashMap<ScopeKey, ScopeFactory>>,
    cache: ScopeRegistryCache,
    resolver: RwLock<Option<Weak<dyn Resolver>>>,
    /// Serializes registrations: primary index, scope and cache change together.
    write: Mutex<()>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self {
            default_scope: RwLock::new(Arc::new(SingletonScope::new())),
            scopes: RwLock::new(HashMap::new()),
            factories: RwLock::new(HashMap::new()),
            cache: ScopeRegistryCache::new(),
            resolver: RwLock::new(None),
            write: Mutex::new(()),
        }
    }

    /// Makes `key` available to providers; the scope is created on first use.
    pub fn register_scope_factory(&self, key: ScopeKey, factory: ScopeFactory) {
        debug!(scope = %key, "Registered scope factory");
        self.factories.write().insert(key, factory);
    }

    pub fn default_scope(&self) -> Arc<dyn Scope> {
        self.default_scope.read().clone()
    }

    pub fn cache(&self) -> &ScopeRegistryCache {
        &self.cache
    }

    /// Links every current and future scope to `resolver`.
    pub fn link(&self, resolver: Weak<dyn Resolver>) {
        self.default_scope().link(resolver.clone());
        for scope in self.scopes.read().values() {
            scope.link(resolver.clone());
        }
        *self.resolver.write() = Some(resolver);
    }

    /// The scope answering for `key`, created on demand.
    ///
    /// Non-default scopes are wrapped as `[specific, default]`.
    ///
    /// # Errors
    /// [`WireError::UnknownScope`] for a named scope without a factory.
    pub fn scope_for(&self, key: Option<&ScopeKey>) -> Result<Arc<dyn Scope>> {
        let key = match key {
            None | Some(ScopeKey::Singleton) => return Ok(self.default_scope()),
            Some(key) => key,
        };

        if let Some(scope) = self.scopes.read().get(key) {
            return Ok(scope.clone());
        }

        let mut scopes = self.scopes.write();
        if let Some(scope) = scopes.get(key) {
            return Ok(scope.clone());
        }

        let specific: Arc<dyn Scope> = match key {
            ScopeKey::Prototype => Arc::new(PrototypeScope::new()),
            ScopeKey::ThreadLocal => Arc::new(ThreadLocalScope::new()),
            ScopeKey::Named(_) | ScopeKey::Singleton => {
                let factory = self
                    .factories
                    .read()
                    .get(key)
                    .cloned()
                    .ok_or_else(|| WireError::UnknownScope { key: key.clone() })?;
                factory(key)
            }
        };

        let scope: Arc<dyn Scope> = Arc::new(CompositeScope::new(
            key.clone(),
            vec![specific, self.default_scope()],
        ));
        if let Some(resolver) = self.resolver.read().clone() {
            scope.link(resolver);
        }
        scope.start();
        debug!(scope = %key, "Created scope");
        scopes.insert(key.clone(), scope.clone());
        Ok(scope)
    }

    /// Registers `provider` into `scope` and updates the cache.
    ///
    /// # Errors
    /// [`WireError::MultiplePrimaryProviders`] before anything is changed,
    /// or whatever the scope reports.
    pub fn register(&self, provider: &ProviderRef, scope: &Arc<dyn Scope>) -> Result<()> {
        let _write = self.write.lock();
        if provider.is_primary() {
            self.cache.register_primary_provider(provider, scope)?;
        }
        scope.register(provider.clone())?;
        self.cache.update_cache_for_provider(provider, scope);
        Ok(())
    }

    /// Every scope, default first.
    pub fn all_scopes(&self) -> Vec<Arc<dyn Scope>> {
        let mut all = vec![self.default_scope()];
        all.extend(self.scopes.read().values().cloned());
        all
    }

    /// The scope serving `key`.
    ///
    /// The cache answers first. If the cached scope cannot supply the key
    /// (a provider living in another scope), every scope is searched.
    pub fn determine_scope(&self, key: &QualifiedTypeIdentifier) -> Arc<dyn Scope> {
        let default = self.default_scope();
        let scope = self.cache.determine_scope_of_qualified(key, &default);

        if scope.contains(key) {
            return scope;
        }

        trace!(key = %key, "Cache miss, searching every scope");
        self.scopes
            .read()
            .values()
            .find(|candidate| candidate.contains(key))
            .cloned()
            .unwrap_or(scope)
    }

    pub fn contains(&self, key: &QualifiedTypeIdentifier) -> bool {
        self.determine_scope(key).contains(key)
    }

    /// Instance for `key`, or `None` if no provider supplies it.
    ///
    /// Conflicting unqualified types without a primary provider are
    /// resolved over the providers of every scope, so a conflict spanning
    /// two scopes is still reported as ambiguous.
    pub fn try_get(&self, key: &QualifiedTypeIdentifier) -> Result<Option<Instance>> {
        let spans_scopes = key.qualifier().is_none()
            && self.cache.is_conflicting(key.type_identifier())
            && self.cache.primary_provider(key.type_identifier()).is_none();
        if !spans_scopes {
            return self.determine_scope(key).try_get(key);
        }

        let found = self.candidates(key);
        let providers = found.iter().map(|(provider, _)| provider.clone()).collect();
        match select_provider(key, providers)? {
            Some(chosen) => {
                let scope = found
                    .iter()
                    .find(|(provider, _)| *provider == chosen)
                    .map(|(_, scope)| scope.clone())
                    .unwrap_or_else(|| self.default_scope());
                scope.instance_of(&chosen, key.type_identifier()).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn get(&self, key: &QualifiedTypeIdentifier) -> Result<Instance> {
        self.try_get(key)?.ok_or_else(|| {
            WireError::NotFound(NotFoundError {
                requested: key.clone(),
                suggestions: self.suggestions_for(key.type_identifier()),
            })
        })
    }

    /// Instances of every provider matching `type_identifier`, across all
    /// scopes, by ascending order.
    pub fn get_all(&self, type_identifier: &TypeIdentifier) -> Result<Vec<Instance>> {
        let key = QualifiedTypeIdentifier::unqualified(type_identifier.clone());
        self.candidates(&key)
            .iter()
            .map(|(provider, scope)| scope.instance_of(provider, type_identifier))
            .collect()
    }

    /// Every registered provider with the scope that owns it.
    pub fn registered_providers(&self) -> Vec<(ProviderRef, Arc<dyn Scope>)> {
        let mut found: Vec<(ProviderRef, Arc<dyn Scope>)> = Vec::new();
        for scope in self.all_scopes() {
            for provider in scope.providers() {
                if !found.iter().any(|(p, _)| *p == provider) {
                    found.push((provider, scope.clone()));
                }
            }
        }
        found
    }

    /// Finishes every scope and forgets all registrations.
    pub fn clear(&self) {
        let _write = self.write.lock();
        let scopes: Vec<Arc<dyn Scope>> = self.scopes.write().drain().map(|(_, s)| s).collect();
        for scope in scopes {
            scope.finish();
        }

        let fresh: Arc<dyn Scope> = Arc::new(SingletonScope::new());
        if let Some(resolver) = self.resolver.read().clone() {
            fresh.link(resolver);
        }
        let old = std::mem::replace(&mut *self.default_scope.write(), fresh);
        old.finish();
        self.cache.clear();
        debug!("Scope registry cleared");
    }

    /// Matching providers of every scope, deduplicated, by ascending order.
    fn candidates(&self, key: &QualifiedTypeIdentifier) -> Vec<(ProviderRef, Arc<dyn Scope>)> {
        let mut found: Vec<(ProviderRef, Arc<dyn Scope>)> = Vec::new();
        for scope in self.all_scopes() {
            for provider in scope.providers_for(key) {
                if !found.iter().any(|(p, _)| *p == provider) {
                    found.push((provider, scope.clone()));
                }
            }
        }
        found.sort_by_key(|(provider, _)| provider.order());
        found
    }

    fn suggestions_for(&self, requested: &TypeIdentifier) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (provider, _) in self.registered_providers() {
            for type_identifier in provider.types() {
                let name = type_identifier.to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        suggest_similar(&requested.to_string(), &names, 3)
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("scopes", &self.scopes.read().keys().collect::<Vec<_>>())
            .field("cache", &self.cache)
            .finish()
    }
}
