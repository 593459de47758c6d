//! Conflict-aware scope resolution cache.
//!
//! Three indexes answer "which scope serves this type?" without scanning
//! every scope:
//! - `scoped`: erased (optionally qualified) type → scope
//! - `primaries`: erased type → its single primary provider and the scope
//!   it was registered into
//! - `conflicting`: erased types two providers claimed; never cached again
//!
//! All three live behind one lock, so readers never observe a provider in
//! the primary index but not yet in the scoped cache, or the reverse.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::error::{MultiplePrimaryProvidersError, Result, WireError};
use crate::key::QualifiedTypeIdentifier;
use crate::provider::ProviderRef;
use crate::scope::Scope;
use crate::type_id::TypeIdentifier;

#[derive(Default)]
struct CacheState {
    scoped: HashMap<QualifiedTypeIdentifier, Arc<dyn Scope>>,
    primaries: HashMap<TypeIdentifier, (ProviderRef, Arc<dyn Scope>)>,
    conflicting: HashSet<TypeIdentifier>,
}

/// Type → scope index maintained while providers are registered.
#[derive(Default)]
pub struct ScopeRegistryCache {
    state: RwLock<CacheState>,
}

impl ScopeRegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `provider`, owned by `scope`, as the primary provider of
    /// each type it supplies.
    ///
    /// # Errors
    /// [`WireError::MultiplePrimaryProviders`] if any of its erased types
    /// already has a primary provider. Nothing is recorded in that case.
    pub fn register_primary_provider(&self, provider: &ProviderRef, scope: &Arc<dyn Scope>) -> Result<()> {
        let erased = provider.erased_types();
        let mut state = self.state.write();

        for type_identifier in &erased {
            if let Some((existing, _)) = state.primaries.get(type_identifier) {
                if existing == provider {
                    continue;
                }
                return Err(WireError::MultiplePrimaryProviders(MultiplePrimaryProvidersError {
                    type_identifier: type_identifier.clone(),
                    existing: existing.name().to_string(),
                    incoming: provider.name().to_string(),
                }));
            }
        }

        for type_identifier in erased {
            debug!(type_identifier = %type_identifier, provider = provider.name(), "Registered primary provider");
            state.primaries.insert(type_identifier, (provider.clone(), scope.clone()));
        }
        Ok(())
    }

    /// Caches `target_scope` for every key `provider` answers.
    ///
    /// Qualified keys are overwritten freely. An unqualified type claimed a
    /// second time is evicted and blacklisted: lookups for it fall through
    /// to scope-level resolution from then on.
    pub fn update_cache_for_provider(&self, provider: &ProviderRef, target_scope: &Arc<dyn Scope>) {
        let erased = provider.erased_types();
        let mut state = self.state.write();

        for qualifier in provider.qualifiers() {
            for type_identifier in &erased {
                let key = QualifiedTypeIdentifier::new(type_identifier.clone(), Some(qualifier.clone()));
                trace!(key = %key, scope = %target_scope.key(), "Caching qualified key");
                state.scoped.insert(key, target_scope.clone());
            }
        }

        for type_identifier in erased {
            if state.conflicting.contains(&type_identifier) {
                trace!(type_identifier = %type_identifier, "Type is conflicting, not cached");
                continue;
            }

            let key = QualifiedTypeIdentifier::unqualified(type_identifier.clone());
            if state.scoped.remove(&key).is_some() {
                warn!(
                    type_identifier = %type_identifier,
                    provider = provider.name(),
                    "Several providers registered for the same type, lookups will be resolved by scope"
                );
                state.conflicting.insert(type_identifier);
            } else {
                state.scoped.insert(key, target_scope.clone());
            }
        }
    }

    /// Scope serving unqualified lookups of `type_identifier`.
    pub fn determine_scope_of(
        &self,
        type_identifier: &TypeIdentifier,
        default_scope: &Arc<dyn Scope>,
    ) -> Arc<dyn Scope> {
        let state = self.state.read();
        let erased = type_identifier.erasure();

        if let Some((_, scope)) = state.primaries.get(&erased) {
            return scope.clone();
        }

        state
            .scoped
            .get(&QualifiedTypeIdentifier::unqualified(erased))
            .cloned()
            .unwrap_or_else(|| default_scope.clone())
    }

    /// Scope serving `key`: exact qualified entry first, then the primary
    /// provider, then the unqualified resolution.
    pub fn determine_scope_of_qualified(
        &self,
        key: &QualifiedTypeIdentifier,
        default_scope: &Arc<dyn Scope>,
    ) -> Arc<dyn Scope> {
        if key.qualifier().is_none() {
            return self.determine_scope_of(key.type_identifier(), default_scope);
        }

        {
            let state = self.state.read();
            if let Some(scope) = state.scoped.get(&key.erasure()) {
                return scope.clone();
            }
            if let Some((_, scope)) = state.primaries.get(&key.type_identifier().erasure()) {
                return scope.clone();
            }
        }

        self.determine_scope_of(key.type_identifier(), default_scope)
    }

    pub fn primary_provider(&self, type_identifier: &TypeIdentifier) -> Option<ProviderRef> {
        self.state
            .read()
            .primaries
            .get(&type_identifier.erasure())
            .map(|(provider, _)| provider.clone())
    }

    pub fn is_conflicting(&self, type_identifier: &TypeIdentifier) -> bool {
        self.state.read().conflicting.contains(&type_identifier.erasure())
    }

    /// Returns the scope cached for `key`, without any fallback.
    pub fn cached_scope(&self, key: &QualifiedTypeIdentifier) -> Option<Arc<dyn Scope>> {
        self.state.read().scoped.get(&key.erasure()).cloned()
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.scoped.clear();
        state.primaries.clear();
        state.conflicting.clear();
    }
}

impl fmt::Debug for ScopeRegistryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ScopeRegistryCache")
            .field("scoped", &state.scoped.len())
            .field("primaries", &state.primaries.len())
            .field("conflicting", &state.conflicting)
            .finish()
    }
}
