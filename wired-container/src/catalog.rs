//! Bookkeeping for one load pass.
//!
//! Each provider handed to the initializer ends up in exactly one of three
//! places: registered, still conditional, or errored.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::error;

use crate::error::{ProviderErrors, ProviderFailure, WireError};
use crate::provider::ProviderRef;
use crate::scope::Scope;

/// A conditional provider waiting for its condition, with the scope it
/// will be registered into.
#[derive(Clone)]
pub struct PendingProvider {
    pub provider: ProviderRef,
    pub scope: Arc<dyn Scope>,
}

#[derive(Default)]
pub struct ProviderCatalog {
    registered: Vec<ProviderRef>,
    conditional: Vec<PendingProvider>,
    errors: HashMap<ProviderRef, Vec<WireError>>,
    /// Errored providers in the order their first error was noted.
    errored: Vec<ProviderRef>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defers `provider` until its condition matches.
    pub fn add_conditional_provider(&mut self, provider: ProviderRef, scope: Arc<dyn Scope>) {
        self.conditional.push(PendingProvider { provider, scope });
    }

    pub fn add_successfully_registered_provider(&mut self, provider: ProviderRef) {
        self.remove_conditional(&provider);
        if !self.registered.contains(&provider) {
            self.registered.push(provider);
        }
    }

    /// Records a failed registration; the provider leaves the conditional list.
    pub fn note_error(&mut self, provider: &ProviderRef, error: WireError) {
        self.remove_conditional(provider);
        let errors = self.errors.entry(provider.clone()).or_default();
        if errors.is_empty() {
            self.errored.push(provider.clone());
        }
        errors.push(error);
    }

    pub fn registered(&self) -> &[ProviderRef] {
        &self.registered
    }

    pub fn conditional(&self) -> &[PendingProvider] {
        &self.conditional
    }

    /// Takes the pending providers out for one convergence round.
    pub fn take_conditional(&mut self) -> Vec<PendingProvider> {
        std::mem::take(&mut self.conditional)
    }

    /// Puts providers that did not match back for the next round.
    pub fn restore_conditional(&mut self, pending: Vec<PendingProvider>) {
        self.conditional.extend(pending);
    }

    /// Providers with at least one error, in the order they first failed.
    pub fn errored(&self) -> &[ProviderRef] {
        &self.errored
    }

    pub fn errors_of(&self, provider: &ProviderRef) -> &[WireError] {
        self.errors.get(provider).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errored.is_empty()
    }

    /// Logs every collected failure.
    pub fn print_errors(&self) {
        for provider in &self.errored {
            for cause in self.errors_of(provider) {
                error!(provider = provider.name(), error = %cause, "Provider failed to register");
            }
        }
    }

    /// Drains the collected failures into one aggregate error.
    pub fn take_errors(&mut self) -> ProviderErrors {
        let failures = std::mem::take(&mut self.errored)
            .into_iter()
            .map(|provider| ProviderFailure {
                provider: provider.name().to_string(),
                errors: self.errors.remove(&provider).unwrap_or_default(),
            })
            .collect();
        ProviderErrors { failures }
    }

    fn remove_conditional(&mut self, provider: &ProviderRef) {
        self.conditional.retain(|pending| pending.provider != *provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimpleProvider;
    use crate::scope::SingletonScope;

    fn scope() -> Arc<dyn Scope> {
        Arc::new(SingletonScope::new())
    }

    fn failure(name: &str) -> WireError {
        WireError::construction(name, "boom")
    }

    #[test]
    fn registered_provider_leaves_conditional_list() {
        let mut catalog = ProviderCatalog::new();
        let provider = ProviderRef::new(SimpleProvider::singleton(1u8));

        catalog.add_conditional_provider(provider.clone(), scope());
        assert_eq!(catalog.conditional().len(), 1);

        catalog.add_successfully_registered_provider(provider.clone());
        assert!(catalog.conditional().is_empty());
        assert_eq!(catalog.registered(), &[provider]);
    }

    #[test]
    fn errors_accumulate_per_provider() {
        let mut catalog = ProviderCatalog::new();
        let a = ProviderRef::new(SimpleProvider::singleton(1u8).named("a"));
        let b = ProviderRef::new(SimpleProvider::singleton(2u8).named("b"));

        catalog.add_conditional_provider(a.clone(), scope());
        catalog.note_error(&a, failure("a"));
        catalog.note_error(&b, failure("b"));
        catalog.note_error(&a, failure("a"));

        assert!(catalog.has_errors());
        assert!(catalog.conditional().is_empty());
        assert_eq!(catalog.errors_of(&a).len(), 2);

        let errors = catalog.take_errors();
        let names: Vec<&str> = errors.failures.iter().map(|f| f.provider.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(errors.causes().count(), 3);
        assert!(!catalog.has_errors());
    }

    #[test]
    fn take_and_restore_conditional() {
        let mut catalog = ProviderCatalog::new();
        catalog.add_conditional_provider(ProviderRef::new(SimpleProvider::singleton(1u8)), scope());
        catalog.add_conditional_provider(ProviderRef::new(SimpleProvider::singleton(2u8)), scope());

        let pending = catalog.take_conditional();
        assert_eq!(pending.len(), 2);
        assert!(catalog.conditional().is_empty());

        catalog.restore_conditional(pending);
        assert_eq!(catalog.conditional().len(), 2);
    }
}
