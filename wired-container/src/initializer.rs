//! Load pass: unconditional registration, then the convergence loop.
//!
//! ```text
//! providers ──partition──> unconditional ──register──> registry
//!                 │
//!                 └──────> conditional ──round 1..n──> registry
//! ```
//!
//! Each round tests the pending conditional providers by ascending order.
//! A round that registers nothing ends the loop; providers still pending
//! then are simply left out of the container.

use tracing::{debug, info, instrument, trace, warn};

use crate::catalog::{PendingProvider, ProviderCatalog};
use crate::condition::{ConditionContext, ContainerState};
use crate::environment::Environment;
use crate::error::{Result, WireError};
use crate::key::QualifiedTypeIdentifier;
use crate::provider::ProviderRef;
use crate::registry::ScopeRegistry;
use crate::report::{ConditionEvaluation, ConditionEvaluationReport};
use crate::settings::WireSettings;

/// What conditions observe during a load.
pub struct LoadState<'a> {
    registry: &'a ScopeRegistry,
    environment: &'a dyn Environment,
}

impl<'a> LoadState<'a> {
    pub fn new(registry: &'a ScopeRegistry, environment: &'a dyn Environment) -> Self {
        Self { registry, environment }
    }
}

impl ContainerState for LoadState<'_> {
    fn environment(&self) -> &dyn Environment {
        self.environment
    }

    fn contains(&self, key: &QualifiedTypeIdentifier) -> bool {
        self.registry.contains(key)
    }
}

/// Runs one load pass against a [`ScopeRegistry`].
pub struct ContainerInitializer<'a> {
    registry: &'a ScopeRegistry,
    environment: &'a dyn Environment,
    settings: &'a WireSettings,
}

impl<'a> ContainerInitializer<'a> {
    pub fn new(
        registry: &'a ScopeRegistry,
        environment: &'a dyn Environment,
        settings: &'a WireSettings,
    ) -> Self {
        Self {
            registry,
            environment,
            settings,
        }
    }

    /// Registers `providers` and converges the conditional ones.
    ///
    /// # Errors
    /// - [`WireError::MultiplePrimaryProviders`] as soon as it happens
    /// - [`WireError::LoadFailed`] listing every unconditional provider
    ///   that failed to register
    #[instrument(skip_all, name = "container_load", fields(providers = providers.len()))]
    pub fn load(&self, providers: Vec<ProviderRef>) -> Result<ConditionEvaluationReport> {
        let mut catalog = ProviderCatalog::new();
        let mut report = ConditionEvaluationReport {
            provider_count: providers.len(),
            ..Default::default()
        };

        for provider in providers {
            let scope = match self.registry.scope_for(provider.scope()) {
                Ok(scope) => scope,
                Err(err) => {
                    catalog.note_error(&provider, err);
                    continue;
                }
            };

            if provider.is_conditional() {
                report.conditional += 1;
                catalog.add_conditional_provider(provider, scope);
                continue;
            }

            report.unconditional += 1;
            match self.registry.register(&provider, &scope) {
                Ok(()) => catalog.add_successfully_registered_provider(provider),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => catalog.note_error(&provider, err),
            }
        }

        if catalog.has_errors() {
            catalog.print_errors();
            return Err(WireError::LoadFailed(catalog.take_errors()));
        }

        self.converge(&mut catalog, &mut report)?;

        report.failures = catalog.errored().iter().map(|p| p.name().to_string()).collect();
        report.unmatched = catalog
            .conditional()
            .iter()
            .map(|pending| pending.provider.name().to_string())
            .collect();
        if catalog.has_errors() {
            catalog.print_errors();
        }

        info!(
            registered = catalog.registered().len(),
            applied = report.applied,
            rounds = report.rounds,
            unmatched = report.unmatched.len(),
            "Providers loaded"
        );
        Ok(report)
    }

    /// Evaluates the condition of `provider` and registers it if it matches.
    ///
    /// Returns `false` when the condition did not match.
    pub fn announce(&self, provider: &ProviderRef) -> Result<bool> {
        let evaluation = self.evaluate(provider, 0);
        if !evaluation.matched {
            debug!(provider = provider.name(), negative = ?evaluation.negative, "Announced provider rejected");
            return Ok(false);
        }

        let scope = self.registry.scope_for(provider.scope())?;
        self.registry.register(provider, &scope)?;
        debug!(provider = provider.name(), scope = %scope.key(), "Announced provider registered");
        Ok(true)
    }

    fn converge(&self, catalog: &mut ProviderCatalog, report: &mut ConditionEvaluationReport) -> Result<()> {
        let threshold = self.settings.conditional_rounds_threshold;
        let mut warned = false;

        loop {
            let mut pending = catalog.take_conditional();
            if pending.is_empty() {
                break;
            }

            report.rounds += 1;
            let round = report.rounds;
            if round > threshold && !warned {
                warn!(
                    rounds = round,
                    threshold,
                    pending = pending.len(),
                    "Conditional providers need more rounds than expected"
                );
                warned = true;
            }

            // Stable: equal orders keep encounter order.
            pending.sort_by_key(|entry| entry.provider.order());

            let mut any_applied = false;
            let mut unmatched: Vec<PendingProvider> = Vec::new();
            for entry in pending {
                let evaluation = self.evaluate(&entry.provider, round);
                let matched = evaluation.matched;
                report.evaluations.push(evaluation);

                if !matched {
                    unmatched.push(entry);
                    continue;
                }

                match self.registry.register(&entry.provider, &entry.scope) {
                    Ok(()) => {
                        debug!(provider = entry.provider.name(), round, "Conditional provider applied");
                        catalog.add_successfully_registered_provider(entry.provider);
                        report.applied += 1;
                        any_applied = true;
                    }
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        warn!(provider = entry.provider.name(), error = %err, "Conditional provider failed to register");
                        catalog.note_error(&entry.provider, err);
                    }
                }
            }

            catalog.restore_conditional(unmatched);
            if !any_applied {
                trace!(round, pending = catalog.conditional().len(), "No progress, convergence stops");
                break;
            }
        }
        Ok(())
    }

    fn evaluate(&self, provider: &ProviderRef, round: usize) -> ConditionEvaluation {
        let state = LoadState::new(self.registry, self.environment);
        let mut context = ConditionContext::new(&state);
        if let Some(condition) = provider.condition() {
            condition.test(&mut context);
        }

        ConditionEvaluation {
            provider: provider.name().to_string(),
            round,
            matched: context.is_matched(),
            positive: context.positive_matches().to_vec(),
            negative: context.negative_matches().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::condition::{OnProperty, OnTypePresent, condition_fn};
    use crate::environment::MapEnvironment;
    use crate::error::NotFoundError;
    use crate::provider::SimpleProvider;
    use crate::resolver::{Instance, Resolver};
    use crate::scope::ScopeKey;
    use crate::type_id::TypeIdentifier;

    struct Detached;

    impl Resolver for Detached {
        fn resolve_key(&self, key: &QualifiedTypeIdentifier) -> Result<Instance> {
            Err(WireError::NotFound(NotFoundError {
                requested: key.clone(),
                suggestions: vec![],
            }))
        }
        fn try_resolve_key(&self, _key: &QualifiedTypeIdentifier) -> Result<Option<Instance>> {
            Ok(None)
        }
        fn resolve_all(&self, _type_identifier: &TypeIdentifier) -> Result<Vec<Instance>> {
            Ok(vec![])
        }
    }

    struct Fixture {
        registry: ScopeRegistry,
        environment: MapEnvironment,
        settings: WireSettings,
        _resolver: Arc<dyn Resolver>,
    }

    impl Fixture {
        fn new() -> Self {
            let resolver: Arc<dyn Resolver> = Arc::new(Detached);
            let registry = ScopeRegistry::new();
            registry.link(Arc::downgrade(&resolver));
            Self {
                registry,
                environment: MapEnvironment::new(),
                settings: WireSettings::default(),
                _resolver: resolver,
            }
        }

        fn load(&self, providers: Vec<SimpleProvider>) -> Result<ConditionEvaluationReport> {
            ContainerInitializer::new(&self.registry, &self.environment, &self.settings)
                .load(providers.into_iter().map(ProviderRef::new).collect())
        }
    }

    struct Link1;
    struct Link2;
    struct Link3;
    struct Link4;
    struct Link5;

    /// Each link needs the previous one; later links sort first.
    fn chain_of_five() -> Vec<SimpleProvider> {
        vec![
            SimpleProvider::singleton(Link1).order(5).when(OnProperty::present("chain")),
            SimpleProvider::singleton(Link2).order(4).when(OnTypePresent::of::<Link1>()),
            SimpleProvider::singleton(Link3).order(3).when(OnTypePresent::of::<Link2>()),
            SimpleProvider::singleton(Link4).order(2).when(OnTypePresent::of::<Link3>()),
            SimpleProvider::singleton(Link5).order(1).when(OnTypePresent::of::<Link4>()),
        ]
    }

    /// Collects formatted log output of the current thread.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[test]
    fn exceeding_round_threshold_only_warns() {
        let mut fixture = Fixture::new();
        fixture.environment.set("chain", "on");
        fixture.settings.conditional_rounds_threshold = 1;

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer({
                let logs = logs.clone();
                move || logs.clone()
            })
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        let report = tracing::subscriber::with_default(subscriber, || fixture.load(chain_of_five())).unwrap();
        assert_eq!(report.rounds, 5);
        assert_eq!(report.applied, 5);
        assert!(report.unmatched.is_empty());

        let text = logs.text();
        assert_eq!(text.matches("Conditional providers need more rounds than expected").count(), 1);
        assert!(text.contains("threshold=1"));
    }

    #[test]
    fn chain_converges_one_link_per_round() {
        let fixture = Fixture::new();
        fixture.environment.set("chain", "on");

        let report = fixture.load(chain_of_five()).unwrap();
        assert_eq!(report.conditional, 5);
        assert_eq!(report.applied, 5);
        assert_eq!(report.rounds, 5);
        assert!(report.unmatched.is_empty());
        assert!(fixture.registry.contains(&QualifiedTypeIdentifier::of::<Link5>()));
    }

    #[test]
    fn never_true_condition_stops_after_one_round() {
        let fixture = Fixture::new();
        let report = fixture
            .load(vec![
                SimpleProvider::singleton(1u8),
                SimpleProvider::singleton(2u16).when(condition_fn("never", |_| false)),
            ])
            .unwrap();

        assert_eq!(report.rounds, 1);
        assert_eq!(report.applied, 0);
        assert_eq!(report.unmatched.len(), 1);
        assert!(!fixture.registry.contains(&QualifiedTypeIdentifier::of::<u16>()));
        assert!(fixture.registry.contains(&QualifiedTypeIdentifier::of::<u8>()));
    }

    #[test]
    fn unconditional_failures_are_aggregated() {
        let fixture = Fixture::new();
        let result = fixture.load(vec![
            SimpleProvider::singleton(1u8).in_scope(ScopeKey::named("missing")).named("first"),
            SimpleProvider::singleton(2u8),
            SimpleProvider::singleton(3u16).in_scope(ScopeKey::named("missing")).named("second"),
        ]);

        match result {
            Err(WireError::LoadFailed(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors.causes().count(), 2);
                assert!(errors.causes().all(|e| matches!(e, WireError::UnknownScope { .. })));
            }
            other => panic!("Expected LoadFailed, got: {other:?}"),
        }
    }

    #[test]
    fn second_primary_fails_immediately() {
        let fixture = Fixture::new();
        let result = fixture.load(vec![
            SimpleProvider::singleton(1u8).primary(),
            SimpleProvider::singleton(2u8).primary(),
            SimpleProvider::singleton(3u16).in_scope(ScopeKey::named("missing")),
        ]);
        assert!(matches!(result, Err(WireError::MultiplePrimaryProviders(_))));
    }

    #[test]
    fn conditional_primary_conflict_is_fatal() {
        let fixture = Fixture::new();
        fixture.environment.set("feature.enabled", "true");
        let result = fixture.load(vec![
            SimpleProvider::singleton(1u8).primary(),
            SimpleProvider::singleton(2u8)
                .primary()
                .when(OnProperty::equals("feature.enabled", "true")),
        ]);
        assert!(matches!(result, Err(WireError::MultiplePrimaryProviders(_))));
    }

    #[test]
    fn same_round_sees_earlier_registrations() {
        let fixture = Fixture::new();
        let report = fixture
            .load(vec![
                SimpleProvider::singleton(2u16).order(2).when(OnTypePresent::of::<u8>()),
                SimpleProvider::singleton(1u8).order(1).when(OnProperty::present("x").match_if_missing()),
            ])
            .unwrap();

        assert_eq!(report.rounds, 1);
        assert_eq!(report.applied, 2);
        let names: Vec<&str> = report.evaluations.iter().map(|e| e.provider.as_str()).collect();
        assert_eq!(names, vec!["u8", "u16"]);
    }

    #[test]
    fn announce_respects_condition() {
        let fixture = Fixture::new();
        let initializer = ContainerInitializer::new(&fixture.registry, &fixture.environment, &fixture.settings);

        let gated = ProviderRef::new(SimpleProvider::singleton(1u8).when(OnProperty::present("flag")));
        assert!(!initializer.announce(&gated).unwrap());

        fixture.environment.set("flag", "yes");
        assert!(initializer.announce(&gated).unwrap());
        assert!(fixture.registry.contains(&QualifiedTypeIdentifier::of::<u8>()));
    }
}
