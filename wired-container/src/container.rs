//! # The Container: entry point of wired
//!
//! A [`WireContainer`] collects providers from its sources, registers them
//! into scopes and answers typed lookups.
//!
//! # Architecture
//! ```text
//! WireContainerBuilder ──build()──> WireContainer
//!                                       │
//!                                 load() (first lookup)
//!                                       │
//!                 sources ──> ContainerInitializer ──> ScopeRegistry
//! ```
//!
//! Loading happens once, on the first lookup or an explicit
//! [`load()`](WireContainer::load).
//!
//! # Examples
//! ```rust
//! use std::sync::{Arc, Weak};
//! use wired_container::prelude::*;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self) -> String { "hello".into() }
//! }
//!
//! let container = WireContainer::builder()
//!     .provider(
//!         SimpleProvider::lazy(|_| Ok(Arc::new(English)))
//!             .wire_as(|e: &Arc<English>| e.clone() as Arc<dyn Greeter>),
//!     )
//!     .build();
//!
//! let greeter: Arc<dyn Greeter> = container.get().expect("greeter is registered");
//! assert_eq!(greeter.greet(), "hello");
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info, instrument, trace};

use crate::environment::{Environment, SystemEnvironment};
use crate::error::{ProviderErrors, ProviderFailure, Result, WireError};
use crate::initializer::ContainerInitializer;
use crate::key::{QualifiedTypeIdentifier, Qualifier};
use crate::provider::{IdentifiableProvider, ProviderRef};
use crate::registry::{ScopeFactory, ScopeRegistry};
use crate::report::{ConditionEvaluationReport, ConditionEvaluationReporter, StdoutReporter};
use crate::resolver::{Instance, Resolver, ResolverExt};
use crate::scope::{Scope, ScopeKey};
use crate::settings::{EagerInitialization, WireSettings};
use crate::source::{ProviderSource, StaticProviderSource};
use crate::type_id::TypeIdentifier;

// ═══════════════════════════════════════════
// WireContainerBuilder
// ═══════════════════════════════════════════

/// Configures a [`WireContainer`].
///
/// Nothing is registered until the container loads.
pub struct WireContainerBuilder {
    sources: Vec<Box<dyn ProviderSource>>,
    providers: StaticProviderSource,
    environment: Option<Arc<dyn Environment>>,
    settings: Option<WireSettings>,
    reporter: Option<Arc<dyn ConditionEvaluationReporter>>,
    scopes: Vec<(ScopeKey, ScopeFactory)>,
}

impl WireContainerBuilder {
    fn new() -> Self {
        Self {
            sources: Vec::new(),
            providers: StaticProviderSource::default(),
            environment: None,
            settings: None,
            reporter: None,
            scopes: Vec::new(),
        }
    }

    /// Add a single provider.
    pub fn provider(mut self, provider: impl IdentifiableProvider + 'static) -> Self {
        self.providers.push(ProviderRef::new(provider));
        self
    }

    /// Add an already shared provider.
    pub fn provider_ref(mut self, provider: ProviderRef) -> Self {
        self.providers.push(provider);
        self
    }

    /// Add a source consulted on every load.
    pub fn source(mut self, source: impl ProviderSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Environment read by conditions and settings. Defaults to the process
    /// environment.
    pub fn environment(mut self, environment: impl Environment + 'static) -> Self {
        self.environment = Some(Arc::new(environment));
        self
    }

    /// Explicit settings. Without them settings are read from the environment.
    pub fn settings(mut self, settings: WireSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Receives the condition report when `debug_conditions` is on.
    pub fn reporter(mut self, reporter: impl ConditionEvaluationReporter + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Make the named scope `key` available to providers.
    pub fn scope(
        mut self,
        key: ScopeKey,
        factory: impl Fn(&ScopeKey) -> Arc<dyn Scope> + Send + Sync + 'static,
    ) -> Self {
        self.scopes.push((key, Arc::new(factory)));
        self
    }

    pub fn build(self) -> WireContainer {
        let environment = self
            .environment
            .unwrap_or_else(|| Arc::new(SystemEnvironment));
        let settings = self
            .settings
            .unwrap_or_else(|| WireSettings::from_environment(environment.as_ref()));

        let mut sources = self.sources;
        sources.insert(0, Box::new(self.providers));

        let inner = Arc::new_cyclic(|this: &Weak<ContainerInner>| {
            let registry = ScopeRegistry::new();
            registry.link(this.clone() as Weak<dyn Resolver>);
            for (key, factory) in self.scopes {
                registry.register_scope_factory(key, factory);
            }

            ContainerInner {
                registry,
                sources,
                environment,
                settings,
                reporter: self.reporter.unwrap_or_else(|| Arc::new(StdoutReporter)),
                loaded: AtomicBool::new(false),
                write: Mutex::new(()),
                signal: (Mutex::new(false), Condvar::new()),
                last_report: RwLock::new(None),
            }
        });

        debug!(sources = inner.sources.len(), "Container built");
        WireContainer { inner }
    }
}

// ═══════════════════════════════════════════
// WireContainer
// ═══════════════════════════════════════════

/// Thread-safe dependency injection container.
///
/// Cheap to clone: clones share the same registry.
#[derive(Clone)]
pub struct WireContainer {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    registry: ScopeRegistry,
    sources: Vec<Box<dyn ProviderSource>>,
    environment: Arc<dyn Environment>,
    settings: WireSettings,
    reporter: Arc<dyn ConditionEvaluationReporter>,
    loaded: AtomicBool,
    /// Serializes load, announce and clear.
    write: Mutex<()>,
    signal: (Mutex<bool>, Condvar),
    last_report: RwLock<Option<ConditionEvaluationReport>>,
}

impl WireContainer {
    /// Create a new builder.
    pub fn builder() -> WireContainerBuilder {
        WireContainerBuilder::new()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.load(Ordering::Acquire)
    }

    /// Loads every provider of every source. Later calls return immediately.
    ///
    /// # Errors
    /// A failed load leaves the container empty and unloaded; see
    /// [`ContainerInitializer::load`] for the error cases.
    pub fn load(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }

        let _write = self.inner.write.lock();
        if self.is_loaded() {
            return Ok(());
        }
        self.inner.load_locked()
    }

    /// Runs [`load`](Self::load) on tokio's blocking pool.
    #[cfg(feature = "async")]
    pub async fn load_async(&self) -> Result<()> {
        let container = self.clone();
        tokio::task::spawn_blocking(move || container.load())
            .await
            .map_err(|err| WireError::LoadInterrupted {
                reason: err.to_string(),
            })?
    }

    /// Blocks until another thread finished loading.
    ///
    /// `None` falls back to the configured `load_timeout`, and waits forever
    /// when that is unset too. Returns whether the container is loaded.
    pub fn await_loaded(&self, timeout: Option<Duration>) -> bool {
        let (lock, condvar) = &self.inner.signal;
        let mut loaded = lock.lock();

        match timeout.or(self.inner.settings.load_timeout) {
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*loaded {
                    if condvar.wait_until(&mut loaded, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while !*loaded {
                    condvar.wait(&mut loaded);
                }
            }
        }
        *loaded
    }

    /// Registers `provider` if its condition matches.
    ///
    /// Returns `false` when the condition did not match.
    ///
    /// # Errors
    /// [`WireError::MultiplePrimaryProviders`], or whatever the target scope
    /// reports.
    pub fn announce(&self, provider: ProviderRef) -> Result<bool> {
        let _write = self.inner.write.lock();
        self.inner.initializer().announce(&provider)
    }

    // ── Typed lookups ──

    /// Resolve one instance of `T`.
    ///
    /// ```rust,ignore
    /// let db: Arc<Database> = container.get()?;
    /// ```
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Result<T> {
        self.load()?;
        self.inner.get::<T>()
    }

    pub fn get_qualified<T: Clone + Send + Sync + 'static>(
        &self,
        qualifier: impl Into<Qualifier>,
    ) -> Result<T> {
        self.load()?;
        self.inner.get_qualified::<T>(qualifier)
    }

    /// Like [`get`](Self::get) but absence is `Ok(None)`.
    pub fn try_get<T: Clone + Send + Sync + 'static>(&self) -> Result<Option<T>> {
        self.load()?;
        self.inner.try_get::<T>()
    }

    /// Every instance of `T`, by ascending order. Empty when none is registered.
    pub fn get_all<T: Clone + Send + Sync + 'static>(&self) -> Result<Vec<T>> {
        self.load()?;
        self.inner.get_all::<T>()
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.contains_key(&QualifiedTypeIdentifier::of::<T>())
    }

    // ── Type-erased lookups ──

    pub fn get_key(&self, key: &QualifiedTypeIdentifier) -> Result<Instance> {
        self.load()?;
        self.inner.registry.get(key)
    }

    pub fn try_get_key(&self, key: &QualifiedTypeIdentifier) -> Result<Option<Instance>> {
        self.load()?;
        self.inner.registry.try_get(key)
    }

    pub fn get_all_by(&self, type_identifier: &TypeIdentifier) -> Result<Vec<Instance>> {
        self.load()?;
        self.inner.registry.get_all(type_identifier)
    }

    /// `false` when nothing supplies `key`, or the container fails to load.
    pub fn contains_key(&self, key: &QualifiedTypeIdentifier) -> bool {
        self.load().is_ok() && self.inner.registry.contains(key)
    }

    // ── Lifecycle ──

    /// Report of the last successful load.
    pub fn last_report(&self) -> Option<ConditionEvaluationReport> {
        self.inner.last_report.read().clone()
    }

    pub fn settings(&self) -> &WireSettings {
        &self.inner.settings
    }

    pub fn scope_registry(&self) -> &ScopeRegistry {
        &self.inner.registry
    }

    /// Drops every registration and instance; the next lookup loads again.
    pub fn clear(&self) {
        let _write = self.inner.write.lock();
        self.inner.reset();
        *self.inner.last_report.write() = None;
        info!("Container cleared");
    }
}

impl fmt::Debug for WireContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireContainer")
            .field("loaded", &self.is_loaded())
            .field("sources", &self.inner.sources.len())
            .field("registered", &self.inner.registry.registered_providers().len())
            .finish()
    }
}

impl ContainerInner {
    fn initializer(&self) -> ContainerInitializer<'_> {
        ContainerInitializer::new(&self.registry, self.environment.as_ref(), &self.settings)
    }

    /// Caller holds `write`.
    #[instrument(skip(self), name = "container_load_pass")]
    fn load_locked(&self) -> Result<()> {
        let providers: Vec<ProviderRef> = self
            .sources
            .iter()
            .flat_map(|source| source.providers())
            .collect();
        info!(providers = providers.len(), "Loading container");

        let report = match self.initializer().load(providers) {
            Ok(report) => report,
            Err(err) => {
                self.reset();
                return Err(err);
            }
        };

        if self.settings.debug_conditions {
            self.reporter.report(&report);
        }

        if let Err(err) = self.initialize_eagerly() {
            self.reset();
            return Err(err);
        }

        *self.last_report.write() = Some(report);
        self.loaded.store(true, Ordering::Release);
        let (lock, condvar) = &self.signal;
        *lock.lock() = true;
        condvar.notify_all();

        info!("Container loaded ✓");
        Ok(())
    }

    /// Instantiates singleton providers according to the eager setting.
    fn initialize_eagerly(&self) -> Result<()> {
        let mode = self.settings.eager_initialization;
        if mode == EagerInitialization::Disabled {
            return Ok(());
        }

        let targets: Vec<(ProviderRef, Arc<dyn Scope>)> = self
            .registry
            .registered_providers()
            .into_iter()
            .filter(|(provider, _)| provider.is_singleton())
            .collect();
        debug!(mode = %mode, singletons = targets.len(), "Eager initialization");

        let failures: Vec<ProviderFailure> = match mode {
            EagerInitialization::Parallel => {
                let workers = std::thread::available_parallelism().map_or(4, |n| n.get());
                let chunk = targets.len().div_ceil(workers).max(1);
                std::thread::scope(|s| {
                    let handles: Vec<_> = targets
                        .chunks(chunk)
                        .map(|batch| s.spawn(move || instantiate_all(batch)))
                        .collect();
                    handles
                        .into_iter()
                        .flat_map(|handle| {
                            handle.join().unwrap_or_else(|_| {
                                vec![ProviderFailure {
                                    provider: "eager initialization worker".to_string(),
                                    errors: vec![WireError::LoadInterrupted {
                                        reason: "worker thread panicked".to_string(),
                                    }],
                                }]
                            })
                        })
                        .collect()
                })
            }
            _ => instantiate_all(&targets),
        };

        if failures.is_empty() {
            Ok(())
        } else {
            Err(WireError::LoadFailed(ProviderErrors { failures }))
        }
    }

    fn reset(&self) {
        self.registry.clear();
        self.loaded.store(false, Ordering::Release);
        *self.signal.0.lock() = false;
    }
}

fn instantiate_all(targets: &[(ProviderRef, Arc<dyn Scope>)]) -> Vec<ProviderFailure> {
    targets
        .iter()
        .filter_map(|(provider, scope)| {
            trace!(provider = provider.name(), "Eagerly instantiating");
            scope
                .instance_of(provider, provider.type_identifier())
                .err()
                .map(|err| ProviderFailure {
                    provider: provider.name().to_string(),
                    errors: vec![err],
                })
        })
        .collect()
}

// ═══════════════════════════════════════════
// Resolver (handed to provider factories)
// ═══════════════════════════════════════════

/// Factories run while the container loads, so these never trigger a load.
impl Resolver for ContainerInner {
    fn resolve_key(&self, key: &QualifiedTypeIdentifier) -> Result<Instance> {
        self.registry.get(key)
    }

    fn try_resolve_key(&self, key: &QualifiedTypeIdentifier) -> Result<Option<Instance>> {
        self.registry.try_get(key)
    }

    fn resolve_all(&self, type_identifier: &TypeIdentifier) -> Result<Vec<Instance>> {
        self.registry.get_all(type_identifier)
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{WireContainer, WireContainerBuilder};
    pub use crate::condition::{
        LoadCondition, OnProperty, OnTypeMissing, OnTypePresent, all_of, any_of, condition_fn, not,
    };
    pub use crate::environment::{Environment, MapEnvironment, SystemEnvironment};
    pub use crate::error::{Result, WireError};
    pub use crate::key::{QualifiedTypeIdentifier, Qualifier};
    pub use crate::provider::{IdentifiableProvider, ProviderRef, SimpleProvider};
    pub use crate::resolver::{Resolver, ResolverExt};
    pub use crate::scope::ScopeKey;
    pub use crate::settings::{EagerInitialization, WireSettings};
    pub use crate::source::{InventoryProviderSource, ProviderSource, StaticProviderSource};
    pub use crate::type_id::TypeIdentifier;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{OnProperty, OnTypePresent, condition_fn};
    use crate::environment::MapEnvironment;
    use crate::provider::SimpleProvider;
    use crate::scope::SingletonScope;
    use std::sync::atomic::AtomicU32;

    trait Service: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct Named(&'static str);

    impl Service for Named {
        fn name(&self) -> &'static str {
            self.0
        }
    }

    fn service(name: &'static str) -> SimpleProvider {
        SimpleProvider::lazy(move |_| Ok(Arc::new(Named(name))))
            .wire_as(|n: &Arc<Named>| n.clone() as Arc<dyn Service>)
            .named(name)
    }

    fn quiet() -> WireSettings {
        WireSettings::default()
    }

    fn container(env: MapEnvironment, providers: Vec<SimpleProvider>) -> WireContainer {
        providers
            .into_iter()
            .fold(WireContainer::builder(), |builder, p| builder.provider(p))
            .environment(env)
            .settings(quiet())
            .build()
    }

    #[test]
    fn loads_on_first_lookup() {
        let c = container(MapEnvironment::new(), vec![SimpleProvider::singleton(42i32)]);
        assert!(!c.is_loaded());
        assert_eq!(c.get::<i32>().unwrap(), 42);
        assert!(c.is_loaded());
    }

    #[test]
    fn factories_resolve_dependencies() {
        let c = container(
            MapEnvironment::new(),
            vec![
                SimpleProvider::singleton(String::from("postgres://localhost")),
                SimpleProvider::multiton(|r| Ok(r.get::<String>()?.into_bytes())),
            ],
        );
        assert_eq!(c.get::<Vec<u8>>().unwrap(), b"postgres://localhost");
    }

    #[test]
    fn primary_wins_over_conditional_competitor() {
        let build = |env: MapEnvironment| {
            container(
                env,
                vec![
                    service("p1").primary(),
                    service("p2").when(OnProperty::equals("feature.enabled", "true")),
                ],
            )
        };

        let off = build(MapEnvironment::new());
        assert_eq!(off.get::<Arc<dyn Service>>().unwrap().name(), "p1");
        assert_eq!(off.get_all::<Arc<dyn Service>>().unwrap().len(), 1);

        let on = build(MapEnvironment::new().with("feature.enabled", "true"));
        assert_eq!(on.get::<Arc<dyn Service>>().unwrap().name(), "p1");
        let mut names: Vec<&str> = on
            .get_all::<Arc<dyn Service>>()
            .unwrap()
            .iter()
            .map(|s| s.name())
            .collect();
        names.sort_unstable();
        assert_eq!(names, vec!["p1", "p2"]);
    }

    #[test]
    fn get_all_follows_order() {
        let c = container(
            MapEnvironment::new(),
            vec![service("five").order(5), service("one").order(1), service("three").order(3)],
        );
        let names: Vec<&str> = c
            .get_all::<Arc<dyn Service>>()
            .unwrap()
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["one", "three", "five"]);
    }

    #[test]
    fn get_all_of_unknown_type_is_empty() {
        let c = container(MapEnvironment::new(), vec![]);
        assert!(c.get_all::<Arc<dyn Service>>().unwrap().is_empty());
        assert!(c.try_get::<u8>().unwrap().is_none());
        assert!(!c.contains::<u8>());
    }

    #[test]
    fn missing_type_is_not_found() {
        let c = container(MapEnvironment::new(), vec![SimpleProvider::singleton(1u8)]);
        match c.get::<u64>() {
            Err(WireError::NotFound(err)) => assert!(err.requested.type_identifier().root().contains("u64")),
            other => panic!("Expected NotFound, got: {other:?}"),
        }
    }

    #[test]
    fn qualified_lookup() {
        let c = container(
            MapEnvironment::new(),
            vec![
                SimpleProvider::singleton(String::from("primary-db")).qualified("primary"),
                SimpleProvider::singleton(String::from("replica-db")).qualified("replica"),
            ],
        );
        assert_eq!(c.get_qualified::<String>("replica").unwrap(), "replica-db");
        assert!(matches!(c.get::<String>(), Err(WireError::AmbiguousProviders(_))));
    }

    #[test]
    fn failing_unconditional_providers_fail_the_load() {
        let c = container(
            MapEnvironment::new(),
            vec![
                SimpleProvider::singleton(1u8).in_scope(ScopeKey::named("request")),
                SimpleProvider::singleton(2u16).in_scope(ScopeKey::named("session")),
                SimpleProvider::singleton(3u32),
            ],
        );

        match c.load() {
            Err(WireError::LoadFailed(errors)) => assert_eq!(errors.causes().count(), 2),
            other => panic!("Expected LoadFailed, got: {other:?}"),
        }
        assert!(!c.is_loaded());
        assert!(!c.scope_registry().contains(&QualifiedTypeIdentifier::of::<u32>()));
    }

    #[test]
    fn unmatched_conditional_provider_is_not_an_error() {
        let c = container(
            MapEnvironment::new(),
            vec![
                SimpleProvider::singleton(1u8),
                SimpleProvider::singleton(2u16).when(condition_fn("never", |_| false)),
            ],
        );
        c.load().unwrap();

        let report = c.last_report().unwrap();
        assert_eq!(report.rounds, 1);
        assert_eq!(report.applied, 0);
        assert!(!c.contains::<u16>());
    }

    #[test]
    fn named_scope_from_builder() {
        let c = WireContainer::builder()
            .provider(SimpleProvider::lazy(|_| Ok(5u8)).in_scope(ScopeKey::named("request")))
            .scope(ScopeKey::named("request"), |key| {
                Arc::new(SingletonScope::with_key(key.clone())) as Arc<dyn Scope>
            })
            .environment(MapEnvironment::new())
            .settings(quiet())
            .build();
        assert_eq!(c.get::<u8>().unwrap(), 5);
    }

    #[test]
    fn prototype_scope_rebuilds() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = container(
            MapEnvironment::new(),
            vec![SimpleProvider::multiton({
                let counter = counter.clone();
                move |_| Ok(counter.fetch_add(1, Ordering::SeqCst))
            })
            .in_scope(ScopeKey::Prototype)],
        );

        assert_eq!(c.get::<u32>().unwrap(), 0);
        assert_eq!(c.get::<u32>().unwrap(), 1);
    }

    #[test]
    fn circular_dependency_is_reported() {
        struct Left;
        struct Right;

        let c = container(
            MapEnvironment::new(),
            vec![
                SimpleProvider::lazy(|r| {
                    r.get::<Arc<Right>>()?;
                    Ok(Arc::new(Left))
                })
                .named("Left"),
                SimpleProvider::lazy(|r| {
                    r.get::<Arc<Left>>()?;
                    Ok(Arc::new(Right))
                })
                .named("Right"),
            ],
        );

        match c.get::<Arc<Left>>() {
            Err(WireError::CircularDependency(err)) => {
                assert_eq!(err.chain, vec!["Left", "Right", "Left"]);
            }
            other => panic!("Expected CircularDependency, got: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn announce_after_load() {
        let c = container(MapEnvironment::new().with("late", "true"), vec![]);
        c.load().unwrap();

        let rejected = ProviderRef::new(SimpleProvider::singleton(1u8).when(OnProperty::present("missing")));
        assert!(!c.announce(rejected).unwrap());
        assert!(!c.contains::<u8>());

        let accepted = ProviderRef::new(SimpleProvider::singleton(2u8).when(OnProperty::present("late")));
        assert!(c.announce(accepted).unwrap());
        assert_eq!(c.get::<u8>().unwrap(), 2);
    }

    #[test]
    fn eager_initialization_builds_singletons() {
        for mode in [EagerInitialization::Sequential, EagerInitialization::Parallel] {
            let counter = Arc::new(AtomicU32::new(0));
            let providers: Vec<SimpleProvider> = (0..6)
                .map(|i| {
                    let counter = counter.clone();
                    SimpleProvider::lazy(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(i)
                    })
                    .qualified(format!("n{i}"))
                })
                .collect();

            let c = providers
                .into_iter()
                .fold(WireContainer::builder(), |b, p| b.provider(p))
                .environment(MapEnvironment::new())
                .settings(WireSettings {
                    eager_initialization: mode,
                    ..quiet()
                })
                .build();

            c.load().unwrap();
            assert_eq!(counter.load(Ordering::SeqCst), 6, "mode {mode}");
        }
    }

    #[test]
    fn eager_failure_fails_the_load() {
        let c = WireContainer::builder()
            .provider(SimpleProvider::lazy(|_| -> Result<u8> {
                Err(WireError::construction("u8", "disk unavailable"))
            }))
            .environment(MapEnvironment::new())
            .settings(WireSettings {
                eager_initialization: EagerInitialization::Sequential,
                ..quiet()
            })
            .build();

        assert!(matches!(c.load(), Err(WireError::LoadFailed(_))));
        assert!(!c.is_loaded());
    }

    #[test]
    fn await_loaded_sees_other_thread() {
        let c = container(MapEnvironment::new(), vec![SimpleProvider::singleton(1u8)]);
        assert!(!c.await_loaded(Some(Duration::from_millis(10))));

        let loader = {
            let c = c.clone();
            std::thread::spawn(move || c.load())
        };
        assert!(c.await_loaded(Some(Duration::from_secs(5))));
        loader.join().unwrap().unwrap();
    }

    #[test]
    fn clear_allows_reload() {
        let c = container(
            MapEnvironment::new(),
            vec![SimpleProvider::singleton(7u8), SimpleProvider::singleton(1u16).primary()],
        );
        assert_eq!(c.get::<u8>().unwrap(), 7);

        c.clear();
        assert!(!c.is_loaded());
        assert!(c.last_report().is_none());
        assert_eq!(c.get::<u16>().unwrap(), 1);
    }

    #[test]
    fn condition_sees_unconditional_types() {
        let c = container(
            MapEnvironment::new(),
            vec![
                SimpleProvider::singleton(1u8),
                SimpleProvider::singleton(2u16).when(OnTypePresent::of::<u8>()),
            ],
        );
        assert_eq!(c.get::<u16>().unwrap(), 2);
        assert_eq!(c.last_report().unwrap().applied, 1);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn load_async_runs_on_blocking_pool() {
        let c = container(MapEnvironment::new(), vec![SimpleProvider::singleton(3u8)]);
        c.load_async().await.unwrap();
        assert!(c.is_loaded());
        assert_eq!(c.get::<u8>().unwrap(), 3);
    }

    #[derive(Clone, Default)]
    struct CountingReporter {
        reports: Arc<AtomicU32>,
        last_applied: Arc<AtomicU32>,
    }

    impl ConditionEvaluationReporter for CountingReporter {
        fn report(&self, report: &ConditionEvaluationReport) {
            self.reports.fetch_add(1, Ordering::SeqCst);
            self.last_applied.store(report.applied as u32, Ordering::SeqCst);
        }
    }

    #[test]
    fn reporter_called_only_when_debugging_conditions() {
        let build = |debug_conditions: bool, reporter: CountingReporter| {
            WireContainer::builder()
                .provider(SimpleProvider::singleton(1u8))
                .provider(SimpleProvider::singleton(2u16).when(OnTypePresent::of::<u8>()))
                .environment(MapEnvironment::new())
                .settings(WireSettings {
                    debug_conditions,
                    ..WireSettings::default()
                })
                .reporter(reporter)
                .build()
        };

        let silent = CountingReporter::default();
        build(false, silent.clone()).load().unwrap();
        assert_eq!(silent.reports.load(Ordering::SeqCst), 0);

        let verbose = CountingReporter::default();
        let c = build(true, verbose.clone());
        c.load().unwrap();
        c.load().unwrap();
        assert_eq!(verbose.reports.load(Ordering::SeqCst), 1);
        assert_eq!(verbose.last_applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn debug_display() {
        let c = container(MapEnvironment::new(), vec![SimpleProvider::singleton(1i32)]);
        c.load().unwrap();
        let debug = format!("{c:?}");
        assert!(debug.contains("WireContainer"));
        assert!(debug.contains("registered: 1"));
    }
}
