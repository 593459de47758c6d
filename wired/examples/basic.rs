//! Basic example of the wired container.
//!
//! Run with `WIRED_DEBUG=true` to print the condition evaluation report,
//! or set `CACHE_ENABLED=true` to register the cached repository.

use std::sync::Arc;

use wired::prelude::*;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

#[derive(Clone)]
struct Config {
    database_url: String,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

trait UserRepository: Send + Sync {
    fn find_user(&self, id: u64) -> String;
}

struct SqlUserRepository {
    db: Arc<Database>,
}

impl UserRepository for SqlUserRepository {
    fn find_user(&self, id: u64) -> String {
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

struct CachedUserRepository {
    inner: Arc<SqlUserRepository>,
}

impl UserRepository for CachedUserRepository {
    fn find_user(&self, id: u64) -> String {
        format!("(cached) {}", self.inner.find_user(id))
    }
}

struct UserService {
    repo: Arc<dyn UserRepository>,
    logger: Arc<dyn Logger>,
}

impl UserService {
    fn get_user(&self, id: u64) -> String {
        self.logger.log(&format!("Getting user {id}"));
        self.repo.find_user(id)
    }
}

fn main() -> Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter("wired_container=debug")
        .init();

    let container = WireContainer::builder()
        // Config: a pre-built singleton
        .provider(SimpleProvider::singleton(Config {
            database_url: "postgres://localhost/myapp".to_string(),
        }))
        // Logger: built once, wired as the trait object
        .provider(
            SimpleProvider::lazy(|_| Ok(Arc::new(ConsoleLogger)))
                .wire_as(|l: &Arc<ConsoleLogger>| l.clone() as Arc<dyn Logger>),
        )
        // Database: depends on Config and Logger
        .provider(SimpleProvider::lazy(|r| {
            let config: Config = r.get()?;
            let logger: Arc<dyn Logger> = r.get()?;
            Ok(Arc::new(Database {
                url: config.database_url,
                logger,
            }))
        }))
        // The SQL repository is the primary implementation
        .provider(
            SimpleProvider::lazy(|r| Ok(Arc::new(SqlUserRepository { db: r.get()? })))
                .wire_as(|s: &Arc<SqlUserRepository>| s.clone() as Arc<dyn UserRepository>)
                .primary()
                .order(1),
        )
        // Only registered when the cache is switched on
        .provider(
            SimpleProvider::lazy(|r| Ok(Arc::new(CachedUserRepository { inner: r.get()? })))
                .wire_as(|c: &Arc<CachedUserRepository>| c.clone() as Arc<dyn UserRepository>)
                .when(all_of(vec![
                    Box::new(OnProperty::equals("cache.enabled", "true")),
                    Box::new(OnTypePresent::of::<Arc<SqlUserRepository>>()),
                ]))
                .order(2),
        )
        // UserService: a new instance per request
        .provider(
            SimpleProvider::multiton(|r| {
                Ok(Arc::new(UserService {
                    repo: r.get()?,
                    logger: r.get()?,
                }))
            })
            .in_scope(ScopeKey::Prototype),
        )
        .build();

    container.load()?;
    println!("✅ Container loaded!");
    println!("{container:?}");

    let service: Arc<UserService> = container.get()?;
    println!("👤 {}", service.get_user(42));

    let repositories: Vec<Arc<dyn UserRepository>> = container.get_all()?;
    println!("📚 {} user repositories registered", repositories.len());

    if let Some(report) = container.last_report() {
        println!("🔁 {} conditional provider(s) applied in {} round(s)", report.applied, report.rounds);
    }

    println!("\n🎉 Everything works!");
    Ok(())
}
