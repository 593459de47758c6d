//! Property sources consulted by conditions and container settings.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;

/// Read-only access to configuration properties.
pub trait Environment: Send + Sync {
    fn property(&self, key: &str) -> Option<String>;
}

/// A typed property name with its default value.
///
/// ```
/// use wired_container::environment::{MapEnvironment, PropertyKey};
///
/// const RETRIES: PropertyKey<u32> = PropertyKey::new("client.retries", 3);
///
/// let env = MapEnvironment::new();
/// assert_eq!(RETRIES.read(&env), 3);
/// env.set("client.retries", "5");
/// assert_eq!(RETRIES.read(&env), 5);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PropertyKey<T> {
    name: &'static str,
    default: T,
}

impl<T> PropertyKey<T> {
    pub const fn new(name: &'static str, default: T) -> Self {
        Self { name, default }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: FromStr + Clone> PropertyKey<T> {
    /// Reads the property, falling back to the default when it is absent
    /// or does not parse.
    pub fn read(&self, environment: &dyn Environment) -> T {
        match environment.property(self.name) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key = self.name, value = %raw, "Unparsable property, using default");
                self.default.clone()
            }),
            None => self.default.clone(),
        }
    }
}

/// In-memory properties, mutable through a shared reference.
#[derive(Default)]
pub struct MapEnvironment {
    properties: RwLock<HashMap<String, String>>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.properties.write().remove(key)
    }
}

impl Environment for MapEnvironment {
    fn property(&self, key: &str) -> Option<String> {
        self.properties.read().get(key).cloned()
    }
}

impl fmt::Debug for MapEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapEnvironment")
            .field("properties", &self.properties.read().len())
            .finish()
    }
}

/// Process environment variables; `wired.debug` is read from `WIRED_DEBUG`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl SystemEnvironment {
    pub fn variable_name(key: &str) -> String {
        key.chars()
            .map(|c| match c {
                '.' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect()
    }
}

impl Environment for SystemEnvironment {
    fn property(&self, key: &str) -> Option<String> {
        std::env::var(Self::variable_name(key)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAG: PropertyKey<bool> = PropertyKey::new("feature.flag", false);

    #[test]
    fn map_environment_roundtrip() {
        let env = MapEnvironment::new().with("a", "1");
        assert_eq!(env.property("a").as_deref(), Some("1"));
        assert_eq!(env.remove("a").as_deref(), Some("1"));
        assert_eq!(env.property("a"), None);
    }

    #[test]
    fn property_key_defaults_on_garbage() {
        let env = MapEnvironment::new().with("feature.flag", "maybe");
        assert!(!FLAG.read(&env));
        env.set("feature.flag", " true ");
        assert!(FLAG.read(&env));
    }

    #[test]
    fn system_variable_names() {
        assert_eq!(
            SystemEnvironment::variable_name("wired.conditional-rounds-threshold"),
            "WIRED_CONDITIONAL_ROUNDS_THRESHOLD"
        );
    }
}
