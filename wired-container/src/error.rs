//! Error types for Wired container operations.
//!
//! Load-phase errors are accumulated per provider and surfaced as a single
//! [`WireError::LoadFailed`]; a second primary provider for one type is the
//! only load-phase error raised immediately.

use std::fmt;

use wired_support::rendering::render_chain;

use crate::key::QualifiedTypeIdentifier;
use crate::scope::ScopeKey;
use crate::type_id::TypeIdentifier;

/// Main error type for all Wired operations.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// No registered provider can supply the requested key.
    #[error("{}", .0)]
    NotFound(NotFoundError),

    /// Several non-primary providers supply the requested key.
    #[error("{}", .0)]
    AmbiguousProviders(AmbiguousProvidersError),

    /// A second primary provider was registered for the same erased type.
    #[error("{}", .0)]
    MultiplePrimaryProviders(MultiplePrimaryProvidersError),

    /// A provider (transitively) requested itself while being constructed.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A provider's factory returned an error.
    #[error("Failed to construct {key}: {source}")]
    ConstructionFailed {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A type shape that cannot be expressed as a [`TypeIdentifier`].
    #[error("Unsupported type `{type_name}`: {reason} are not supported")]
    UnsupportedType {
        type_name: String,
        reason: &'static str,
    },

    /// A produced instance could not be viewed as the requested type.
    #[error("Type mismatch: requested {requested}, provider {provider} produced something else")]
    TypeMismatch { requested: String, provider: String },

    /// A scope was asked for an instance before being linked to a container.
    #[error("Scope {scope} is not linked to a container")]
    ScopeNotLinked { scope: ScopeKey },

    /// A provider selected a named scope nobody registered a factory for.
    #[error("Unknown scope {key}\n  Hint: register it with .scope(ScopeKey::named(\"{key}\"), ...) on the builder")]
    UnknownScope { key: ScopeKey },

    /// One or more unconditional providers failed to register.
    #[error("{}", .0)]
    LoadFailed(ProviderErrors),

    /// The background load task did not complete.
    #[error("Container load was interrupted: {reason}")]
    LoadInterrupted { reason: String },
}

impl WireError {
    /// Wraps a factory error for the provider producing `key`.
    pub fn construction(
        key: impl fmt::Display,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        WireError::ConstructionFailed {
            key: key.to_string(),
            source: source.into(),
        }
    }

    /// Returns `true` for the error kinds that abort a load pass immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WireError::MultiplePrimaryProviders(_))
    }
}

/// Error when nothing can supply a requested key.
#[derive(Debug)]
pub struct NotFoundError {
    /// The key that was requested
    pub requested: QualifiedTypeIdentifier,
    /// Similar registered types (for "did you mean?" suggestions)
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No provider registered for {}", self.requested)?;

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: announce a provider for {:#}, or check its load condition (wired.debug=true prints the condition report)",
            self.requested.type_identifier()
        )
    }
}

/// Error when an unqualified lookup hits several equally ranked providers.
#[derive(Debug)]
pub struct AmbiguousProvidersError {
    pub requested: QualifiedTypeIdentifier,
    /// Names of the competing providers
    pub candidates: Vec<String>,
}

impl fmt::Display for AmbiguousProvidersError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} providers match {}: {}",
            self.candidates.len(),
            self.requested,
            self.candidates.join(", ")
        )?;
        write!(
            f,
            "\n  Hint: mark one of them primary, request a qualifier, or use get_all"
        )
    }
}

/// Error when two primary providers claim the same erased type.
#[derive(Debug)]
pub struct MultiplePrimaryProvidersError {
    pub type_identifier: TypeIdentifier,
    /// The provider that was registered first
    pub existing: String,
    /// The provider whose registration failed
    pub incoming: String,
}

impl fmt::Display for MultiplePrimaryProvidersError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Multiple primary providers registered for {}: {} (existing) and {} (incoming)",
            self.type_identifier, self.existing, self.incoming
        )?;
        write!(f, "\n  Hint: at most one provider per type may be primary")
    }
}

/// Error when construction re-enters a provider that is already being built.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// Provider names forming the cycle, first and last are the same.
    pub chain: Vec<String>,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circular dependency detected:\n  {}", render_chain(&self.chain))?;
        write!(
            f,
            "\n  Hint: resolve one side lazily (prototype scope or a factory closure)"
        )
    }
}

/// Errors collected for one provider during a load pass.
#[derive(Debug)]
pub struct ProviderFailure {
    pub provider: String,
    pub errors: Vec<WireError>,
}

/// Aggregate of every provider that failed to register.
#[derive(Debug, Default)]
pub struct ProviderErrors {
    pub failures: Vec<ProviderFailure>,
}

impl ProviderErrors {
    /// Iterates over every collected error, in registration order.
    pub fn causes(&self) -> impl Iterator<Item = &WireError> {
        self.failures.iter().flat_map(|failure| failure.errors.iter())
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ProviderErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Container load failed: {} provider(s) could not be registered",
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}:", failure.provider)?;
            for error in &failure.errors {
                for (i, line) in error.to_string().lines().enumerate() {
                    let marker = if i == 0 { "-" } else { " " };
                    write!(f, "\n    {marker} {line}")?;
                }
            }
        }
        Ok(())
    }
}

/// Convenient Result type for Wired operations.
pub type Result<T> = std::result::Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_lists_suggestions() {
        let err = WireError::NotFound(NotFoundError {
            requested: QualifiedTypeIdentifier::of::<String>(),
            suggestions: vec!["alloc::string::Strung".into()],
        });

        let msg = err.to_string();
        assert!(msg.contains("No provider registered"));
        assert!(msg.contains("Did you mean"));
        assert!(msg.contains("Strung"));
    }

    #[test]
    fn multiple_primary_names_both_providers() {
        let err = WireError::MultiplePrimaryProviders(MultiplePrimaryProvidersError {
            type_identifier: TypeIdentifier::of::<String>(),
            existing: "first".into(),
            incoming: "second".into(),
        });

        let msg = err.to_string();
        assert!(msg.contains("first (existing)"));
        assert!(msg.contains("second (incoming)"));
        assert!(err.is_fatal());
    }

    #[test]
    fn circular_dependency_display() {
        let err = WireError::CircularDependency(CircularDependencyError {
            chain: vec!["A".into(), "B".into(), "A".into()],
        });
        assert!(err.to_string().contains("A → B → A"));
    }

    #[test]
    fn load_failed_enumerates_every_cause() {
        let errors = ProviderErrors {
            failures: vec![
                ProviderFailure {
                    provider: "mailer".into(),
                    errors: vec![WireError::construction("Mailer", "smtp down")],
                },
                ProviderFailure {
                    provider: "cache".into(),
                    errors: vec![WireError::construction("Cache", "no redis")],
                },
            ],
        };

        assert_eq!(errors.causes().count(), 2);
        let msg = WireError::LoadFailed(errors).to_string();
        assert!(msg.contains("2 provider(s)"));
        assert!(msg.contains("smtp down"));
        assert!(msg.contains("no redis"));
    }
}
