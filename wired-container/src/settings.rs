//! Container settings.
//!
//! Settings are plain serde data so applications can embed them in their
//! own configuration files, or read them from an [`Environment`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::environment::{Environment, PropertyKey};

/// Rounds after which the convergence loop warns (it never aborts).
pub const CONDITIONAL_ROUNDS_THRESHOLD: PropertyKey<usize> =
    PropertyKey::new("wired.conditional-rounds-threshold", 10);

/// Print the condition evaluation report after every load.
pub const DEBUG_CONDITIONS: PropertyKey<bool> = PropertyKey::new("wired.debug", false);

pub const EAGER_INITIALIZATION: PropertyKey<EagerInitialization> =
    PropertyKey::new("wired.eager", EagerInitialization::Disabled);

/// Whether singleton providers are instantiated right after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EagerInitialization {
    /// Instances are created on first lookup.
    #[default]
    Disabled,
    /// One after another, on the loading thread.
    Sequential,
    /// Spread over scoped worker threads. A dependency cycle spanning two
    /// workers blocks instead of being reported; use `Sequential` to find one.
    Parallel,
}

impl FromStr for EagerInitialization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "false" | "off" => Ok(Self::Disabled),
            "sequential" | "true" | "on" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            other => Err(format!("unknown eager initialization mode {other:?}")),
        }
    }
}

impl fmt::Display for EagerInitialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// Tunables of a container load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WireSettings {
    pub conditional_rounds_threshold: usize,
    pub debug_conditions: bool,
    pub eager_initialization: EagerInitialization,
    /// Default deadline for [`await_loaded`](crate::container::WireContainer::await_loaded).
    pub load_timeout: Option<Duration>,
}

impl Default for WireSettings {
    fn default() -> Self {
        Self {
            conditional_rounds_threshold: 10,
            debug_conditions: false,
            eager_initialization: EagerInitialization::Disabled,
            load_timeout: None,
        }
    }
}

impl WireSettings {
    pub fn from_environment(environment: &dyn Environment) -> Self {
        Self {
            conditional_rounds_threshold: CONDITIONAL_ROUNDS_THRESHOLD.read(environment),
            debug_conditions: DEBUG_CONDITIONS.read(environment),
            eager_initialization: EAGER_INITIALIZATION.read(environment),
            load_timeout: None,
        }
    }
}
