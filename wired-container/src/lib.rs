//! Core container implementation for wired.
//!
//! Providers describe what they produce; the container registers them into
//! scopes, converges conditional providers over repeated rounds and serves
//! lookups by type, qualifier and generic arguments.

pub mod cache;
pub mod catalog;
pub mod condition;
pub mod container;
pub mod environment;
pub mod error;
pub mod initializer;
pub mod key;
pub mod provider;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod scope;
pub mod settings;
pub mod source;
pub mod type_id;

pub use container::{WireContainer, WireContainerBuilder, prelude};
pub use error::{Result, WireError};
pub use key::{QualifiedTypeIdentifier, Qualifier};
pub use provider::{IdentifiableProvider, ProviderRef, SimpleProvider};
pub use scope::{Scope, ScopeKey};
pub use type_id::TypeIdentifier;

// `inventory::submit!` in downstream crates names this path.
pub use inventory;
