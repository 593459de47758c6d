//! # wired: Dependency Injection Container for Rust
//!
//! Register providers, gate them with load conditions, and let the
//! container resolve them by type, qualifier and generic arguments.
//!
//! ```rust
//! use wired::prelude::*;
//!
//! let container = WireContainer::builder()
//!     .provider(SimpleProvider::singleton(String::from("postgres://localhost")))
//!     .provider(SimpleProvider::lazy(|r| Ok(r.get::<String>()?.len())))
//!     .environment(MapEnvironment::new())
//!     .build();
//!
//! assert_eq!(container.get::<usize>().unwrap(), 20);
//! ```

pub use wired_container::*;
pub use wired_support::*;
