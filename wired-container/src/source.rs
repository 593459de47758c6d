//! Where a container gets its providers from.
//!
//! Providers can be handed over explicitly with [`StaticProviderSource`] or
//! collected at link time from `inventory::submit!` blocks anywhere in the
//! binary with [`InventoryProviderSource`]:
//!
//! ```rust,ignore
//! fn mailer() -> ProviderRef {
//!     ProviderRef::new(SimpleProvider::lazy(|_| Ok(Arc::new(SmtpMailer))))
//! }
//!
//! inventory::submit! { ProviderRegistration::new(mailer) }
//! ```

use std::fmt;

use crate::provider::ProviderRef;

/// Yields the providers of one load pass.
pub trait ProviderSource: Send + Sync {
    fn providers(&self) -> Vec<ProviderRef>;
}

/// A fixed list of providers.
#[derive(Clone, Default)]
pub struct StaticProviderSource {
    providers: Vec<ProviderRef>,
}

impl StaticProviderSource {
    pub fn new(providers: Vec<ProviderRef>) -> Self {
        Self { providers }
    }

    pub fn push(&mut self, provider: ProviderRef) {
        self.providers.push(provider);
    }
}

impl ProviderSource for StaticProviderSource {
    fn providers(&self) -> Vec<ProviderRef> {
        self.providers.clone()
    }
}

impl fmt::Debug for StaticProviderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticProviderSource")
            .field("providers", &self.providers.len())
            .finish()
    }
}

/// A provider constructor submitted with `inventory::submit!`.
pub struct ProviderRegistration {
    create: fn() -> ProviderRef,
}

impl ProviderRegistration {
    pub const fn new(create: fn() -> ProviderRef) -> Self {
        Self { create }
    }

    pub fn create(&self) -> ProviderRef {
        (self.create)()
    }
}

inventory::collect!(ProviderRegistration);

/// Every [`ProviderRegistration`] linked into the binary.
///
/// Each load calls the constructors again, so every container gets its
/// own provider instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct InventoryProviderSource;

impl ProviderSource for InventoryProviderSource {
    fn providers(&self) -> Vec<ProviderRef> {
        inventory::iter::<ProviderRegistration>
            .into_iter()
            .map(ProviderRegistration::create)
            .collect()
    }
}
