//! Provider module system for modular registration.
//!
//! Each package of the application contributes its providers through one
//! [`ProviderModule`]; bootstrap runs every module before the first resolution.

use super::ProviderRegistry;
use crate::error::DiResult;

/// A group of providers registered together.
///
/// # Example
///
/// ```rust
/// use scopewire::{DiResult, ProviderModule, ProviderRegistry, Provision, Scope};
///
/// struct Clock;
/// struct AuditLog;
///
/// struct AuditModule;
///
/// impl ProviderModule for AuditModule {
///     fn register(&self, registry: &mut ProviderRegistry) -> DiResult<()> {
///         registry.add_constant(Clock)?;
///         registry.add_scoped(Scope::Request, |_| async { Ok(Provision::new(AuditLog)) })?;
///         Ok(())
///     }
/// }
///
/// # fn main() -> DiResult<()> {
/// let mut registry = ProviderRegistry::new();
/// registry.add_module(&AuditModule)?;
/// assert!(registry.contains::<AuditLog>());
///
/// // registering the same module twice is a duplicate
/// assert!(registry.add_module(&AuditModule).is_err());
/// # Ok(())
/// # }
/// ```
pub trait ProviderModule {
    /// Register this module's providers.
    fn register(&self, registry: &mut ProviderRegistry) -> DiResult<()>;
}

impl ProviderRegistry {
    /// Runs a module against this registry.
    pub fn add_module<M: ProviderModule + ?Sized>(&mut self, module: &M) -> DiResult<&mut Self> {
        module.register(self)?;
        Ok(self)
    }
}
