//! The container and its scope instances.
//!
//! A [`Container`] is the frozen result of a
//! [`ProviderRegistry`](crate::ProviderRegistry): one provider per type, chosen
//! for the active profile. It is cheap to clone and is passed explicitly
//! through the call chain; there is no global registry.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{BoxError, DiResult};
use crate::internal::ResolutionPath;
use crate::key::{key_of_type, Key};
use crate::lifetime::{Lifetime, Scope};
use crate::registration::{Provision, Registration, Registry};
use crate::settings::Profile;
use crate::traits::ResolverCore;

pub mod context;
pub mod scope;

pub use context::ResolverContext;
pub use scope::{ScopeGuard, ScopeHandle};

/// Resolves registered providers and opens scope instances.
///
/// Resolving directly from the container runs outside any scope: constants
/// and transients work, scoped providers fail with
/// [`DiError::ScopeNotActive`](crate::DiError::ScopeNotActive).
///
/// # Examples
///
/// ```rust
/// use scopewire::{DiError, Provision, ProviderRegistry, Resolver, Scope, ScopeExit};
///
/// struct Engine;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut registry = ProviderRegistry::new();
/// registry.add_scoped(Scope::Lifespan, |_| async { Ok(Provision::new(Engine)) })?;
/// let container = registry.build(None);
///
/// assert!(matches!(
///     container.get::<Engine>().await,
///     Err(DiError::ScopeNotActive { scope: Scope::Lifespan, .. })
/// ));
///
/// let lifespan = container.enter(Scope::Lifespan);
/// lifespan.get::<Engine>().await?;
/// lifespan.close(ScopeExit::Completed).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    providers: AHashMap<Key, Arc<Registration>>,
    overrides: RwLock<AHashMap<Key, Vec<(u64, Arc<Registration>)>>>,
    next_override: AtomicU64,
    profile: Option<Profile>,
}

impl Container {
    pub(crate) fn from_registry(registry: Registry, profile: Option<Profile>) -> Self {
        let providers = registry.select(profile);
        tracing::debug!(providers = providers.len(), profile = ?profile, "container built");
        Self {
            inner: Arc::new(ContainerInner {
                providers,
                overrides: RwLock::new(AHashMap::new()),
                next_override: AtomicU64::new(1),
                profile,
            }),
        }
    }

    /// The profile the container was built for.
    pub fn profile(&self) -> Option<Profile> {
        self.inner.profile
    }

    /// Opens a root scope instance.
    pub fn enter(&self, scope: Scope) -> ScopeGuard {
        ScopeGuard::open(self.clone(), None, scope)
    }

    /// A resolver context outside any scope.
    pub fn context(&self) -> ResolverContext {
        ResolverContext::new(self.clone(), None, ResolutionPath::default())
    }

    /// Whether a provider (or an override) exists for `T`.
    pub fn contains<T: 'static>(&self) -> bool {
        self.lookup(&key_of_type::<T>()).is_some()
    }

    /// The provider for `key`, overrides first.
    pub(crate) fn lookup(&self, key: &Key) -> Option<Arc<Registration>> {
        if let Some(stack) = self.inner.overrides.read().get(key) {
            if let Some((_, registration)) = stack.last() {
                return Some(registration.clone());
            }
        }
        self.inner.providers.get(key).cloned()
    }

    /// Replaces the provider for `T` with a constant until the guard drops.
    pub fn override_constant<T: Send + Sync + 'static>(&self, value: T) -> OverrideGuard {
        self.push_override(key_of_type::<T>(), Registration::constant(value))
    }

    /// Replaces the provider for `T` with a transient factory until the guard
    /// drops.
    pub fn override_transient<T, F, Fut>(&self, factory: F) -> OverrideGuard
    where
        T: Send + Sync + 'static,
        F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Provision<T>, BoxError>> + Send + 'static,
    {
        self.push_override(
            key_of_type::<T>(),
            Registration::factory(Lifetime::Transient, factory),
        )
    }

    /// Replaces the provider for `T` with a factory bound to `scope` until the
    /// guard drops.
    pub fn override_scoped<T, F, Fut>(&self, scope: Scope, factory: F) -> OverrideGuard
    where
        T: Send + Sync + 'static,
        F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Provision<T>, BoxError>> + Send + 'static,
    {
        self.push_override(
            key_of_type::<T>(),
            Registration::factory(Lifetime::Scoped(scope), factory),
        )
    }

    fn push_override(&self, key: Key, registration: Registration) -> OverrideGuard {
        let id = self.inner.next_override.fetch_add(1, Ordering::Relaxed);
        self.inner
            .overrides
            .write()
            .entry(key)
            .or_default()
            .push((id, Arc::new(registration)));
        tracing::debug!(service = key.display_name(), "provider overridden");
        OverrideGuard {
            container: self.clone(),
            key,
            id,
        }
    }
}

#[async_trait]
impl ResolverCore for Container {
    async fn resolve_any(&self, key: &Key) -> DiResult<Arc<dyn Any + Send + Sync>> {
        self.context().resolve_key(key).await
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("providers", &self.inner.providers.len())
            .field("profile", &self.inner.profile)
            .finish()
    }
}

/// Keeps a provider override installed; dropping it restores what was there
/// before.
///
/// Guards may be dropped in any order: each removes exactly its own entry.
#[must_use = "the override is removed as soon as the guard is dropped"]
pub struct OverrideGuard {
    container: Container,
    key: Key,
    id: u64,
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        let mut overrides = self.container.inner.overrides.write();
        if let Some(stack) = overrides.get_mut(&self.key) {
            stack.retain(|(id, _)| *id != self.id);
            if stack.is_empty() {
                overrides.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ProviderRegistry;
    use crate::traits::Resolver;

    #[tokio::test]
    async fn test_overrides_stack_and_restore() {
        let mut registry = ProviderRegistry::new();
        registry.add_constant(1u32).unwrap();
        let container = registry.build(None);

        let outer = container.override_constant(2u32);
        let inner = container.override_constant(3u32);
        assert_eq!(*container.get::<u32>().await.unwrap(), 3);

        drop(outer);
        assert_eq!(*container.get::<u32>().await.unwrap(), 3);
        drop(inner);
        assert_eq!(*container.get::<u32>().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_override_of_unregistered_type() {
        let container = ProviderRegistry::new().build(None);
        assert!(!container.contains::<String>());

        let guard = container.override_transient(|_| async { Ok(Provision::new(String::from("stub"))) });
        assert_eq!(container.get::<String>().await.unwrap().as_str(), "stub");
        drop(guard);
        assert!(!container.contains::<String>());
    }
}
