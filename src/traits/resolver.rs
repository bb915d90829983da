//! Resolver traits for service resolution.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DiError, DiResult};
use crate::key::{key_of_type, Key};

/// Core resolver trait for object-safe service resolution.
///
/// Implemented by [`Container`](crate::Container) (root, no scope),
/// [`ScopeHandle`](crate::ScopeHandle), [`ScopeGuard`](crate::ScopeGuard) and
/// the [`ResolverContext`](crate::ResolverContext) handed to factories. Most
/// callers use [`Resolver::get`] instead.
#[async_trait]
pub trait ResolverCore: Send + Sync {
    /// Resolves the provider registered under `key` as a type-erased `Arc`.
    ///
    /// # Errors
    ///
    /// * `NotFound` when nothing is registered for the key
    /// * `ScopeNotActive` when the provider's scope has no enclosing instance
    /// * `Circular` / `DepthExceeded` for runaway dependency chains
    /// * `Factory` when the provider's factory fails
    async fn resolve_any(&self, key: &Key) -> DiResult<Arc<dyn Any + Send + Sync>>;
}

/// High-level resolver interface with generic, type-safe methods.
///
/// Blanket-implemented for every [`ResolverCore`].
///
/// # Examples
///
/// ```rust
/// use scopewire::{ProviderRegistry, Resolver, Scope};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> scopewire::DiResult<()> {
/// let mut registry = ProviderRegistry::new();
/// registry.add_constant(String::from("hello"))?;
/// let container = registry.build(None);
///
/// let greeting = container.get::<String>().await?;
/// assert_eq!(greeting.as_str(), "hello");
///
/// let scope = container.enter(Scope::Request);
/// assert_eq!(scope.get::<String>().await?.as_str(), "hello");
/// scope.close(scopewire::ScopeExit::Completed).await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Resolver: ResolverCore {
    /// Resolves a concrete type.
    async fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let key = key_of_type::<T>();
        let any = self.resolve_any(&key).await?;
        any.downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(key.display_name()))
    }
}

impl<R: ResolverCore> Resolver for R {}
