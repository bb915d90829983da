//! Resolver context for dependency injection.
//!
//! A `ResolverContext` is what factories receive: the container, the scope
//! instance the resolution runs in, and the chain of services currently under
//! construction. It is owned and cheap to clone, so factories may move it into
//! their futures.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use super::scope::{ScopeHandle, ScopeInner};
use super::Container;
use crate::error::{DiError, DiResult};
use crate::internal::ResolutionPath;
use crate::key::Key;
use crate::lifetime::{Lifetime, Scope};
use crate::registration::AnyArc;
use crate::traits::ResolverCore;

/// Context passed to factory functions for resolving dependencies.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use scopewire::{Provision, ProviderRegistry, Resolver, Scope, ScopeExit};
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut registry = ProviderRegistry::new();
/// registry.add_constant(Database { url: "sqlite::memory:".into() })?;
/// registry.add_scoped(Scope::Request, |ctx| async move {
///     // ctx is a ResolverContext running inside the REQUEST instance
///     let db = ctx.get::<Database>().await?;
///     Ok::<_, scopewire::BoxError>(Provision::new(UserService { db }))
/// })?;
///
/// let container = registry.build(None);
/// let request = container.enter(Scope::Request);
/// let users = request.get::<UserService>().await?;
/// assert_eq!(users.db.url, "sqlite::memory:");
/// request.close(ScopeExit::Completed).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResolverContext {
    container: Container,
    scope: Option<Arc<ScopeInner>>,
    path: ResolutionPath,
}

impl ResolverContext {
    pub(crate) fn new(container: Container, scope: Option<Arc<ScopeInner>>, path: ResolutionPath) -> Self {
        Self { container, scope, path }
    }

    /// The container this resolution belongs to.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Tag of the scope instance this context runs in, if any.
    pub fn scope(&self) -> Option<Scope> {
        self.scope.as_ref().map(|inner| inner.tag())
    }

    /// Handle to the scope instance this context runs in, for opening nested
    /// scopes.
    pub fn handle(&self) -> Option<ScopeHandle> {
        self.scope.clone().map(ScopeHandle::from_inner)
    }

    /// The resolution algorithm shared by every resolver.
    pub(crate) async fn resolve_key(&self, key: &Key) -> DiResult<AnyArc> {
        let service = key.display_name();
        let path = self.path.enter(service)?;
        let registration = self
            .container
            .lookup(key)
            .ok_or(DiError::NotFound(service))?;

        match registration.lifetime {
            Lifetime::Constant => {
                let ctx = ResolverContext::new(self.container.clone(), None, path);
                let provided = (registration.ctor)(ctx).await?;
                Ok(provided.value)
            }
            Lifetime::Transient => {
                if let Some(scope) = &self.scope {
                    scope.ensure_open()?;
                }
                let ctx = ResolverContext::new(self.container.clone(), self.scope.clone(), path);
                let provided = (registration.ctor)(ctx).await?;
                if let Some(teardown) = provided.teardown {
                    match &self.scope {
                        Some(scope) => scope.adopt(service, teardown).await?,
                        None => {
                            tracing::warn!(service, "transient teardown dropped: resolved outside any scope");
                        }
                    }
                }
                Ok(provided.value)
            }
            Lifetime::Scoped(tag) => {
                let owner = self
                    .scope
                    .as_ref()
                    .and_then(|inner| inner.nearest(tag))
                    .ok_or(DiError::ScopeNotActive { scope: tag, service })?;
                owner.get_or_create(*key, registration, path).await
            }
        }
    }
}

#[async_trait]
impl ResolverCore for ResolverContext {
    async fn resolve_any(&self, key: &Key) -> DiResult<Arc<dyn Any + Send + Sync>> {
        self.resolve_key(key).await
    }
}

impl std::fmt::Debug for ResolverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverContext")
            .field("scope", &self.scope())
            .field("depth", &self.path.depth())
            .finish()
    }
}
