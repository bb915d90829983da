//! Scope instances and their lifecycle.
//!
//! Every time a boundary is crossed (server start, one HTTP request, one CLI
//! command) a new instance of a [`Scope`] is opened. The instance caches the
//! providers bound to its tag, collects their teardowns, and runs those
//! teardowns newest-first when it closes.
//!
//! Instances form a chain through their parents. A provider bound to
//! `Scope::Lifespan` and requested from inside a `REQUEST` instance is looked
//! up in the nearest enclosing `LIFESPAN` instance, and its own dependencies
//! are resolved from there as well.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use super::{Container, ResolverContext};
use crate::error::{DiError, DiResult};
use crate::internal::dispose_bag::run_all;
use crate::internal::{DisposeBag, ResolutionPath, Teardown};
use crate::key::Key;
use crate::lifetime::{Scope, ScopeExit};
use crate::registration::{AnyArc, Registration};
use crate::traits::ResolverCore;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// State of one open (or closed) scope instance.
pub(crate) struct ScopeInner {
    tag: Scope,
    id: u64,
    container: Container,
    parent: Option<Arc<ScopeInner>>,
    cache: Mutex<AHashMap<Key, Arc<OnceCell<AnyArc>>>>,
    teardowns: Mutex<DisposeBag>,
    closed: AtomicBool,
}

impl ScopeInner {
    fn open(container: Container, parent: Option<Arc<ScopeInner>>, tag: Scope) -> Arc<Self> {
        let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(scope = %tag, id, nested = parent.is_some(), "scope opened");
        Arc::new(Self {
            tag,
            id,
            container,
            parent,
            cache: Mutex::new(AHashMap::new()),
            teardowns: Mutex::new(DisposeBag::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn tag(&self) -> Scope {
        self.tag
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> DiResult<()> {
        if self.is_closed() {
            return Err(DiError::ScopeClosed(self.tag));
        }
        Ok(())
    }

    /// Nearest instance in the chain (self included) carrying `tag`.
    pub(crate) fn nearest(self: &Arc<Self>, tag: Scope) -> Option<Arc<ScopeInner>> {
        let mut current = Some(self.clone());
        while let Some(inner) = current {
            if inner.tag == tag {
                return Some(inner);
            }
            current = inner.parent.clone();
        }
        None
    }

    /// Resolves a provider cached in this instance, constructing it at most once.
    pub(crate) async fn get_or_create(
        self: &Arc<Self>,
        key: Key,
        registration: Arc<Registration>,
        path: ResolutionPath,
    ) -> DiResult<AnyArc> {
        self.ensure_open()?;
        let cell = self.cache.lock().entry(key).or_default().clone();

        let value = cell
            .get_or_try_init(|| async {
                let ctx = ResolverContext::new(self.container.clone(), Some(self.clone()), path);
                let provided = (registration.ctor)(ctx).await?;
                if let Some(teardown) = provided.teardown {
                    self.adopt(key.display_name(), teardown).await?;
                }
                Ok::<AnyArc, DiError>(provided.value)
            })
            .await?;
        Ok(value.clone())
    }

    /// Takes ownership of a teardown. If the instance closed while the value
    /// was being built, the teardown runs right away as a failure.
    pub(crate) async fn adopt(&self, service: &'static str, teardown: Teardown) -> DiResult<()> {
        let rejected = {
            let mut bag = self.teardowns.lock();
            if self.is_closed() {
                Some(teardown)
            } else {
                bag.push(service, teardown);
                None
            }
        };

        match rejected {
            None => Ok(()),
            Some(teardown) => {
                if let Err(err) = teardown(ScopeExit::Failed).await {
                    tracing::error!(scope = %self.tag, service, error = %err, "teardown failed");
                }
                Err(DiError::ScopeClosed(self.tag))
            }
        }
    }

    /// Marks the instance closed and hands back its teardowns, newest first.
    /// Returns `None` when it was already closed.
    fn begin_close(&self) -> Option<Vec<(&'static str, Teardown)>> {
        let hooks = {
            let mut bag = self.teardowns.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return None;
            }
            bag.drain_reverse()
        };
        self.cache.lock().clear();
        Some(hooks)
    }

    async fn shutdown(&self, exit: ScopeExit) -> DiResult<()> {
        let Some(hooks) = self.begin_close() else {
            return Ok(());
        };
        tracing::debug!(scope = %self.tag, id = self.id, ?exit, teardowns = hooks.len(), "scope closing");
        // The hooks are already out of the bag, so they run on their own task
        // and finish even if the caller stops polling.
        let tag = self.tag;
        tokio::spawn(run_all(tag, hooks, exit))
            .await
            .unwrap_or_else(|err| Err(DiError::teardown(tag, Box::new(err))))
    }
}

/// Owner of an open scope instance.
///
/// Close it with [`close`](ScopeGuard::close), or let [`run`](ScopeGuard::run)
/// bracket a body. A guard dropped while still open (for example because the
/// task holding it was cancelled) tears its instance down as
/// [`ScopeExit::Failed`] on the current tokio runtime.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Provision, ProviderRegistry, Resolver, Scope, ScopeExit};
/// use std::sync::Arc;
///
/// struct RequestId(u64);
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut registry = ProviderRegistry::new();
/// registry.add_scoped(Scope::Request, |_| async { Ok(Provision::new(RequestId(7))) })?;
/// let container = registry.build(None);
///
/// let request = container.enter(Scope::Request);
/// let a = request.get::<RequestId>().await?;
/// let b = request.get::<RequestId>().await?;
/// assert!(Arc::ptr_eq(&a, &b));
/// request.close(ScopeExit::Completed).await?;
/// # Ok(())
/// # }
/// ```
pub struct ScopeGuard {
    handle: ScopeHandle,
    finished: bool,
}

impl ScopeGuard {
    pub(crate) fn open(container: Container, parent: Option<Arc<ScopeInner>>, tag: Scope) -> Self {
        Self {
            handle: ScopeHandle::from_inner(ScopeInner::open(container, parent, tag)),
            finished: false,
        }
    }

    /// The tag of this instance.
    pub fn tag(&self) -> Scope {
        self.handle.tag()
    }

    /// A cloneable handle for resolving and nesting while the guard stays put.
    pub fn handle(&self) -> ScopeHandle {
        self.handle.clone()
    }

    /// A resolver context rooted in this instance.
    pub fn context(&self) -> ResolverContext {
        self.handle.context()
    }

    /// Closes the instance, running every teardown newest-first with `exit`.
    ///
    /// Every teardown runs even when an earlier one fails; the first failure
    /// is returned as [`DiError::Teardown`]. Closing twice is a no-op.
    ///
    /// Once started, the teardowns run to completion on a spawned task, so
    /// dropping this future (for example under a timeout) does not skip them.
    pub async fn close(mut self, exit: ScopeExit) -> DiResult<()> {
        self.finished = true;
        self.handle.inner.shutdown(exit).await
    }

    /// Runs `body` inside this instance and closes it with the body's outcome.
    ///
    /// The body's error wins over a teardown error. If the body succeeds but
    /// a teardown fails, the teardown error is returned.
    pub async fn run<F, Fut, T, E>(self, body: F) -> Result<T, E>
    where
        F: FnOnce(ResolverContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DiError>,
    {
        let tag = self.tag();
        let result = body(self.context()).await;
        let closed = self.close(ScopeExit::of(&result)).await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(teardown)) => Err(teardown.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(teardown)) => {
                tracing::warn!(scope = %tag, error = %teardown, "teardown also failed after body error");
                Err(err)
            }
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let inner = &self.handle.inner;
        let Some(hooks) = inner.begin_close() else {
            return;
        };
        if hooks.is_empty() {
            return;
        }

        let tag = inner.tag;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!(scope = %tag, teardowns = hooks.len(), "scope dropped while open, tearing down as failed");
                runtime.spawn(async move {
                    // run_all logs each failure
                    let _ = run_all(tag, hooks, ScopeExit::Failed).await;
                });
            }
            Err(_) => {
                tracing::warn!(scope = %tag, teardowns = hooks.len(), "scope dropped outside a tokio runtime, teardowns skipped");
            }
        }
    }
}

#[async_trait]
impl ResolverCore for ScopeGuard {
    async fn resolve_any(&self, key: &Key) -> DiResult<Arc<dyn Any + Send + Sync>> {
        self.handle.resolve_any(key).await
    }
}

/// Shared, cloneable reference to a scope instance.
///
/// Handles can resolve and open nested instances but cannot close the
/// instance they point to; only its [`ScopeGuard`] can.
#[derive(Clone)]
pub struct ScopeHandle {
    inner: Arc<ScopeInner>,
}

impl ScopeHandle {
    pub(crate) fn from_inner(inner: Arc<ScopeInner>) -> Self {
        Self { inner }
    }

    pub fn tag(&self) -> Scope {
        self.inner.tag
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn container(&self) -> &Container {
        &self.inner.container
    }

    /// Opens a nested instance whose parent is this one.
    ///
    /// # Errors
    ///
    /// `ScopeClosed` when this instance is already closed.
    pub fn enter(&self, tag: Scope) -> DiResult<ScopeGuard> {
        self.inner.ensure_open()?;
        Ok(ScopeGuard::open(
            self.inner.container.clone(),
            Some(self.inner.clone()),
            tag,
        ))
    }

    /// A resolver context rooted in this instance.
    pub fn context(&self) -> ResolverContext {
        ResolverContext::new(
            self.inner.container.clone(),
            Some(self.inner.clone()),
            ResolutionPath::default(),
        )
    }
}

#[async_trait]
impl ResolverCore for ScopeHandle {
    async fn resolve_any(&self, key: &Key) -> DiResult<Arc<dyn Any + Send + Sync>> {
        self.context().resolve_key(key).await
    }
}

impl std::fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("tag", &self.inner.tag)
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ProviderRegistry;

    #[tokio::test]
    async fn test_nearest_walks_to_matching_ancestor() {
        let container = ProviderRegistry::new().build(None);
        let lifespan = container.enter(Scope::Lifespan);
        let request = lifespan.handle().enter(Scope::Request).unwrap();

        let found = request.handle().inner.nearest(Scope::Lifespan).unwrap();
        assert!(Arc::ptr_eq(&found, &lifespan.handle().inner));
        assert!(request.handle().inner.nearest(Scope::Request).is_some());

        request.close(ScopeExit::Completed).await.unwrap();
        lifespan.close(ScopeExit::Completed).await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_instance_refuses_children() {
        let container = ProviderRegistry::new().build(None);
        let lifespan = container.enter(Scope::Lifespan);
        let handle = lifespan.handle();
        lifespan.close(ScopeExit::Completed).await.unwrap();

        assert!(handle.is_closed());
        assert!(matches!(
            handle.enter(Scope::Request),
            Err(DiError::ScopeClosed(Scope::Lifespan))
        ));
    }
}
