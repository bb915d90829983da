//! Internal teardown bag for scope instances.

use futures::future::BoxFuture;

use crate::error::{BoxError, DiError};
use crate::lifetime::{Scope, ScopeExit};

/// A teardown hook registered by a provider.
pub(crate) type Teardown = Box<dyn FnOnce(ScopeExit) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Container for teardown hooks with LIFO execution order.
#[derive(Default)]
pub(crate) struct DisposeBag {
    hooks: Vec<(&'static str, Teardown)>,
}

impl DisposeBag {
    /// Add a teardown hook for the named service.
    pub(crate) fn push(&mut self, service: &'static str, hook: Teardown) {
        self.hooks.push((service, hook));
    }

    /// Take every hook out of the bag, newest first.
    pub(crate) fn drain_reverse(&mut self) -> Vec<(&'static str, Teardown)> {
        let mut hooks = std::mem::take(&mut self.hooks);
        hooks.reverse();
        hooks
    }
}

/// Runs the hooks in the given order. Every hook runs; the first failure wins.
pub(crate) async fn run_all(
    scope: Scope,
    hooks: Vec<(&'static str, Teardown)>,
    exit: ScopeExit,
) -> Result<(), DiError> {
    let mut first_error = None;
    for (service, hook) in hooks {
        if let Err(err) = hook(exit).await {
            tracing::error!(%scope, service, error = %err, "teardown failed");
            if first_error.is_none() {
                first_error = Some(DiError::teardown(scope, err));
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
