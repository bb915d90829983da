//! Error types for the scope container and the crate as a whole.

use std::sync::Arc;

use crate::lifetime::Scope;
use crate::settings::{ConfigError, Profile};

/// Boxed error returned by provider factories and teardowns.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependency injection errors
///
/// Represents the wiring defects and lifecycle violations that can occur
/// while registering providers, resolving them, or tearing scopes down.
///
/// # Examples
///
/// ```rust
/// use scopewire::{DiError, Scope};
///
/// let err = DiError::ScopeNotActive { scope: Scope::Lifespan, service: "app::Engine" };
/// assert_eq!(
///     err.to_string(),
///     "app::Engine requires an active lifespan scope, but none encloses this resolution"
/// );
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiError {
    /// No provider registered for the type
    #[error("Service not found: {0}")]
    NotFound(&'static str),
    /// Type downcast failed
    #[error("Type mismatch for: {0}")]
    TypeMismatch(&'static str),
    /// Circular dependency detected (includes path)
    #[error("Circular dependency: {}", .0.join(" -> "))]
    Circular(Vec<&'static str>),
    /// Maximum resolution depth exceeded
    #[error("Max depth {0} exceeded")]
    DepthExceeded(usize),
    /// A scoped provider was requested with no enclosing instance of its scope
    #[error("{service} requires an active {scope} scope, but none encloses this resolution")]
    ScopeNotActive {
        scope: Scope,
        service: &'static str,
    },
    /// The scope instance was already closed
    #[error("{0} scope is already closed")]
    ScopeClosed(Scope),
    /// A second provider was registered for the same type and profile
    #[error("{service} already has a provider{}", profile_suffix(.profile))]
    DuplicateProvider {
        service: &'static str,
        profile: Option<Profile>,
    },
    /// A provider factory failed
    #[error("failed to construct {service}: {source}")]
    Factory {
        service: &'static str,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },
    /// One or more teardowns failed while a scope was closing
    #[error("teardown of {scope} scope failed: {source}")]
    Teardown {
        scope: Scope,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },
}

fn profile_suffix(profile: &Option<Profile>) -> String {
    match profile {
        Some(profile) => format!(" for profile {profile}"),
        None => String::new(),
    }
}

impl DiError {
    pub(crate) fn factory(service: &'static str, source: BoxError) -> Self {
        DiError::Factory {
            service,
            source: Arc::from(source),
        }
    }

    pub(crate) fn teardown(scope: Scope, source: BoxError) -> Self {
        DiError::Teardown {
            scope,
            source: Arc::from(source),
        }
    }
}

/// Result type for DI operations
pub type DiResult<T> = Result<T, DiError>;

/// Errors surfaced by the scaffold's entrypoints.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Di(#[from] DiError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Session(#[from] crate::database::SessionError),
    #[error(transparent)]
    Cli(#[from] clap::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for entrypoint operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
