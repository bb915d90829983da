//! Bootstrap and the scope bracket around one unit of work.
//!
//! [`bootstrap`] turns [`Settings`] into a [`Container`]: it registers the
//! settings as a constant, runs every provider module, and selects providers
//! for the configured profile. [`Entrypoint`] then brackets a body with a
//! `LIFESPAN` instance and a nested `REQUEST` instance, closing both with the
//! body's outcome.

use std::future::Future;
use std::path::PathBuf;

use crate::cli::apps::db::DbAdminModule;
use crate::collection::{ProviderModule, ProviderRegistry};
use crate::database::DatabaseModule;
use crate::error::{DiResult, Result};
use crate::lifetime::Scope;
use crate::provider::{Container, ResolverContext};
use crate::settings::{Settings, DEFAULT_ENV_FILE};

/// Builds the application container from `settings`.
pub fn bootstrap(settings: Settings) -> DiResult<Container> {
    bootstrap_with(settings, &[])
}

/// Like [`bootstrap`], with extra modules registered after the built-in ones.
pub fn bootstrap_with(settings: Settings, modules: &[&dyn ProviderModule]) -> DiResult<Container> {
    let profile = settings.profile;
    let mut registry = ProviderRegistry::new();
    registry
        .add_constant(settings)?
        .add_module(&DatabaseModule)?
        .add_module(&DbAdminModule)?;
    for module in modules {
        registry.add_module(*module)?;
    }
    if let Some(profile) = profile {
        tracing::debug!(%profile, "profile loaded");
    }
    Ok(registry.build(profile))
}

enum Source {
    EnvFile(PathBuf),
    Ready(Container),
}

/// Runs bodies inside a fresh `LIFESPAN` + `REQUEST` bracket.
///
/// Built from an env file, settings are only read when a body actually runs,
/// so argument parsing and `--help` work without any configuration.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Entrypoint, ProviderRegistry, Provision, Resolver, Scope};
///
/// struct Greeter;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> scopewire::Result<()> {
/// let mut registry = ProviderRegistry::new();
/// registry.add_scoped(Scope::Request, |_| async { Ok(Provision::new(Greeter)) })?;
/// let entrypoint = Entrypoint::with_container(registry.build(None));
///
/// let scope = entrypoint
///     .run(|ctx| async move {
///         ctx.get::<Greeter>().await?;
///         Ok(ctx.scope())
///     })
///     .await?;
/// assert_eq!(scope, Some(Scope::Request));
/// # Ok(())
/// # }
/// ```
pub struct Entrypoint {
    source: Source,
}

impl Entrypoint {
    /// Loads settings from `path` (overlaid by the process environment) on
    /// each run.
    pub fn from_env_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::EnvFile(path.into()),
        }
    }

    /// Reads the default `.env` file.
    pub fn from_default_env() -> Self {
        Self::from_env_file(DEFAULT_ENV_FILE)
    }

    /// Uses an already built container.
    pub fn with_container(container: Container) -> Self {
        Self {
            source: Source::Ready(container),
        }
    }

    /// The container bodies run against, bootstrapping it if needed.
    pub fn container(&self) -> Result<Container> {
        match &self.source {
            Source::Ready(container) => Ok(container.clone()),
            Source::EnvFile(path) => {
                let settings = Settings::load(path)?;
                crate::logging::init(settings.debug);
                Ok(bootstrap(settings)?)
            }
        }
    }

    /// Opens `LIFESPAN`, then `REQUEST`, runs `body`, and closes both with the
    /// body's outcome. A failing body is returned after both scopes are torn
    /// down.
    pub async fn run<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(ResolverContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let container = self.container()?;
        let lifespan = container.enter(Scope::Lifespan);
        let parent = lifespan.handle();
        lifespan
            .run(|_| async move {
                let request = parent.enter(Scope::Request)?;
                request.run(body).await
            })
            .await
    }

    /// [`run`](Entrypoint::run) on a dedicated multi-thread runtime.
    ///
    /// Must not be called from inside another tokio runtime.
    pub fn block_on<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(ResolverContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run(body))
    }
}

impl std::fmt::Debug for Entrypoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Source::EnvFile(path) => f.debug_tuple("Entrypoint").field(path).finish(),
            Source::Ready(container) => f.debug_tuple("Entrypoint").field(container).finish(),
        }
    }
}
