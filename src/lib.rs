//! # scopewire
//!
//! Scope-aware service wiring for an axum API, a clap CLI and a sqlx database.
//!
//! ## Features
//!
//! - **Two scopes**: `LIFESPAN` (one per process run) and `REQUEST` (one per
//!   HTTP call or CLI command), nested
//! - **Async providers**: constant, transient and scoped providers built by
//!   async factories, each with an optional teardown
//! - **Ordered teardown**: resources are released in reverse creation order and
//!   learn whether their scope completed or failed
//! - **Profiles**: a provider can be registered per runtime profile, falling
//!   back to the default registration
//! - **Overrides**: tests replace providers for as long as a guard lives
//!
//! ## Quick Start
//!
//! ```rust
//! use scopewire::{ProviderRegistry, Provision, Resolver, Scope, ScopeExit};
//!
//! struct Pool {
//!     url: String,
//! }
//!
//! struct Repository {
//!     pool: std::sync::Arc<Pool>,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), scopewire::BoxError> {
//! let mut registry = ProviderRegistry::new();
//! registry
//!     .add_scoped(Scope::Lifespan, |_| async {
//!         Ok(Provision::new(Pool { url: "sqlite::memory:".into() }))
//!     })?
//!     .add_scoped(Scope::Request, |ctx| async move {
//!         let pool = ctx.get::<Pool>().await?;
//!         Ok::<_, scopewire::BoxError>(Provision::new(Repository { pool }))
//!     })?;
//! let container = registry.build(None);
//!
//! let lifespan = container.enter(Scope::Lifespan);
//! let request = lifespan.handle().enter(Scope::Request)?;
//! let repo = request.handle().get::<Repository>().await?;
//! assert_eq!(repo.pool.url, "sqlite::memory:");
//!
//! request.close(ScopeExit::Completed).await?;
//! lifespan.close(ScopeExit::Completed).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Provider Lifetimes
//!
//! - **Constant**: built once when first requested, shared everywhere
//! - **Transient**: built on every resolution; a teardown is owned by the
//!   innermost open scope
//! - **Scoped**: built once per instance of its scope, resolvable only while
//!   such an instance encloses the resolution
//!
//! ## Application surfaces
//!
//! [`bootstrap`] builds the container from [`Settings`]. The [`api`] module
//! serves routers with one `REQUEST` instance per call, the [`cli`] module runs
//! commands through an [`Entrypoint`], and [`testing`] swaps in test doubles.

pub mod api;
pub mod cli;
pub mod collection;
pub mod database;
pub mod entrypoint;
pub mod error;
pub mod key;
pub mod lifetime;
pub mod logging;
pub mod provider;
pub mod settings;
pub mod testing;
pub mod traits;

mod internal;
mod registration;

pub use api::{
    Api, ApiBuilder, ApiError, Inject, RequestFailed, RequestScope, RunningApi, ValidatedJson, ValidatedQuery,
};
pub use cli::{Cli, CliApp, CliBuilder};
pub use collection::{ProfileRegistrar, ProviderModule, ProviderRegistry};
pub use database::{DatabaseModule, Engine, Session, SessionError};
pub use entrypoint::{bootstrap, bootstrap_with, Entrypoint};
pub use error::{BoxError, DiError, DiResult, Error, Result};
pub use key::{key_of_type, Key};
pub use lifetime::{Lifetime, Scope, ScopeExit};
pub use provider::{Container, OverrideGuard, ResolverContext, ScopeGuard, ScopeHandle};
pub use registration::Provision;
pub use settings::{ConfigError, DatabaseSettings, Profile, Settings};
pub use traits::{Resolver, ResolverCore};
