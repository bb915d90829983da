//! Database engine and per-request sessions.
//!
//! [`DatabaseModule`] registers two providers:
//!
//! - an [`Engine`] bound to `Scope::Lifespan`: one lazily connected pool per
//!   lifespan instance, closed when that instance closes;
//! - a [`Session`] bound to `Scope::Request`: one transaction per request
//!   instance, committed when the request completes and rolled back when it
//!   fails.
//!
//! Both go through sqlx's `Any` driver so the same code runs against
//! PostgreSQL in production and SQLite in tests.

use std::sync::Arc;

use sqlx::any::AnyPoolOptions;
use sqlx::{Any, AnyConnection, AnyPool, Transaction};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::collection::{ProviderModule, ProviderRegistry};
use crate::error::{BoxError, DiResult};
use crate::lifetime::{Scope, ScopeExit};
use crate::provider::ResolverContext;
use crate::registration::Provision;
use crate::settings::Settings;
use crate::traits::Resolver;

/// Session-level failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session transaction already finished")]
    Finished,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Shared connection pool.
#[derive(Debug, Clone)]
pub struct Engine {
    pool: AnyPool,
}

impl Engine {
    /// Builds a pool that connects on first use. Only a malformed URL fails
    /// here; an unreachable server fails the first query.
    pub fn connect_lazy(url: &str) -> Result<Self, sqlx::Error> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().connect_lazy(url)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Starts a transaction on a pooled connection.
    pub async fn begin(&self) -> Result<Transaction<'static, Any>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Closes the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// One unit of work: a single transaction on one pooled connection.
///
/// Statements go through [`connection`](Session::connection), which hands out
/// the connection to one caller at a time.
///
/// ```rust,no_run
/// # async fn demo(session: &scopewire::Session) -> Result<(), scopewire::database::SessionError> {
/// let mut conn = session.connection().await?;
/// sqlx::query("INSERT INTO audit (message) VALUES ('hello')")
///     .execute(&mut *conn)
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    engine: Arc<Engine>,
    tx: Mutex<Option<Transaction<'static, Any>>>,
}

impl Session {
    /// Checks out a connection from `engine` and begins a transaction.
    pub async fn begin(engine: Arc<Engine>) -> Result<Self, sqlx::Error> {
        let tx = engine.begin().await?;
        tracing::debug!("session transaction started");
        Ok(Self {
            engine,
            tx: Mutex::new(Some(tx)),
        })
    }

    /// The engine this session was opened on.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Exclusive access to the transaction's connection.
    pub async fn connection(&self) -> Result<MappedMutexGuard<'_, AnyConnection>, SessionError> {
        let guard = self.tx.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_mut().map(|tx| &mut **tx))
            .map_err(|_| SessionError::Finished)
    }

    /// Whether the transaction is still open.
    pub async fn is_active(&self) -> bool {
        self.tx.lock().await.is_some()
    }

    pub async fn commit(&self) -> Result<(), SessionError> {
        let tx = self.tx.lock().await.take().ok_or(SessionError::Finished)?;
        tx.commit().await?;
        tracing::debug!("session committed");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<(), SessionError> {
        let tx = self.tx.lock().await.take().ok_or(SessionError::Finished)?;
        tx.rollback().await?;
        tracing::debug!("session rolled back");
        Ok(())
    }

    /// Commits on `Completed`, rolls back on `Failed`. A session that was
    /// already finished by hand is left alone.
    pub async fn finish(&self, exit: ScopeExit) -> Result<(), SessionError> {
        if !self.is_active().await {
            return Ok(());
        }
        match exit {
            ScopeExit::Completed => self.commit().await,
            ScopeExit::Failed => self.rollback().await,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Lifespan provider: one engine from `Settings::db`.
pub async fn engine_factory(ctx: ResolverContext) -> Result<Provision<Engine>, BoxError> {
    let settings = ctx.get::<Settings>().await?;
    let engine = Engine::connect_lazy(&settings.db.url(None)?)?;
    tracing::info!("database engine created");
    Ok(Provision::with_teardown(engine, |engine, _exit| async move {
        engine.close().await;
        tracing::info!("database engine disposed");
        Ok(())
    }))
}

/// Request provider: one transactional session on the lifespan engine.
pub async fn session_factory(ctx: ResolverContext) -> Result<Provision<Session>, BoxError> {
    let engine = ctx.get::<Engine>().await?;
    let session = Session::begin(engine).await?;
    Ok(Provision::with_teardown(session, |session, exit| async move {
        session.finish(exit).await.map_err(BoxError::from)
    }))
}

/// Registers [`Engine`] and [`Session`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DatabaseModule;

impl ProviderModule for DatabaseModule {
    fn register(&self, registry: &mut ProviderRegistry) -> DiResult<()> {
        registry
            .add_scoped(Scope::Lifespan, engine_factory)?
            .add_scoped(Scope::Request, session_factory)?;
        Ok(())
    }
}
