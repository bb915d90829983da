//! Test harness.
//!
//! [`TestHarness`] builds a container the way production does, then installs
//! test doubles on top of it through overrides:
//!
//! - settings loaded from `.env.test` (or given directly);
//! - optionally an engine pointed at a test database URL;
//! - a session bound to `LIFESPAN` that always rolls back, so nothing a test
//!   writes survives it.
//!
//! [`TestApp`] drives an [`Api`] in-process with `tower::ServiceExt::oneshot`.

use std::path::Path;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use crate::api::{Api, ApiBuilder, RunningApi};
use crate::database::{Engine, Session};
use crate::entrypoint::{bootstrap, Entrypoint};
use crate::error::{BoxError, DiResult, Result};
use crate::lifetime::{Scope, ScopeExit};
use crate::provider::{Container, OverrideGuard, ResolverContext};
use crate::registration::Provision;
use crate::settings::Settings;
use crate::traits::Resolver;

/// Env file read by [`TestHarness::new`].
pub const TEST_ENV_FILE: &str = ".env.test";

/// Session provider for tests: one transaction for the whole lifespan, always
/// rolled back.
pub async fn rollback_session_factory(ctx: ResolverContext) -> Result<Provision<Session>, BoxError> {
    let engine = ctx.get::<Engine>().await?;
    let session = Session::begin(engine).await?;
    Ok(Provision::with_teardown(session, |session, _exit| async move {
        if session.is_active().await {
            session.rollback().await.map_err(BoxError::from)?;
        }
        Ok::<(), BoxError>(())
    }))
}

/// A container with test doubles installed. Dropping the harness removes them.
pub struct TestHarness {
    container: Container,
    guards: Vec<OverrideGuard>,
}

impl TestHarness {
    /// Settings from `.env.test` overlaid by the process environment.
    pub fn new() -> Result<Self> {
        Self::from_env_file(TEST_ENV_FILE)
    }

    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_settings(Settings::load(path)?)
    }

    pub fn with_settings(settings: Settings) -> Result<Self> {
        Ok(Self::from_container(bootstrap(settings)?))
    }

    /// Installs the rollback session on an existing container.
    pub fn from_container(container: Container) -> Self {
        let session = container.override_scoped(Scope::Lifespan, rollback_session_factory);
        Self {
            container,
            guards: vec![session],
        }
    }

    /// Replaces the settings constant.
    pub fn override_settings(mut self, settings: Settings) -> Self {
        self.guards.push(self.container.override_constant(settings));
        self
    }

    /// Points the engine at `url` instead of the configured database.
    pub fn use_database_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        let guard = self.container.override_scoped(Scope::Lifespan, move |_| {
            let url = url.clone();
            async move {
                let engine = Engine::connect_lazy(&url)?;
                Ok::<_, BoxError>(Provision::with_teardown(engine, |engine, _exit| async move {
                    engine.close().await;
                    Ok(())
                }))
            }
        });
        self.guards.push(guard);
        self
    }

    /// Keeps an extra override installed for as long as the harness lives.
    pub fn keep(mut self, guard: OverrideGuard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// An entrypoint running against this harness's container.
    pub fn entrypoint(&self) -> Entrypoint {
        Entrypoint::with_container(self.container.clone())
    }

    /// Builds and starts an API with the given routers.
    pub async fn app(&self, routers: impl IntoIterator<Item = Router>) -> Result<TestApp> {
        let api = ApiBuilder::new(self.container.clone())
            .include_routers(routers)
            .build()
            .await?;
        Ok(TestApp::start(&api))
    }
}

/// A started API driven without a socket.
pub struct TestApp {
    running: RunningApi,
}

impl TestApp {
    pub fn start(api: &Api) -> Self {
        Self { running: api.start() }
    }

    pub fn router(&self) -> Router {
        self.running.router()
    }

    /// Sends one request through the full middleware stack.
    pub async fn request(&self, request: Request<Body>) -> Response {
        match self.running.router().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    pub async fn get(&self, uri: &str) -> Result<Response, BoxError> {
        Ok(self.request(build_request(Method::GET, uri, None)?).await)
    }

    pub async fn post_json(&self, uri: &str, body: &serde_json::Value) -> Result<Response, BoxError> {
        Ok(self.request(build_request(Method::POST, uri, Some(body))?).await)
    }

    /// Closes the lifespan instance (rolling back the test session).
    pub async fn shutdown(self) -> DiResult<()> {
        self.running.close(ScopeExit::Completed).await
    }
}

fn build_request(
    method: Method,
    uri: &str,
    json: Option<&serde_json::Value>,
) -> Result<Request<Body>, axum::http::Error> {
    let builder = Request::builder().method(method).uri(uri);
    match json {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string())),
        None => builder.body(Body::empty()),
    }
}

/// Reads a response body as JSON.
pub async fn read_json(response: Response) -> Result<serde_json::Value, BoxError> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
