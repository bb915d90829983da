use std::future::Future;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use super::errors::{internal_response, ApiError, InternalDetail, RequestFailed};
use super::extract::RequestContext;
use crate::error::{DiResult, Result};
use crate::lifetime::{Scope, ScopeExit};
use crate::provider::{Container, ScopeGuard, ScopeHandle};
use crate::settings::{ConfigError, Settings};
use crate::traits::Resolver;

/// Assembles an [`Api`] from routers.
///
/// # Examples
///
/// ```rust
/// use axum::{routing::get, Router};
/// use scopewire::{bootstrap, ApiBuilder, Settings};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> scopewire::Result<()> {
/// let container = bootstrap(Settings::for_database("app"))?;
/// let api = ApiBuilder::new(container)
///     .include_router(Router::new().route("/health", get(|| async { "ok" })))
///     .build()
///     .await?;
///
/// let running = api.start();
/// // serve running.router() ...
/// running.close(scopewire::ScopeExit::Completed).await?;
/// # Ok(())
/// # }
/// ```
pub struct ApiBuilder {
    container: Container,
    routers: Vec<Router>,
}

impl ApiBuilder {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            routers: Vec::new(),
        }
    }

    pub fn include_router(mut self, router: Router) -> Self {
        self.routers.push(router);
        self
    }

    pub fn include_routers(mut self, routers: impl IntoIterator<Item = Router>) -> Self {
        self.routers.extend(routers);
        self
    }

    /// Merges the routers and reads `Settings` for CORS and debug output.
    pub async fn build(self) -> Result<Api> {
        let settings = self.container.get::<Settings>().await?;
        let cors = cors_layer(&settings.allow_origins)?;
        let router = self
            .routers
            .into_iter()
            .fold(Router::new(), |app, router| app.merge(router));

        Ok(Api {
            container: self.container,
            router,
            cors,
            debug: settings.debug,
        })
    }
}

/// CORS with credentials. A `*` entry mirrors the request origin, since a
/// credentialed response may not carry a literal wildcard.
fn cors_layer(origins: &[String]) -> Result<CorsLayer, ConfigError> {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins = origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|e| ConfigError::Invalid {
                    key: "ALLOW_ORIGINS",
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

/// A built application, not yet serving.
pub struct Api {
    container: Container,
    router: Router,
    cors: CorsLayer,
    debug: bool,
}

impl Api {
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Opens the `LIFESPAN` instance and returns the router bound to it.
    pub fn start(&self) -> RunningApi {
        let lifespan = self.container.enter(Scope::Lifespan);
        tracing::info!("lifespan started");
        let state = RequestState {
            lifespan: lifespan.handle(),
            debug: self.debug,
        };
        let router = self
            .router
            .clone()
            .layer(middleware::from_fn_with_state(state, request_scope))
            .layer(self.cors.clone());
        RunningApi { router, lifespan }
    }

    /// Starts, serves `listener` until `shutdown` resolves, then closes the
    /// lifespan with the serve outcome.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let running = self.start();
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "listening");
        }
        let served = axum::serve(listener, running.router())
            .with_graceful_shutdown(shutdown)
            .await;
        running.close(ScopeExit::of(&served)).await?;
        served?;
        Ok(())
    }
}

/// An application with an open `LIFESPAN` instance.
pub struct RunningApi {
    router: Router,
    lifespan: ScopeGuard,
}

impl RunningApi {
    /// The router to serve; cheap to clone.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn lifespan(&self) -> ScopeHandle {
        self.lifespan.handle()
    }

    /// Closes the `LIFESPAN` instance, disposing lifespan resources.
    pub async fn close(self, exit: ScopeExit) -> DiResult<()> {
        let closed = self.lifespan.close(exit).await;
        tracing::info!("lifespan stopped");
        closed
    }
}

#[derive(Clone)]
struct RequestState {
    lifespan: ScopeHandle,
    debug: bool,
}

/// Wraps each request in a fresh `REQUEST` instance.
///
/// The instance closes as failed when the response is a server error or
/// carries [`RequestFailed`]. A teardown failure replaces the response with
/// a 500.
async fn request_scope(State(state): State<RequestState>, mut request: Request, next: Next) -> Response {
    let scope = match state.lifespan.enter(Scope::Request) {
        Ok(scope) => scope,
        Err(err) => return finalize(ApiError::from(err).into_response(), state.debug),
    };
    request.extensions_mut().insert(RequestContext { scope: scope.handle() });

    let response = next.run(request).await;
    let failed = response.status().is_server_error() || response.extensions().get::<RequestFailed>().is_some();
    let exit = if failed {
        ScopeExit::Failed
    } else {
        ScopeExit::Completed
    };

    let response = match scope.close(exit).await {
        Ok(()) => response,
        Err(err) => ApiError::from(err).into_response(),
    };
    finalize(response, state.debug)
}

/// Swaps the generic 500 body for the detailed one in debug mode.
fn finalize(response: Response, debug: bool) -> Response {
    if !debug {
        return response;
    }
    match response.extensions().get::<InternalDetail>() {
        Some(InternalDetail(detail)) => internal_response(detail),
        None => response,
    }
}
