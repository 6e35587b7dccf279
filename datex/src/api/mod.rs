//! HTTP control API for a running service.
//!
//! The service listens on a configurable port (55290 by default) and takes
//! operator commands as plain JSON: start and stop jobs, inspect their
//! status, tail or clear the in-memory logs, and shut the whole service
//! down. Routes live in a priority-ordered [`RouteTable`]; embedders can
//! remove or replace the defaults and mount handlers of their own before
//! the listener comes up. An optional static content directory is served
//! for every path no route claims.

mod handlers;

#[cfg(test)]
mod api_tests;

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post, MethodRouter};
use axum::Router;
use tokio::sync::Notify;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::errors::DatexResult;
use crate::observability::LogRegistry;
use crate::runner::ServiceRunner;

pub use handlers::{ErrorResponse, HealthResponse, SuccessResponse};

/// Priority assigned to the built-in API routes. Lower numbers win.
pub const DEFAULT_ROUTE_PRIORITY: u32 = 100;

/// Shared state behind every API handler.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub(crate) service: Arc<ServiceRunner>,
    pub(crate) logs: LogRegistry,
    pub(crate) shutdown: Arc<Notify>,
}

impl ApiState {
    /// Creates handler state over a service and its log registry.
    #[must_use]
    pub fn new(service: Arc<ServiceRunner>, logs: LogRegistry) -> Self {
        Self {
            service,
            logs,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// The hosted service.
    #[must_use]
    pub fn service(&self) -> &Arc<ServiceRunner> {
        &self.service
    }

    /// Resolves once a shutdown command has been accepted.
    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await;
    }
}

/// What a route resolves to.
pub enum Endpoint {
    /// Handlers for the path itself.
    Handler(MethodRouter<ApiState>),
    /// Static content served for every path no other route claims. The
    /// directory may be absent, in which case unclaimed paths get a 404.
    Content(Option<PathBuf>),
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler"),
            Self::Content(dir) => f.debug_tuple("Content").field(dir).finish(),
        }
    }
}

/// One entry of the route table.
#[derive(Debug)]
pub struct Route {
    path: String,
    priority: u32,
    endpoint: Endpoint,
}

impl Route {
    /// The axum-style path this route claims.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The route's priority. Lower numbers win a contested path.
    #[must_use]
    pub fn priority(&self) -> u32 {
        self.priority
    }
}

/// Priority-ordered routes for the control API.
///
/// When two entries claim the same path, the one with the lower priority
/// number is mounted and the rest are dropped, so a custom route added at
/// priority 10 shadows the default at [`DEFAULT_ROUTE_PRIORITY`]. The
/// content entry always sorts last and becomes the router fallback.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in command, log, health and content routes.
    #[must_use]
    pub fn defaults() -> Self {
        let mut table = Self::new();
        table.add_route(
            "/api/cmd/:command",
            DEFAULT_ROUTE_PRIORITY,
            post(handlers::command),
        );
        table.add_route(
            "/api/cmd/:command/:job",
            DEFAULT_ROUTE_PRIORITY,
            post(handlers::job_command),
        );
        table.add_route(
            "/api/log/:logname/:action",
            DEFAULT_ROUTE_PRIORITY,
            get(handlers::log).post(handlers::log),
        );
        table.add_route("/api/health", DEFAULT_ROUTE_PRIORITY, get(handlers::health));
        table.routes.push(Route {
            path: "/".to_string(),
            priority: u32::MAX,
            endpoint: Endpoint::Content(None),
        });
        table
    }

    /// Adds a handler route at the given priority.
    pub fn add_route(
        &mut self,
        path: impl Into<String>,
        priority: u32,
        handler: MethodRouter<ApiState>,
    ) {
        self.routes.push(Route {
            path: path.into(),
            priority,
            endpoint: Endpoint::Handler(handler),
        });
    }

    /// Removes every entry claiming `path`, returning whether any matched.
    pub fn remove_route(&mut self, path: &str) -> bool {
        let before = self.routes.len();
        self.routes.retain(|route| route.path != path);
        self.routes.len() != before
    }

    /// Replaces every entry claiming `path` with one handler route.
    pub fn replace_route(
        &mut self,
        path: impl Into<String>,
        priority: u32,
        handler: MethodRouter<ApiState>,
    ) {
        let path = path.into();
        self.remove_route(&path);
        self.add_route(path, priority, handler);
    }

    /// Points the content entry at a directory, re-adding the entry if the
    /// defaults were stripped.
    pub fn set_content_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        for route in &mut self.routes {
            if let Endpoint::Content(target) = &mut route.endpoint {
                *target = Some(dir);
                return;
            }
        }
        self.routes.push(Route {
            path: "/".to_string(),
            priority: u32::MAX,
            endpoint: Endpoint::Content(Some(dir)),
        });
    }

    /// The current entries, in insertion order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Builds the axum router: entries sorted by priority, contested paths
    /// resolved in favour of the lowest number, content as the fallback.
    pub(crate) fn into_router(mut self, state: ApiState) -> Router {
        self.routes.sort_by_key(Route::priority);
        let mut router = Router::new();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut content: Option<Option<PathBuf>> = None;
        for route in self.routes {
            match route.endpoint {
                Endpoint::Handler(handler) => {
                    if claimed.insert(route.path.clone()) {
                        router = router.route(&route.path, handler);
                    } else {
                        debug!(path = %route.path, "route shadowed by a higher-priority entry");
                    }
                }
                Endpoint::Content(dir) => {
                    if content.is_none() {
                        content = Some(dir);
                    }
                }
            }
        }
        let router = match content.flatten() {
            Some(dir) => router.fallback_service(ServeDir::new(dir)),
            None => router.fallback(handlers::not_found),
        };
        router
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// The control API server for one service document.
#[derive(Debug)]
pub struct ControlApi {
    config: ServiceConfig,
    state: ApiState,
    table: RouteTable,
}

impl ControlApi {
    /// Builds the API over a service, wiring the document's static content
    /// directory into the route table.
    #[must_use]
    pub fn new(config: ServiceConfig, service: Arc<ServiceRunner>, logs: LogRegistry) -> Self {
        let mut table = RouteTable::defaults();
        if let Some(dir) = &config.static_dir {
            table.set_content_dir(dir.clone());
        }
        Self {
            config,
            state: ApiState::new(service, logs),
            table,
        }
    }

    /// The route table, for adjusting the defaults before serving.
    pub fn routes_mut(&mut self) -> &mut RouteTable {
        &mut self.table
    }

    /// Handler state, shared with any custom routes.
    #[must_use]
    pub fn state(&self) -> &ApiState {
        &self.state
    }

    /// Binds the configured port and serves until a shutdown command or an
    /// interrupt arrives.
    pub async fn serve(self) -> DatexResult<()> {
        let addr = format!("0.0.0.0:{}", self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "control api listening");
        let shutdown = Arc::clone(&self.state.shutdown);
        let app = self.table.into_router(self.state);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;
        info!("control api stopped");
        Ok(())
    }
}

/// Resolves when a shutdown command lands or the process is interrupted.
async fn shutdown_signal(notify: Arc<Notify>) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for interrupt: {e}");
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        () = notify.notified() => {}
        () = interrupt => {}
    }
}
