//! The application: route registration plus the per-request dispatcher.
//!
//! # Dispatch
//!
//! ```text
//! acquire context ── global middleware ── route lookup ─┬─ route middleware ── handler
//!                                                       ├─ 405 handler
//!                                                       └─ 404 handler
//!        ↓ chain returned Err and nothing was written
//! translate the error into a JSON error response
//!        ↓
//! take the response, release the context
//! ```
//!
//! Global middleware wraps the *lookup*, so it also runs for unmatched
//! requests: a logging or CORS layer sees 404s and 405s too.

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use tracing::error;

use crate::config::Config;
use crate::context::{Context, ContextPool};
use crate::error::{BoxError, Error, ServeError};
use crate::group::Group;
use crate::handler::{BoxFuture, ErasedHandler, Handler, Next};
use crate::middleware::{self, BoxedMiddleware, Middleware};
use crate::response::Response;
use crate::router::{Route, RouteTable};

// ── AppHandle ─────────────────────────────────────────────────────────────────

/// Application-wide facilities reachable from every request through
/// [`Context::app`].
#[derive(Clone, Default)]
pub struct AppHandle {
    debug: bool,
    state: http::Extensions,
}

impl AppHandle {
    /// Whether error responses expose their causes.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Shared state installed with [`App::with_state`].
    ///
    /// ```rust,no_run
    /// # use switchyard::{Context, Result, StatusCode};
    /// #[derive(Clone)]
    /// struct Db { url: String }
    ///
    /// async fn show(c: Context) -> Result {
    ///     let db = c.app().state::<Db>().expect("Db installed at startup");
    ///     c.text(StatusCode::OK, db.url.clone())
    /// }
    /// ```
    pub fn state<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.state.get::<T>()
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

/// Routes, middleware and the context pool of one application.
///
/// ```rust,no_run
/// use switchyard::{App, Context, Result, Server, StatusCode, middleware};
///
/// #[tokio::main]
/// async fn main() {
///     let mut app = App::new();
///     app.use_middleware(middleware::trace());
///     app.get("/users/{id:[0-9]+}", show_user);
///
///     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
/// }
///
/// async fn show_user(c: Context) -> Result {
///     let id = c.param_int("id")?;
///     c.json(StatusCode::OK, &serde_json::json!({ "id": id }))
/// }
/// ```
///
/// Register everything before serving. Registration after the first request
/// is safe but its visibility to requests already in flight is unspecified.
pub struct App {
    config: Config,
    shared: Arc<AppHandle>,
    table: Arc<RouteTable>,
    root: Group,
    global: Vec<BoxedMiddleware>,
    terminal: Next,
    pool: ContextPool,
    on_start: Vec<Hook>,
    on_shutdown: Vec<Hook>,
}

/// A lifecycle callback, see [`App::on_start`].
type Hook = Box<dyn Fn(&App) -> Result<(), BoxError> + Send + Sync>;

/// Innermost step of the global chain: look the request up and run what it
/// resolves to.
struct RouteStep(Arc<RouteTable>);

impl ErasedHandler for RouteStep {
    fn call(&self, ctx: Context) -> BoxFuture {
        self.0.route(ctx)
    }
}

impl App {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let table = Arc::new(RouteTable::new());
        let shared = Arc::new(AppHandle { debug: config.debug, ..AppHandle::default() });
        Self {
            root: Group::new(Arc::clone(&table), "", []),
            terminal: Next::from_boxed(Arc::new(RouteStep(Arc::clone(&table)))),
            pool: ContextPool::new(config.pool_capacity),
            config,
            shared,
            table,
            global: Vec::new(),
            on_start: Vec::new(),
            on_shutdown: Vec::new(),
        }
    }

    /// Installs `value` as shared state, replacing a previous value of the
    /// same type.
    pub fn with_state<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        Arc::make_mut(&mut self.shared).state.insert(value);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Appends a global middleware. Global middleware runs for every request,
    /// matched or not, in the order it was added.
    pub fn use_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.global.push(Arc::new(middleware));
        self
    }

    /// Registers a callback the [`Server`](crate::Server) runs before it
    /// starts listening. The first failing callback aborts
    /// [`serve`](crate::Server::serve) with [`ServeError::StartHook`].
    ///
    /// ```rust
    /// # use switchyard::{App, BoxError};
    /// let mut app = App::new();
    /// app.on_start(|app: &App| -> Result<(), BoxError> {
    ///     tracing::info!(routes = app.routes().len(), "warming caches");
    ///     Ok(())
    /// });
    /// ```
    pub fn on_start<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&App) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_start.push(Box::new(hook));
        self
    }

    /// Registers a callback run once the shutdown signal arrives, before
    /// in-flight connections are drained. Failures are logged; every
    /// callback runs.
    pub fn on_shutdown<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&App) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_shutdown.push(Box::new(hook));
        self
    }

    pub(crate) fn run_start_hooks(&self) -> Result<(), ServeError> {
        for hook in &self.on_start {
            hook(self).map_err(ServeError::StartHook)?;
        }
        Ok(())
    }

    pub(crate) fn run_shutdown_hooks(&self) {
        for hook in &self.on_shutdown {
            if let Err(e) = hook(self) {
                error!(error = %e, "shutdown hook failed");
            }
        }
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Registers `handler` with route-level `middleware`.
    ///
    /// # Panics
    ///
    /// Panics if a `{name:constraint}` constraint is not a valid regex.
    pub fn handle(
        &self,
        method: Method,
        pattern: &str,
        handler: impl Handler,
        middleware: impl IntoIterator<Item = BoxedMiddleware>,
    ) -> &Self {
        self.root.handle(method, pattern, handler, middleware);
        self
    }

    pub fn get(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.root.get(pattern, handler);
        self
    }

    pub fn post(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.root.post(pattern, handler);
        self
    }

    pub fn put(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.root.put(pattern, handler);
        self
    }

    pub fn patch(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.root.patch(pattern, handler);
        self
    }

    pub fn delete(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.root.delete(pattern, handler);
        self
    }

    pub fn options(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.root.options(pattern, handler);
        self
    }

    pub fn head(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.root.head(pattern, handler);
        self
    }

    pub fn any(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.root.any(pattern, handler);
        self
    }

    /// A route group rooted at `prefix`. Global middleware is not part of the
    /// group; it already wraps every request.
    pub fn group(&self, prefix: &str, middleware: impl IntoIterator<Item = BoxedMiddleware>) -> Group {
        self.root.group(prefix, middleware)
    }

    /// Serves the directory `root` under `GET prefix/...`.
    pub fn static_files(&self, prefix: &str, root: impl Into<std::path::PathBuf>) -> &Self {
        self.root.static_files(prefix, root);
        self
    }

    /// Replaces the handler for paths no route accepts.
    pub fn set_not_found(&self, handler: impl Handler) -> &Self {
        self.table.set_not_found(handler);
        self
    }

    /// Replaces the handler for paths some route accepts under another method.
    pub fn set_method_not_allowed(&self, handler: impl Handler) -> &Self {
        self.table.set_method_not_allowed(handler);
        self
    }

    /// The registered routes, in registration order.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.table.routes()
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Runs one request through the application and returns its response.
    ///
    /// Never fails: handler errors become JSON error responses and unmatched
    /// requests reach the 404/405 handlers. The request context goes back to
    /// the pool when this future completes or is dropped.
    pub async fn dispatch(&self, req: http::Request<Bytes>) -> Response {
        let (parts, body) = req.into_parts();
        let lease = self.pool.acquire(parts, body, &self.shared);

        let chain = middleware::wrap(self.terminal.clone(), &self.global);
        if let Err(err) = chain.run(lease.context().clone()).await {
            self.handle_error(lease.context(), err);
        }
        lease.context().take_response()
    }

    fn handle_error(&self, ctx: &Context, err: Error) {
        // The written response wins. Logging late errors is left to middleware.
        if ctx.is_written() {
            return;
        }
        let debug = self.shared.debug;
        let (status, message, detail) = match err.as_http() {
            Some(http) => (
                http.status(),
                http.message().to_owned(),
                http.cause().filter(|_| debug).map(ToString::to_string),
            ),
            None => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_owned(),
                debug.then(|| err.to_string()),
            ),
        };
        if status.is_server_error() {
            error!(method = %ctx.method(), path = ctx.path(), error = %err, "request failed");
        }
        if let Err(e) = ctx.write_error(status, &message, detail) {
            error!(error = %e, "failed to write error response");
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
