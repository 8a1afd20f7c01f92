//! HTTP server and graceful shutdown.
//!
//! # Lifecycle
//!
//! 1. Runs the [`App::on_start`] hooks; the first failure aborts startup.
//! 2. Binds (or adopts) the listener and accepts connections.
//! 3. On **SIGTERM** or **Ctrl-C** (or the future given to
//!    [`Server::serve_with_shutdown`]) stops accepting and runs the
//!    [`App::on_shutdown`] hooks.
//! 4. Tells every open connection to close: idle keep-alive connections go
//!    at once, busy ones after their current response.
//! 5. Waits at most [`Config::shutdown_timeout_secs`](crate::Config) for
//!    that, then aborts whatever is still running.
//!
//! Aborting a connection drops its request futures; every request context
//! still goes back to the pool.
//!
//! # Timeouts
//!
//! From [`Config`](crate::Config), each disabled by `0`:
//!
//! | Setting | Covers | On expiry |
//! |---|---|---|
//! | `read_timeout_secs` | reading the request body | `408` |
//! | `write_timeout_secs` | running the dispatcher | `503` |
//! | `idle_timeout_secs` | HTTP/1 wait for the next request head | connection closed |

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::app::App;
use crate::context::PeerAddr;
use crate::error::ServeError;
use crate::response::Response;

/// Where the server gets its connections from.
enum Bind {
    Addr(String),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
}

impl Server {
    /// Configures the server to bind to `addr` (`host:port`) when
    /// [`serve`](Server::serve) is called.
    ///
    /// ```rust,no_run
    /// use switchyard::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { bind: Bind::Addr(addr.into()) }
    }

    /// Serves on an already bound listener, e.g. one bound to port `0`.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener) }
    }

    /// Accepts connections and dispatches their requests through `app`
    /// until the process receives SIGTERM or Ctrl-C.
    ///
    /// Returns after a graceful shutdown, or with an error when a start hook
    /// fails or the listener cannot be bound.
    pub async fn serve(self, app: App) -> Result<(), ServeError> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but shuts down when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        app: App,
        signal: impl Future<Output = ()>,
    ) -> Result<(), ServeError> {
        app.run_start_hooks()?;

        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(&addr).await?,
            Bind::Listener(listener) => listener,
        };
        let addr = listener.local_addr()?;

        let config = app.config();
        let grace = config.shutdown_timeout();
        let read_timeout = config.read_timeout();
        let write_timeout = config.write_timeout();

        let mut builder = ConnBuilder::new(TokioExecutor::new());
        if let Some(idle) = config.idle_timeout() {
            builder.http1().timer(TokioTimer::new()).header_read_timeout(idle);
        }

        // Shared across connection tasks without copying the route table.
        let app = Arc::new(app);

        info!(%addr, routes = app.table().len(), "switchyard listening");

        let graceful = GracefulShutdown::new();
        let mut tasks = JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);

                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let app = Arc::clone(&app);
                        async move { handle(app, req, remote_addr, read_timeout, write_timeout).await }
                    });

                    // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                    let conn = builder.serve_connection(io, svc).into_owned();
                    let conn = graceful.watch(conn);

                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set stays bounded.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        app.run_shutdown_hooks();

        if tokio::time::timeout(grace, graceful.shutdown()).await.is_err() {
            warn!(remaining = tasks.len(), "shutdown timeout elapsed, aborting connections");
            tasks.shutdown().await;
        }
        while tasks.join_next().await.is_some() {}

        info!("switchyard stopped");
        Ok(())
    }
}

// ── Request handling ──────────────────────────────────────────────────────────

/// Collects the body, records the peer and dispatches. Infallible: every
/// failure is already a response by the time it reaches hyper.
async fn handle(
    app: Arc<App>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (mut parts, body) = req.into_parts();
    let body = match within(read_timeout, body.collect()).await {
        Some(Ok(collected)) => collected.to_bytes(),
        Some(Err(e)) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(Response::status_only(StatusCode::BAD_REQUEST).into_http());
        }
        None => {
            warn!(peer = %remote_addr, "request body read timed out");
            return Ok(Response::status_only(StatusCode::REQUEST_TIMEOUT).into_http());
        }
    };
    parts.extensions.insert(PeerAddr(remote_addr));

    let req = http::Request::from_parts(parts, body);
    let path = req.uri().path().to_owned();
    match within(write_timeout, app.dispatch(req)).await {
        Some(response) => Ok(response.into_http()),
        None => {
            warn!(peer = %remote_addr, %path, "handler timed out");
            Ok(Response::status_only(StatusCode::SERVICE_UNAVAILABLE).into_http())
        }
    }
}

/// Runs `fut`, giving up after `limit` when there is one.
async fn within<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives: SIGTERM or
/// SIGINT on Unix, Ctrl-C elsewhere. A signal that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
