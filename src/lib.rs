//! # switchyard
//!
//! An in-process HTTP request dispatcher: pattern routing with typed
//! constraints, onion-ordered middleware at three levels, route groups, and
//! pooled per-request contexts.
//!
//! ## The contract
//!
//! - **Routing is ordered.** Routes are tried in registration order and the
//!   first one whose pattern and method both match wins. A path that some
//!   route accepts under another method is a `405`, otherwise a `404`.
//! - **Middleware is an onion.** `[m1, m2]` around `h` runs
//!   `m1-pre, m2-pre, h, m2-post, m1-post`. Global middleware wraps the route
//!   lookup, group middleware wraps the route's own, and route middleware
//!   wraps the handler.
//! - **Errors are values.** Handlers return [`Result`]. An [`HttpError`]
//!   becomes a JSON error response with its status; anything else is a `500`.
//! - **One response per request.** The first write wins; later writes and
//!   errors after a write never reach the client.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use switchyard::{App, Context, HttpError, Result, Server, StatusCode, middleware};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = App::new();
//!     app.use_middleware(middleware::recover());
//!     app.use_middleware(middleware::trace());
//!
//!     app.get("/users/{id:[0-9]+}", get_user)
//!         .post("/users", create_user);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_user(c: Context) -> Result {
//!     let id = c.param_int("id")?;
//!     c.json(StatusCode::OK, &serde_json::json!({ "id": id }))
//! }
//!
//! async fn create_user(c: Context) -> Result {
//!     if c.body().is_empty() {
//!         return Err(HttpError::bad_request("name is required").into());
//!     }
//!     c.created(&serde_json::json!({ "id": 99 }))
//! }
//! ```

mod app;
mod config;
mod context;
mod error;
mod group;
mod handler;
mod pattern;
mod response;
mod router;
mod server;
mod static_files;

pub mod health;
pub mod middleware;

pub use app::{App, AppHandle};
pub use config::Config;
pub use context::{Context, Pagination, PeerAddr};
pub use error::{BoxError, Error, HttpError, Result, ServeError};
pub use group::Group;
pub use handler::{BoxFuture, Handler, Next};
pub use http::{Method, StatusCode};
pub use middleware::Middleware;
pub use pattern::{Matcher, Params, PatternError, compile};
pub use response::{ContentType, Response, ResponseBuilder};
pub use router::{Lookup, Route, RouteTable};
pub use server::Server;
