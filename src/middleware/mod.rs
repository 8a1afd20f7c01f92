//! Middleware layer.
//!
//! A middleware turns the next handler into a wrapped handler:
//! `middleware(next) -> handler`. Composition is classic onion ordering:
//! for `[m1, m2]` around `h` the request runs
//! `m1-pre, m2-pre, h, m2-post, m1-post`. The first middleware in a list is
//! the outermost layer.
//!
//! Two ways to write one:
//!
//! ```rust,no_run
//! use switchyard::middleware;
//! use switchyard::{Context, HttpError, Next};
//!
//! // 1. The ergonomic form: an async fn of the context and the next step.
//! let auth = middleware::from_fn(|c: Context, next: Next| async move {
//!     if c.header("authorization").is_none() {
//!         return Err(HttpError::unauthorized("").into());
//!     }
//!     next.run(c).await
//! });
//!
//! // 2. The raw transform: any `Fn(Next) -> Next`.
//! let passthrough = |next: Next| next;
//! # let _ = (middleware::boxed(auth), middleware::boxed(passthrough));
//! ```
//!
//! Built-in middleware:
//! - [`trace()`]: per-request span with method, path, status, latency
//! - [`recover()`]: turns a panic in the inner chain into a `500`

use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::handler::Next;

mod recover;
mod trace;

pub use recover::recover;
pub use trace::trace;

/// Wraps a [`Next`] handler into another.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: Next) -> Next;
}

/// A shared, type-erased middleware, as stored by routes, groups and the app.
pub type BoxedMiddleware = Arc<dyn Middleware>;

impl<F> Middleware for F
where
    F: Fn(Next) -> Next + Send + Sync + 'static,
{
    fn wrap(&self, next: Next) -> Next {
        self(next)
    }
}

/// Erases a middleware's type so it can sit in a list with others.
pub fn boxed(middleware: impl Middleware) -> BoxedMiddleware {
    Arc::new(middleware)
}

/// Composes `middleware` around `handler`: `m1(m2(...(mn(handler))))`.
///
/// An empty list returns `handler` unchanged.
pub fn wrap(handler: Next, middleware: &[BoxedMiddleware]) -> Next {
    middleware
        .iter()
        .rev()
        .fold(handler, |next, m| m.wrap(next))
}

// ── from_fn ───────────────────────────────────────────────────────────────────

/// Middleware built by [`from_fn`].
pub struct FromFn<F>(Arc<F>);

/// Builds a middleware from an async function of the context and the next
/// step. The function decides whether, and how often, to run `next`.
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    FromFn(Arc::new(f))
}

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn wrap(&self, next: Next) -> Next {
        let f = Arc::clone(&self.0);
        Next::new(move |ctx: Context| f(ctx, next.clone()))
    }
}

// ── chain ─────────────────────────────────────────────────────────────────────

/// A pre-composed bundle of middleware, usable wherever one middleware is.
#[derive(Clone)]
pub struct Chain(Vec<BoxedMiddleware>);

/// Pre-composes `middleware` into a single unit. `chain([a, b])` behaves
/// exactly like registering `a` then `b`.
pub fn chain(middleware: impl IntoIterator<Item = BoxedMiddleware>) -> Chain {
    Chain(middleware.into_iter().collect())
}

impl Middleware for Chain {
    fn wrap(&self, next: Next) -> Next {
        wrap(next, &self.0)
    }
}
