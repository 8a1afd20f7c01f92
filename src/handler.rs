//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The route table holds handlers of *different* types in a single
//! `Vec<Arc<Route>>`. Rust collections can only hold one concrete type, so we
//! use **trait objects** (`dyn ErasedHandler`) to hide the concrete handler
//! type behind a common interface and store everything uniformly.
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! async fn show(c: Context) -> Result { … }     ← user writes this
//!        ↓ app.get("/users/{id}", show)
//! show.into_boxed_handler()                     ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                     ← heap-allocated wrapper
//!        ↓  stored as Next(BoxedHandler)
//! next.run(ctx)  at request time                ← one vtable dispatch
//!        ↓
//! Box::pin(show(ctx))                           ← BoxFuture
//! ```
//!
//! Middleware sees the same shape: it receives a [`Next`] and returns a
//! [`Next`], so a wrapped handler is indistinguishable from a plain one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future resolving to a handler outcome.
///
/// `Send + 'static` let tokio move the future across threads safely.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxFuture;
}

/// A heap-allocated, type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(c: Context) -> switchyard::Result
/// ```
///
/// and for [`Next`], so a composed chain can be registered like any handler.
/// The trait is **sealed**: only the impls in this module can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin((self.0)(ctx))
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// A callable, cheaply clonable handler: the "next" step a middleware wraps.
///
/// Cloning costs one atomic increment. A middleware may run its `Next` zero
/// times (short-circuit), once, or several times (retry); every run receives
/// the same per-request [`Context`].
#[derive(Clone)]
pub struct Next(BoxedHandler);

impl Next {
    pub fn new(handler: impl Handler) -> Self {
        Self(handler.into_boxed_handler())
    }

    pub(crate) fn from_boxed(handler: BoxedHandler) -> Self {
        Self(handler)
    }

    /// Runs the wrapped handler against `ctx`.
    pub fn run(&self, ctx: Context) -> BoxFuture {
        self.0.call(ctx)
    }
}

impl private::Sealed for Next {}

impl Handler for Next {
    fn into_boxed_handler(self) -> BoxedHandler {
        self.0
    }
}
