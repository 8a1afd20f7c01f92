//! Panic recovery.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future;
use http::StatusCode;
use tracing::error;

use super::{Middleware, from_fn};
use crate::context::Context;
use crate::error::{Error, HttpError};
use crate::handler::Next;

/// The message carried by a recovered panic.
#[derive(Debug, thiserror::Error)]
#[error("panic: {0}")]
pub struct Panicked(pub String);

/// Catches a panic anywhere in the inner chain, including one raised while
/// the chain is being built, and turns it into an [`HttpError`] `500`
/// wrapping a [`Panicked`] cause.
///
/// The context stays usable: contexts are reset when the next request
/// acquires them, so nothing half-written by the panicking handler leaks.
pub fn recover() -> impl Middleware {
    from_fn(|ctx: Context, next: Next| async move {
        // Build the inner future under the guard too: handlers and raw
        // middleware can panic before their first poll.
        let inner = future::lazy(move |_| next.run(ctx)).flatten();
        match AssertUnwindSafe(inner).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "handler panicked");
                Err(Error::from(HttpError::wrap(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "",
                    Panicked(message),
                )))
            }
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
