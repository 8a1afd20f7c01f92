//! Request tracing.

use std::time::Instant;

use tracing::{Instrument, info, info_span, warn};

use super::{Middleware, from_fn};
use crate::context::Context;
use crate::handler::Next;

/// One `info` span per request carrying `method` and `path`, closed by an
/// event with the status and latency.
///
/// Register it first with [`App::use_middleware`](crate::App::use_middleware)
/// so the span covers every other layer, including 404/405 fallbacks.
///
/// A failing chain is logged at `warn` with the status the error will be
/// translated to; the response itself is produced later by the dispatcher.
pub fn trace() -> impl Middleware {
    from_fn(|ctx: Context, next: Next| {
        let span = info_span!("request", method = %ctx.method(), path = %ctx.path());
        async move {
            let start = Instant::now();
            let outcome = next.run(ctx.clone()).await;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            match &outcome {
                Ok(()) => info!(status = ctx.status().as_u16(), latency_ms, "request completed"),
                Err(err) => warn!(
                    status = err.status().as_u16(),
                    latency_ms,
                    error = %err,
                    "request failed"
                ),
            }
            outcome
        }
        .instrument(span)
    })
}
