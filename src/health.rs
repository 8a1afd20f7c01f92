//! Built-in health-check handlers.
//!
//! | Probe | Typical path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can it serve traffic? Failure → pulled from the load balancer. |
//!
//! ```rust,no_run
//! use switchyard::{App, health};
//!
//! let app = App::new();
//! app.get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```
//!
//! Replace `readiness` with your own handler when the application must gate
//! on its dependencies:
//!
//! ```rust,no_run
//! use switchyard::{Context, HttpError, Result, StatusCode};
//!
//! async fn readiness(c: Context) -> Result {
//!     if !dependencies_are_healthy().await {
//!         return Err(HttpError::service_unavailable("").into());
//!     }
//!     c.text(StatusCode::OK, "ready")
//! }
//!
//! async fn dependencies_are_healthy() -> bool { true }
//! ```

use http::StatusCode;

use crate::context::Context;
use crate::error::Error;

/// Always `200 OK` with body `"ok"`. Has no dependencies.
pub async fn liveness(c: Context) -> Result<(), Error> {
    c.text(StatusCode::OK, "ok")
}

/// `200 OK` with body `"ready"`.
pub async fn readiness(c: Context) -> Result<(), Error> {
    c.text(StatusCode::OK, "ready")
}
