//! Error types.
//!
//! Three layers, three types:
//!
//! - [`HttpError`]: the structured shape handlers and middleware build when
//!   they know which status a failure should produce.
//! - [`Error`]: what a handler chain returns. Anything implementing
//!   [`std::error::Error`] converts into it with `?`; an `HttpError` keeps its
//!   structure through the conversion, everything else becomes an
//!   unclassified failure that the dispatcher maps to `500`.
//! - [`ServeError`]: infrastructure failures of the [`Server`](crate::Server)
//!   itself: binding the listener or a failing start hook.

use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// A boxed, thread-safe error used as the optional cause of an [`HttpError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shorthand for the return type of handlers and middleware.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

// ── HttpError ─────────────────────────────────────────────────────────────────

/// An HTTP failure with a status code, a client-facing message and an
/// optional lower-level cause.
///
/// The cause is never shown to clients unless the application runs in debug
/// mode (see [`Config::debug`](crate::Config)).
#[derive(Debug, Error)]
#[error("code={}, message={message}", .status.as_u16())]
pub struct HttpError {
    status: StatusCode,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            status.canonical_reason().unwrap_or_default().to_owned()
        } else {
            message
        };
        Self { status, message, source: None }
    }

    /// Wraps `cause` so it travels with the response-facing message.
    pub fn wrap(status: StatusCode, message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self { source: Some(cause.into()), ..Self::new(status, message) }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The wrapped cause, if any.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

// ── Error ─────────────────────────────────────────────────────────────────────

/// The error value flowing back up a handler chain.
///
/// `Error` does not implement [`std::error::Error`] itself; that
/// is what allows the blanket `From` conversion below, so `?` works on I/O,
/// serde and [`HttpError`] values alike.
pub struct Error(Repr);

enum Repr {
    Http(HttpError),
    Other(BoxError),
}

impl Error {
    /// Builds an unclassified failure from any boxed error.
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::from_boxed(err.into())
    }

    /// The structured HTTP shape, when this error carries one.
    pub fn as_http(&self) -> Option<&HttpError> {
        match &self.0 {
            Repr::Http(e) => Some(e),
            Repr::Other(_) => None,
        }
    }

    /// The status this error translates to at the dispatcher boundary.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Repr::Http(e) => e.status,
            Repr::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<HttpError>() {
            Ok(http) => Self(Repr::Http(*http)),
            Err(other) => Self(Repr::Other(other)),
        }
    }
}

impl<E> From<E> for Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::from_boxed(Box::new(err))
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Http(e) => fmt::Debug::fmt(e, f),
            Repr::Other(e) => fmt::Debug::fmt(e, f),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Http(e) => fmt::Display::fmt(e, f),
            Repr::Other(e) => fmt::Display::fmt(e, f),
        }
    }
}

// ── ServeError ────────────────────────────────────────────────────────────────

/// Failures of the server runtime, as opposed to request-level errors.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("start hook failed: {0}")]
    StartHook(#[source] BoxError),
}
