//! Per-request context and its reuse pool.
//!
//! # Lifecycle
//!
//! ```text
//! pool.acquire(parts, body)   ← pop an idle slot or allocate; reset it here
//!        ↓
//! handler chain               ← Context clones handed to middleware/handlers
//!        ↓
//! drop(lease)                 ← slot returns to the pool if nobody kept a clone
//! ```
//!
//! Resetting happens on **acquire**, never on release, so a code path that
//! forgets to clean up cannot leak one request's parameters into the next.
//! A slot is only pooled again when the dispatcher holds the last reference
//! to it; a handler that smuggled a clone into a background task simply
//! causes the slot to be dropped instead of reused.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use http::header::{HeaderMap, LOCATION};
use http::request::Parts;
use http::{Method, StatusCode, Uri};
use parking_lot::{Mutex, RwLock};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::app::AppHandle;
use crate::error::{Error, HttpError};
use crate::pattern::Params;
use crate::response::{ContentType, Response, append_header};

/// Peer address of the connection a request arrived on.
///
/// The [`Server`](crate::Server) inserts it into the request extensions;
/// [`Context::real_ip`] falls back to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

/// Paging window computed by [`Context::pagination`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
    /// Rows to skip: `(page - 1) * per_page`.
    pub offset: u64,
}

type Store = HashMap<String, Box<dyn Any + Send + Sync>>;

pub(crate) struct Slot {
    parts: Parts,
    // Percent-decoded `parts.uri.path()`; routing and parameters use this.
    path: String,
    body: Bytes,
    app: Arc<AppHandle>,
    params: RwLock<Params>,
    store: Mutex<Store>,
    pending_headers: Mutex<HeaderMap>,
    response: Mutex<Option<Response>>,
    written: AtomicBool,
}

impl Slot {
    fn new(parts: Parts, body: Bytes, app: Arc<AppHandle>) -> Self {
        Self {
            path: decode_path(&parts),
            parts,
            body,
            app,
            params: RwLock::new(Params::default()),
            store: Mutex::new(Store::new()),
            pending_headers: Mutex::new(HeaderMap::new()),
            response: Mutex::new(None),
            written: AtomicBool::new(false),
        }
    }

    fn reset(&mut self, parts: Parts, body: Bytes, app: Arc<AppHandle>) {
        self.path = decode_path(&parts);
        self.parts = parts;
        self.body = body;
        self.app = app;
        *self.params.get_mut() = Params::default();
        *self.store.get_mut() = Store::new();
        self.pending_headers.get_mut().clear();
        *self.response.get_mut() = None;
        *self.written.get_mut() = false;
    }

    /// Drops everything the finished request owned so an idle slot pins
    /// neither store values nor body buffers. `reset` still runs on acquire.
    fn clear(&mut self) {
        self.body = Bytes::new();
        self.parts.headers.clear();
        self.parts.extensions.clear();
        self.store.get_mut().clear();
        self.pending_headers.get_mut().clear();
        *self.response.get_mut() = None;
    }
}

fn decode_path(parts: &Parts) -> String {
    percent_decode_str(parts.uri.path())
        .decode_utf8_lossy()
        .into_owned()
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Mutable per-request state handed through the handler chain.
///
/// Cloning is cheap (one atomic increment) and every clone observes the same
/// request. Only the first response write of a request takes effect.
#[derive(Clone)]
pub struct Context(Arc<Slot>);

impl Context {
    // ── Request ───────────────────────────────────────────────────────────────

    pub fn method(&self) -> &Method {
        &self.0.parts.method
    }

    /// The percent-decoded request path. The raw form is on [`uri`](Self::uri).
    pub fn path(&self) -> &str {
        &self.0.path
    }

    pub fn uri(&self) -> &Uri {
        &self.0.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.0.parts.headers
    }

    /// Case-insensitive header lookup. Values that are not visible ASCII are
    /// reported as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.0.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Extensions attached to the inbound request by the server or by
    /// whoever built it.
    pub fn extensions(&self) -> &http::Extensions {
        &self.0.parts.extensions
    }

    pub fn body(&self) -> &Bytes {
        &self.0.body
    }

    /// First value of the query parameter `name`, percent-decoded.
    pub fn query(&self, name: &str) -> Option<String> {
        let query = self.0.parts.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn query_or(&self, name: &str, default: &str) -> String {
        self.query(name)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_owned())
    }

    /// The query parameter `name` parsed as `T`; absent or unparsable values
    /// read as `None`.
    pub fn query_as<T: FromStr>(&self, name: &str) -> Option<T> {
        self.query(name)?.parse().ok()
    }

    /// The query parameter `name` as an integer, `default` when absent or not
    /// an integer.
    pub fn query_int(&self, name: &str, default: i64) -> i64 {
        self.query_as(name).unwrap_or(default)
    }

    /// `true` for `true`, `1` or `yes` in any case; everything else is `false`.
    pub fn query_bool(&self, name: &str) -> bool {
        self.query(name)
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
    }

    /// Every value of the repeated query parameter `name`, in order.
    pub fn query_all(&self, name: &str) -> Vec<String> {
        let Some(query) = self.0.parts.uri.query() else {
            return Vec::new();
        };
        url::form_urlencoded::parse(query.as_bytes())
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .collect()
    }

    /// `page` and `per_page` (or `limit`) from the query string.
    ///
    /// `page` is at least 1. `per_page` falls back to `default_per_page` when
    /// missing or below 1 and is capped at `max_per_page`.
    pub fn pagination(&self, default_per_page: u64, max_per_page: u64) -> Pagination {
        let page = self.query_int("page", 1).max(1) as u64;
        let requested = match self.query_int("per_page", 0) {
            0 => self.query_int("limit", default_per_page as i64),
            n => n,
        };
        let per_page = if requested < 1 {
            default_per_page
        } else {
            (requested as u64).min(max_per_page)
        };
        Pagination { page, per_page, offset: (page - 1) * per_page }
    }

    /// Decodes the body as JSON. Empty or malformed bodies are a `400`.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if self.0.body.is_empty() {
            return Err(HttpError::bad_request("empty request body").into());
        }
        serde_json::from_slice(&self.0.body)
            .map_err(|e| HttpError::wrap(StatusCode::BAD_REQUEST, "invalid JSON", e).into())
    }

    /// Client address: `X-Real-IP`, else the first `X-Forwarded-For` entry,
    /// else the connection's peer address.
    pub fn real_ip(&self) -> Option<String> {
        if let Some(ip) = self.header("x-real-ip").filter(|v| !v.is_empty()) {
            return Some(ip.to_owned());
        }
        if let Some(xff) = self.header("x-forwarded-for").filter(|v| !v.is_empty()) {
            let first = xff.split(',').next().unwrap_or(xff);
            return Some(first.trim().to_owned());
        }
        self.extensions()
            .get::<PeerAddr>()
            .map(|peer| peer.0.ip().to_string())
    }

    // ── Path parameters ───────────────────────────────────────────────────────

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `c.param("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn param(&self, name: &str) -> Option<String> {
        self.0.params.read().get(name).map(str::to_owned)
    }

    /// A path parameter parsed as an integer. Missing or non-numeric values
    /// are a `400`.
    pub fn param_int(&self, name: &str) -> Result<i64, Error> {
        let raw = self
            .param(name)
            .ok_or_else(|| HttpError::bad_request(format!("missing parameter: {name}")))?;
        raw.parse().map_err(|e| {
            HttpError::wrap(StatusCode::BAD_REQUEST, format!("invalid parameter: {name}"), e).into()
        })
    }

    /// A path parameter as an integer, `default` when missing or invalid.
    pub fn param_int_or(&self, name: &str, default: i64) -> i64 {
        self.param_int(name).unwrap_or(default)
    }

    /// Snapshot of every captured path parameter.
    pub fn params(&self) -> Params {
        self.0.params.read().clone()
    }

    pub(crate) fn set_params(&self, params: Params) {
        *self.0.params.write() = params;
    }

    // ── Store ─────────────────────────────────────────────────────────────────

    /// Stores `value` under `key` for later layers of the same request.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.0.store.lock().insert(key.into(), Box::new(value));
    }

    /// A clone of the value under `key`, if present and of type `T`.
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.0.store.lock().get(key)?.downcast_ref::<T>().cloned()
    }

    /// Convenience for string values; absent or non-string values read as
    /// `None`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get::<String>(key)
            .or_else(|| self.get::<&'static str>(key).map(str::to_owned))
    }

    /// An integer stored under `key` as any of `i64`, `i32`, `u32` or
    /// `usize`. Values that do not fit an `i64` read as `None`.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        let store = self.0.store.lock();
        let value = store.get(key)?;
        if let Some(v) = value.downcast_ref::<i64>() {
            Some(*v)
        } else if let Some(v) = value.downcast_ref::<i32>() {
            Some(i64::from(*v))
        } else if let Some(v) = value.downcast_ref::<u32>() {
            Some(i64::from(*v))
        } else {
            value.downcast_ref::<usize>().and_then(|v| i64::try_from(*v).ok())
        }
    }

    /// Removes `key`, reporting whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.0.store.lock().remove(key).is_some()
    }

    // ── Application ───────────────────────────────────────────────────────────

    /// The owning application's shared facilities.
    pub fn app(&self) -> &AppHandle {
        &self.0.app
    }

    // ── Response ──────────────────────────────────────────────────────────────

    /// Whether a response has already been written for this request.
    pub fn is_written(&self) -> bool {
        self.0.written.load(Ordering::Acquire)
    }

    /// Status of the written response, `200` while nothing was written.
    pub fn status(&self) -> StatusCode {
        self.0
            .response
            .lock()
            .as_ref()
            .map_or(StatusCode::OK, |r| r.status)
    }

    /// Sets a header on the response that is yet to be written. Ignored once
    /// the response has been written.
    pub fn set_header(&self, name: &str, value: &str) {
        if self.is_written() {
            debug!(name, "header set after response was written, ignored");
            return;
        }
        let mut pending = self.0.pending_headers.lock();
        pending.remove(name);
        append_header(&mut pending, name, value);
    }

    /// Writes `response`. The first write of a request wins; later writes are
    /// dropped.
    pub fn send(&self, mut response: Response) -> Result<(), Error> {
        if self.0.written.swap(true, Ordering::AcqRel) {
            debug!(status = response.status.as_u16(), "response already written, dropped");
            return Ok(());
        }
        // Headers set by the writer itself take precedence over pending ones.
        let pending = std::mem::take(&mut *self.0.pending_headers.lock());
        for name in pending.keys() {
            if response.headers.contains_key(name) {
                continue;
            }
            for value in pending.get_all(name) {
                response.headers.append(name.clone(), value.clone());
            }
        }
        *self.0.response.lock() = Some(response);
        Ok(())
    }

    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) -> Result<(), Error> {
        let body = serde_json::to_vec(value)?;
        self.send(Response::builder().status(status).json(body))
    }

    pub fn text(&self, status: StatusCode, body: impl Into<String>) -> Result<(), Error> {
        self.send(Response::builder().status(status).text(body))
    }

    pub fn html(&self, status: StatusCode, body: impl Into<String>) -> Result<(), Error> {
        self.send(Response::builder().status(status).bytes(ContentType::Html, body.into()))
    }

    pub fn blob(&self, status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Result<(), Error> {
        self.send(Response::builder().status(status).blob(content_type, body))
    }

    pub fn no_content(&self) -> Result<(), Error> {
        self.send(Response::status_only(StatusCode::NO_CONTENT))
    }

    /// `201 Created` with a JSON body.
    pub fn created<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), Error> {
        self.json(StatusCode::CREATED, value)
    }

    /// Redirects to `location`. Only `300`–`308` are accepted; anything else
    /// is a `400` and nothing is written.
    pub fn redirect(&self, status: StatusCode, location: &str) -> Result<(), Error> {
        if !(300..=308).contains(&status.as_u16()) {
            return Err(HttpError::bad_request("invalid redirect status code").into());
        }
        self.send(
            Response::builder()
                .status(status)
                .header(LOCATION.as_str(), location)
                .no_body(),
        )
    }

    /// Writes the standard JSON error body
    /// `{"error":{"code":<status>,"message":<message>}}`.
    pub fn error(&self, status: StatusCode, message: &str) -> Result<(), Error> {
        self.write_error(status, message, None)
    }

    pub(crate) fn write_error(
        &self,
        status: StatusCode,
        message: &str,
        detail: Option<String>,
    ) -> Result<(), Error> {
        let mut error = serde_json::json!({
            "code": status.as_u16(),
            "message": message,
        });
        if let Some(detail) = detail {
            error["debug"] = serde_json::Value::String(detail);
        }
        self.json(status, &serde_json::json!({ "error": error }))
    }

    /// Takes the written response, or builds the implicit empty `200` carrying
    /// any pending headers when no writer ran.
    pub(crate) fn take_response(&self) -> Response {
        if let Some(response) = self.0.response.lock().take() {
            return response;
        }
        let mut response = Response::status_only(StatusCode::OK);
        response.headers = std::mem::take(&mut *self.0.pending_headers.lock());
        response
    }
}

// ── Pool ──────────────────────────────────────────────────────────────────────

/// Thread-safe cache of idle context slots.
///
/// [`acquire`](Self::acquire) never blocks on an empty pool; it allocates.
/// At most `capacity` idle slots are retained.
pub(crate) struct ContextPool {
    idle: Mutex<Vec<Arc<Slot>>>,
    capacity: usize,
}

impl ContextPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { idle: Mutex::new(Vec::new()), capacity }
    }

    /// Hands out a freshly reset context for one request.
    pub(crate) fn acquire(&self, parts: Parts, body: Bytes, app: &Arc<AppHandle>) -> Lease<'_> {
        let recycled = self.idle.lock().pop();
        let slot = match recycled {
            Some(mut slot) => match Arc::get_mut(&mut slot) {
                Some(inner) => {
                    inner.reset(parts, body, Arc::clone(app));
                    slot
                }
                None => Arc::new(Slot::new(parts, body, Arc::clone(app))),
            },
            None => Arc::new(Slot::new(parts, body, Arc::clone(app))),
        };
        Lease { pool: self, ctx: Some(Context(slot)) }
    }

    fn release(&self, ctx: Context) {
        let mut slot = ctx.0;
        let Some(inner) = Arc::get_mut(&mut slot) else {
            debug!("context still referenced after dispatch, not pooled");
            return;
        };
        inner.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(slot);
        }
    }

    #[cfg(test)]
    pub(crate) fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }
}

/// Exclusive use of one pooled context for the duration of a dispatch.
///
/// Dropping the lease returns the context to the pool, whether the chain
/// finished, failed, panicked, or was cancelled by dropping its future.
pub(crate) struct Lease<'a> {
    pool: &'a ContextPool,
    ctx: Option<Context>,
}

impl Lease<'_> {
    pub(crate) fn context(&self) -> &Context {
        self.ctx.as_ref().expect("context is present until the lease drops")
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.release(ctx);
        }
    }
}
