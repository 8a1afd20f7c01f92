//! Minimal switchyard example: JSON endpoints, a route group with its own
//! middleware, static files and health checks.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl http://localhost:3000/users/abc            # 404: id must be numeric
//!   curl -X PUT http://localhost:3000/users/42      # 405
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -H 'x-api-key: secret' http://localhost:3000/admin/stats
//!   curl http://localhost:3000/healthz

use serde::{Deserialize, Serialize};
use switchyard::{
    App, BoxError, Context, HttpError, Next, Result, Server, StatusCode, health, middleware,
};

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

#[derive(Serialize)]
struct User {
    id: i64,
    name: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut app = App::new();
    app.use_middleware(middleware::recover());
    app.use_middleware(middleware::trace());

    app.get("/users/{id:[0-9]+}",    get_user)
        .post("/users",               create_user)
        .delete("/users/{id:[0-9]+}", delete_user)
        .get("/healthz",              health::liveness)
        .get("/readyz",               health::readiness)
        .static_files("/assets", "./public");

    app.on_shutdown(|app: &App| -> std::result::Result<(), BoxError> {
        tracing::info!(routes = app.routes().len(), "flushing before exit");
        Ok(())
    });

    let admin = app.group("/admin", [middleware::boxed(middleware::from_fn(require_api_key))]);
    admin.get("/stats", stats);

    if let Err(e) = Server::bind("0.0.0.0:3000").serve(app).await {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}

// GET /users/{id}
async fn get_user(c: Context) -> Result {
    let id = c.param_int("id")?;
    c.json(StatusCode::OK, &User { id, name: "alice".to_owned() })
}

// POST /users
async fn create_user(c: Context) -> Result {
    let input: CreateUser = c.bind_json()?;
    c.set_header("location", "/users/99");
    c.created(&User { id: 99, name: input.name })
}

// DELETE /users/{id} → 204 No Content
async fn delete_user(c: Context) -> Result {
    c.no_content()
}

// GET /admin/stats
async fn stats(c: Context) -> Result {
    c.json(StatusCode::OK, &serde_json::json!({ "requests": 0 }))
}

async fn require_api_key(c: Context, next: Next) -> Result {
    if c.header("x-api-key") != Some("secret") {
        return Err(HttpError::unauthorized("missing or invalid api key").into());
    }
    next.run(c).await
}
