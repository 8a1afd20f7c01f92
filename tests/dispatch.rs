use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{Value, json};
use switchyard::{
    App, Config, Context, Error, HttpError, Method, Middleware, Next, Response, StatusCode,
    middleware,
};

fn request(method: Method, uri: &str) -> http::Request<Bytes> {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Bytes::new())
        .unwrap()
}

async fn send(app: &App, method: Method, uri: &str) -> Response {
    app.dispatch(request(method, uri)).await
}

fn body_json(res: &Response) -> Value {
    serde_json::from_slice(res.body()).unwrap()
}

fn body_text(res: &Response) -> &str {
    std::str::from_utf8(res.body()).unwrap()
}

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log, name: &'static str) -> impl Middleware {
    let log = Arc::clone(log);
    middleware::from_fn(move |c: Context, next: Next| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(format!("{name}-pre"));
            let out = next.run(c).await;
            log.lock().push(format!("{name}-post"));
            out
        }
    })
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_path_is_404_and_wrong_method_is_405() {
    let app = App::new();
    app.get("/resource", |c: Context| async move { c.text(StatusCode::OK, "ok") });

    let res = send(&app, Method::POST, "/resource").await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        body_json(&res),
        json!({"error": {"code": 405, "message": "method not allowed"}})
    );

    let res = send(&app, Method::GET, "/nothing-here").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(&res),
        json!({"error": {"code": 404, "message": "route not found"}})
    );

    let res = send(&app, Method::GET, "/resource/").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn parameters_reach_the_handler() {
    let app = App::new();
    app.get("/users/{id:[0-9]+}/posts/{slug}", |c: Context| async move {
        let body = format!("{}:{}", c.param_int("id")?, c.param("slug").unwrap_or_default());
        c.text(StatusCode::OK, body)
    });

    let res = send(&app, Method::GET, "/users/42/posts/hello-world").await;
    assert_eq!(body_text(&res), "42:hello-world");

    let res = send(&app, Method::GET, "/users/abc/posts/x").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn percent_encoded_paths_route_on_their_decoded_form() {
    let app = App::new();
    app.get("/users/{name}", |c: Context| async move {
        let name = c.param("name").unwrap_or_default();
        c.json(StatusCode::OK, &json!({ "name": name, "raw": c.uri().path() }))
    });
    app.get("/n/{id:[0-9]+}", |c: Context| async move {
        let id = c.param_int("id")?;
        c.json(StatusCode::OK, &json!({ "id": id }))
    });

    let res = send(&app, Method::GET, "/users/john%20doe").await;
    assert_eq!(
        body_json(&res),
        json!({ "name": "john doe", "raw": "/users/john%20doe" })
    );

    let res = send(&app, Method::GET, "/n/%34%32").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(&res), json!({ "id": 42 }));
}

#[tokio::test]
async fn first_registered_route_wins() {
    let app = App::new();
    app.get("/a/{x}", |c: Context| async move { c.text(StatusCode::OK, "param") })
        .get("/a/fixed", |c: Context| async move { c.text(StatusCode::OK, "fixed") });

    let res = send(&app, Method::GET, "/a/fixed").await;
    assert_eq!(body_text(&res), "param");
}

#[tokio::test]
async fn any_answers_every_standard_method() {
    let app = App::new();
    app.any("/echo", |c: Context| async move {
        let method = c.method().to_string();
        c.text(StatusCode::OK, method)
    });

    for method in [Method::GET, Method::POST, Method::DELETE, Method::HEAD] {
        let res = send(&app, method.clone(), "/echo").await;
        assert_eq!(body_text(&res), method.as_str());
    }
    assert_eq!(app.routes().len(), 7);
}

// ── Middleware ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn global_group_and_route_middleware_nest() {
    let log = Log::default();
    let mut app = App::new();
    app.use_middleware(recorder(&log, "global"));

    let api = app.group("/api", [middleware::boxed(recorder(&log, "group"))]);
    let handler_log = Arc::clone(&log);
    api.handle(
        Method::GET,
        "/items",
        move |c: Context| {
            let log = Arc::clone(&handler_log);
            async move {
                log.lock().push("handler".to_owned());
                c.no_content()
            }
        },
        [middleware::boxed(recorder(&log, "route"))],
    );

    let res = send(&app, Method::GET, "/api/items").await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        *log.lock(),
        [
            "global-pre",
            "group-pre",
            "route-pre",
            "handler",
            "route-post",
            "group-post",
            "global-post",
        ]
    );
}

#[tokio::test]
async fn global_middleware_runs_for_unmatched_requests() {
    let log = Log::default();
    let mut app = App::new();
    app.use_middleware(recorder(&log, "global"));
    app.set_not_found(|c: Context| async move { c.text(StatusCode::NOT_FOUND, "custom") });

    let res = send(&app, Method::GET, "/missing").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(&res), "custom");
    assert_eq!(*log.lock(), ["global-pre", "global-post"]);
}

#[tokio::test]
async fn short_circuit_skips_the_handler() {
    let log = Log::default();
    let mut app = App::new();
    app.use_middleware(middleware::from_fn(|c: Context, next: Next| async move {
        if c.header("authorization").is_none() {
            return Err(HttpError::unauthorized("").into());
        }
        next.run(c).await
    }));
    let handler_log = Arc::clone(&log);
    app.get("/secret", move |c: Context| {
        let log = Arc::clone(&handler_log);
        async move {
            log.lock().push("handler".to_owned());
            c.text(StatusCode::OK, "s3cret")
        }
    });

    let res = send(&app, Method::GET, "/secret").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(&res),
        json!({"error": {"code": 401, "message": "Unauthorized"}})
    );
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn middleware_added_to_parent_later_skips_existing_child() {
    let log = Log::default();
    let app = App::new();
    let mut parent = app.group("/p", []);
    let child = parent.group("/c", []);
    parent.use_middleware(recorder(&log, "late"));
    child.get("/x", |c: Context| async move { c.no_content() });
    parent.get("/y", |c: Context| async move { c.no_content() });

    send(&app, Method::GET, "/p/c/x").await;
    assert!(log.lock().is_empty());
    send(&app, Method::GET, "/p/y").await;
    assert_eq!(*log.lock(), ["late-pre", "late-post"]);
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn http_errors_keep_their_status() {
    let app = App::new();
    app.get("/conflict", |_c: Context| async move {
        Err::<(), Error>(HttpError::conflict("already exists").into())
    });

    let res = send(&app, Method::GET, "/conflict").await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(
        body_json(&res),
        json!({"error": {"code": 409, "message": "already exists"}})
    );
}

#[tokio::test]
async fn unclassified_errors_become_opaque_500s() {
    let app = App::new();
    app.get("/io", |_c: Context| async move {
        Err::<(), Error>(std::io::Error::other("disk on fire").into())
    });

    let res = send(&app, Method::GET, "/io").await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(&res),
        json!({"error": {"code": 500, "message": "Internal Server Error"}})
    );
}

#[tokio::test]
async fn debug_mode_exposes_causes() {
    let app = App::with_config(Config { debug: true, ..Config::default() });
    app.get("/io", |_c: Context| async move {
        Err::<(), Error>(std::io::Error::other("disk on fire").into())
    });
    app.post("/bind", |c: Context| async move {
        let _: Value = c.bind_json()?;
        c.no_content()
    });

    let res = send(&app, Method::GET, "/io").await;
    assert_eq!(body_json(&res)["error"]["debug"], "disk on fire");

    let res = app
        .dispatch(
            http::Request::builder()
                .method(Method::POST)
                .uri("/bind")
                .body(Bytes::from_static(b"{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(&res);
    assert_eq!(body["error"]["message"], "invalid JSON");
    assert!(body["error"]["debug"].is_string());
}

#[tokio::test]
async fn error_after_write_keeps_the_written_response() {
    let app = App::new();
    app.get("/partial", |c: Context| async move {
        c.text(StatusCode::ACCEPTED, "accepted")?;
        Err::<(), Error>(HttpError::internal("too late").into())
    });

    let res = send(&app, Method::GET, "/partial").await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(body_text(&res), "accepted");
}

#[tokio::test]
async fn silent_handler_yields_empty_200() {
    let app = App::new();
    app.get("/quiet", |c: Context| async move {
        c.set_header("x-request-id", "abc");
        Ok::<(), Error>(())
    });

    let res = send(&app, Method::GET, "/quiet").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.body().is_empty());
    assert_eq!(res.header("x-request-id"), Some("abc"));
}

#[tokio::test]
async fn recover_turns_panics_into_500() {
    let mut app = App::new();
    app.use_middleware(middleware::recover());
    app.get("/boom", |_c: Context| async move {
        if true {
            panic!("kaboom");
        }
        Ok::<(), Error>(())
    });
    app.get("/fine", |c: Context| async move { c.text(StatusCode::OK, "fine") });

    let res = send(&app, Method::GET, "/boom").await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(&res)["error"]["message"], "Internal Server Error");

    let res = send(&app, Method::GET, "/fine").await;
    assert_eq!(body_text(&res), "fine");
}

#[tokio::test]
async fn recover_catches_panics_before_the_first_poll() {
    let mut app = App::new();
    app.use_middleware(middleware::recover());
    app.get("/sync", |_c: Context| -> std::future::Ready<Result<(), Error>> {
        panic!("sync boom")
    });

    let res = send(&app, Method::GET, "/sync").await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(&res)["error"]["message"], "Internal Server Error");
}

// ── Context ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn finished_request_releases_its_stored_values() {
    let shared = Arc::new(String::from("session"));
    let app = App::new();
    let handed_out = Arc::clone(&shared);
    app.get("/keep", move |c: Context| {
        let value = Arc::clone(&handed_out);
        async move {
            c.set("session", value);
            c.text(StatusCode::OK, "kept")
        }
    });

    assert_eq!(Arc::strong_count(&shared), 2);
    let res = send(&app, Method::GET, "/keep").await;
    assert_eq!(body_text(&res), "kept");
    // Only this test and the registered handler hold it; the pooled slot does not.
    assert_eq!(Arc::strong_count(&shared), 2);
}

#[tokio::test]
async fn store_values_flow_from_middleware_to_handler() {
    let mut app = App::new();
    app.use_middleware(middleware::from_fn(|c: Context, next: Next| async move {
        c.set("user", String::from("alice"));
        next.run(c).await
    }));
    app.get("/me", |c: Context| async move {
        let user = c.get_string("user").unwrap_or_default();
        c.json(StatusCode::OK, &json!({ "user": user }))
    });
    app.get("/peek", |c: Context| async move {
        c.remove("user");
        let user = c.get_string("user").unwrap_or_else(|| "gone".to_owned());
        c.text(StatusCode::OK, user)
    });

    assert_eq!(body_json(&send(&app, Method::GET, "/me").await), json!({"user": "alice"}));
    assert_eq!(body_text(&send(&app, Method::GET, "/peek").await), "gone");
}

#[tokio::test]
async fn sequential_requests_do_not_leak_state() {
    let app = App::new();
    app.get("/set/{v}", |c: Context| async move {
        c.set("v", c.param("v").unwrap_or_default());
        c.set_header("x-set", "1");
        c.text(StatusCode::OK, "set")
    });
    app.get("/read", |c: Context| async move {
        let v = c.get_string("v").unwrap_or_else(|| "empty".to_owned());
        c.text(StatusCode::OK, v)
    });

    for _ in 0..3 {
        assert_eq!(body_text(&send(&app, Method::GET, "/set/x").await), "set");
        let res = send(&app, Method::GET, "/read").await;
        assert_eq!(body_text(&res), "empty");
        assert_eq!(res.header("x-set"), None);
    }
}

#[tokio::test]
async fn concurrent_dispatches_are_isolated() {
    let app = Arc::new(App::new());
    app.get("/n/{n}", |c: Context| async move {
        let n = c.param("n").unwrap_or_default();
        tokio::task::yield_now().await;
        c.text(StatusCode::OK, n)
    });

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..64 {
        let app = Arc::clone(&app);
        tasks.spawn(async move {
            let res = app.dispatch(request(Method::GET, &format!("/n/{i}"))).await;
            assert_eq!(body_text(&res), i.to_string());
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }
}

// ── Static files ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn static_files_are_served_from_root() {
    let root = std::env::temp_dir().join(format!("switchyard-static-{}", std::process::id()));
    std::fs::create_dir_all(root.join("docs")).unwrap();
    std::fs::write(root.join("site.css"), "body{}").unwrap();
    std::fs::write(root.join("docs/index.html"), "<h1>docs</h1>").unwrap();

    let app = App::new();
    app.static_files("/assets/", root.clone());

    let res = send(&app, Method::GET, "/assets/site.css").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("text/css; charset=utf-8"));
    assert_eq!(body_text(&res), "body{}");

    let res = send(&app, Method::GET, "/assets/docs").await;
    assert_eq!(body_text(&res), "<h1>docs</h1>");

    let res = send(&app, Method::GET, "/assets/missing.js").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = send(&app, Method::GET, "/assets/../Cargo.toml").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = send(&app, Method::GET, "/assets/%2e%2e/Cargo.toml").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    std::fs::remove_dir_all(&root).unwrap();
}
