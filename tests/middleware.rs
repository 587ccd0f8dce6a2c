//! Chain behavior observed through the host pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use middleware_bridge::config::Phase;
use middleware_bridge::host::Decorations;
use middleware_bridge::middlewares::{Cors, SecurityHeaders};
use middleware_bridge::{BoxError, ChainStack, HttpError, HttpServer, Next, RawRequest, RawResponse};
use futures_util::StreamExt;
use serde_json::{json, Value};

mod common;

fn hello() -> Router {
    Router::new().route("/", get(|| async { Json(json!({ "hello": "world" })) }))
}

fn counted(hits: &Arc<AtomicUsize>) -> Router {
    let hits = hits.clone();
    Router::new().route(
        "/",
        get(move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                "route"
            }
        }),
    )
}

#[tokio::test]
async fn test_use_middleware() {
    let stack = ChainStack::new();
    stack.append_global(|_req: RawRequest, res: RawResponse, next: Next| async move {
        res.set_header(header::HeaderName::from_static("x-middleware"), HeaderValue::from_static("1"))
            .unwrap();
        next.proceed();
    });

    let app = common::app(common::config(Phase::OnRequest), &stack, hello());
    let response = common::send(app, common::get("/")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-middleware"], "1");
    assert_eq!(common::body_json(response).await, json!({ "hello": "world" }));
}

#[tokio::test]
async fn test_empty_chain_leaves_request_untouched() {
    let stack = ChainStack::new();
    stack
        .append("/admin", |req: RawRequest, res: RawResponse, next: Next| async move {
            req.set("admin", true);
            req.set_header(header::HeaderName::from_static("x-admin"), HeaderValue::from_static("1"));
            res.set_header(header::HeaderName::from_static("x-admin-seen"), HeaderValue::from_static("1"))
                .unwrap();
            next.proceed();
        })
        .unwrap();

    let routes = Router::new().route(
        "/",
        get(|headers: HeaderMap, Extension(decorations): Extension<Decorations>| async move {
            Json(json!({
                "locals": Value::Object(decorations.locals),
                "x_admin": headers.contains_key("x-admin"),
            }))
        }),
    );
    let app = common::app(common::config(Phase::OnRequest), &stack, routes);
    let response = common::send(app, common::get("/")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(!response.headers().contains_key("x-admin-seen"));
    assert_eq!(common::body_json(response).await, json!({ "locals": {}, "x_admin": false }));
}

#[tokio::test]
async fn test_entries_run_in_registration_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let stack = ChainStack::new();
    for i in 1..=3 {
        let order = order.clone();
        stack.append_global(move |_req: RawRequest, _res: RawResponse, next: Next| {
            let order = order.clone();
            async move {
                order.lock().unwrap().push(i);
                next.proceed();
            }
        });
    }

    let app = common::app(common::config(Phase::OnRequest), &stack, hello());
    let response = common::send(app, common::get("/")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_end_stops_chain_and_route() {
    let hits = Arc::new(AtomicUsize::new(0));
    let later = Arc::new(AtomicUsize::new(0));
    let stack = ChainStack::new();
    stack.append_global(|_req: RawRequest, res: RawResponse, _next: Next| async move {
        res.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .unwrap();
        res.end_with("stopped here").unwrap();
    });
    let seen = later.clone();
    stack.append_global(move |_req: RawRequest, _res: RawResponse, next: Next| {
        let seen = seen.clone();
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            next.proceed();
        }
    });

    // Body parsing would reject this payload; it must never run.
    let request = common::request(Method::GET, "/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let app = common::app(common::config(Phase::OnRequest), &stack, counted(&hits));
    let response = common::send(app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(common::body_string(response).await, "stopped here");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(later.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_streamed_response_stops_chain() {
    let hits = Arc::new(AtomicUsize::new(0));
    let stack = ChainStack::new();
    stack.append_global(|_req: RawRequest, res: RawResponse, _next: Next| async move {
        let chunks = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from("one,")),
            Ok(Bytes::from("two,")),
            Ok(Bytes::from("three")),
        ]);
        res.pipe(chunks).await.unwrap();
    });

    let app = common::app(common::config(Phase::OnRequest), &stack, counted(&hits));
    let response = common::send(app, common::get("/")).await;

    assert_eq!(common::body_string(response).await, "one,two,three");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_body_reaches_client_before_end() {
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let release = Arc::new(Mutex::new(Some(release_rx)));
    let stack = ChainStack::new();
    stack.append_global(move |_req: RawRequest, res: RawResponse, _next: Next| {
        let release = release.lock().unwrap().take();
        async move {
            res.write("partial").unwrap();
            if let Some(release) = release {
                let _ = release.await;
            }
            res.end_with(",rest").unwrap();
        }
    });

    let app = common::app(common::config(Phase::OnRequest), &stack, hello());
    let response = tokio::time::timeout(Duration::from_secs(1), common::send(app, common::get("/")))
        .await
        .expect("response handed out before the handler ended");
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    assert_eq!(&body.next().await.unwrap().unwrap()[..], b"partial");
    assert!(tokio::time::timeout(Duration::from_millis(50), body.next()).await.is_err());

    release_tx.send(()).unwrap();
    assert_eq!(&body.next().await.unwrap().unwrap()[..], b",rest");
    assert!(body.next().await.is_none());
}

#[tokio::test]
async fn test_prefixed_entry_sees_stripped_url() {
    let stack = ChainStack::new();
    stack
        .append("/prefix", |req: RawRequest, res: RawResponse, next: Next| async move {
            res.set_header(
                header::HeaderName::from_static("x-url"),
                HeaderValue::from_str(&req.url()).unwrap(),
            )
            .unwrap();
            res.set_header(
                header::HeaderName::from_static("x-original-url"),
                HeaderValue::from_str(&req.original_url()).unwrap(),
            )
            .unwrap();
            next.proceed();
        })
        .unwrap();

    let routes = Router::new()
        .route("/prefix/inner", get(|| async { "inner" }))
        .route("/prefixed", get(|| async { "prefixed" }));
    let app = common::app(common::config(Phase::OnRequest), &stack, routes);

    let response = common::send(app.clone(), common::get("/prefix/inner?x=1")).await;
    assert_eq!(response.headers()["x-url"], "/inner?x=1");
    assert_eq!(response.headers()["x-original-url"], "/prefix/inner?x=1");
    assert_eq!(common::body_string(response).await, "inner");

    let response = common::send(app, common::get("/prefixed")).await;
    assert!(!response.headers().contains_key("x-url"));
    assert_eq!(common::body_string(response).await, "prefixed");
}

#[tokio::test]
async fn test_properties_reach_the_route() {
    let stack = ChainStack::new();
    stack.append_global(|req: RawRequest, _res: RawResponse, next: Next| async move {
        req.set("a", 1);
        next.proceed();
    });
    stack.append_global(|req: RawRequest, _res: RawResponse, next: Next| async move {
        if req.get("a") == Some(json!(1)) {
            req.set("b", 2);
            next.proceed();
        } else {
            next.fail("property a missing");
        }
    });

    let routes = Router::new().route(
        "/",
        get(|Extension(decorations): Extension<Decorations>| async move { Json(Value::Object(decorations.locals)) }),
    );
    let app = common::app(common::config(Phase::OnRequest), &stack, routes);
    let response = common::send(app, common::get("/")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_json(response).await, json!({ "a": 1, "b": 2 }));
}

#[tokio::test]
async fn test_request_header_changes_reach_the_route() {
    let stack = ChainStack::new();
    stack.append_global(|req: RawRequest, _res: RawResponse, next: Next| async move {
        req.set_header(header::HeaderName::from_static("x-added"), HeaderValue::from_static("yes"));
        next.proceed();
    });

    let routes = Router::new().route(
        "/",
        get(|headers: HeaderMap| async move {
            headers
                .get("x-added")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("missing")
                .to_string()
        }),
    );
    let app = common::app(common::config(Phase::OnRequest), &stack, routes);
    let response = common::send(app, common::get("/")).await;

    assert_eq!(common::body_string(response).await, "yes");
}

#[tokio::test]
async fn test_error_goes_to_error_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let stack = ChainStack::new();
    stack.append_global(|_req: RawRequest, _res: RawResponse, next: Next| async move {
        next.fail("kaboom");
    });

    let app = common::app(common::config(Phase::OnRequest), &stack, counted(&hits));
    let response = common::send(app, common::get("/")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        common::body_json(response).await,
        json!({ "statusCode": 500, "error": "Internal Server Error", "message": "kaboom" })
    );
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_http_error_keeps_its_status() {
    let stack = ChainStack::new();
    stack.append_global(|_req: RawRequest, _res: RawResponse, next: Next| async move {
        next.fail(HttpError::forbidden("no entry"));
    });

    let app = common::app(common::config(Phase::PreHandler), &stack, hello());
    let response = common::send(app, common::get("/")).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(common::body_json(response).await["message"], "no entry");
}

#[tokio::test]
async fn test_custom_error_handler() {
    let stack = ChainStack::new();
    stack.append_global(|_req: RawRequest, _res: RawResponse, next: Next| async move {
        next.fail("teapot");
    });

    let app = HttpServer::new(common::config(Phase::OnRequest), stack, hello())
        .with_error_handler(|err: BoxError, _parts: &axum::http::request::Parts| {
            Response::builder()
                .status(StatusCode::IM_A_TEAPOT)
                .body(Body::from(err.to_string()))
                .unwrap_or_default()
        })
        .into_router();
    let response = common::send(app, common::get("/")).await;

    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(common::body_string(response).await, "teapot");
}

#[tokio::test]
async fn test_failure_wins_over_later_end() {
    let hits = Arc::new(AtomicUsize::new(0));
    let stack = ChainStack::new();
    stack.append_global(|_req: RawRequest, res: RawResponse, next: Next| async move {
        next.fail(HttpError::forbidden("denied"));
        res.end();
    });

    let app = common::app(common::config(Phase::OnRequest), &stack, counted(&hits));
    let response = common::send(app, common::get("/")).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(common::body_json(response).await["message"], "denied");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_properties_set_before_failure_reach_error_handler() {
    let stack = ChainStack::new();
    stack.append_global(|req: RawRequest, _res: RawResponse, next: Next| async move {
        req.set("user", "alice");
        next.fail(HttpError::forbidden("suspended"));
    });

    let app = HttpServer::new(common::config(Phase::OnRequest), stack, hello())
        .with_error_handler(|err: BoxError, parts: &axum::http::request::Parts| {
            let user = parts
                .extensions
                .get::<Decorations>()
                .and_then(|decorations| decorations.local("user").cloned())
                .unwrap_or(Value::Null);
            Json(json!({ "user": user, "error": err.to_string() })).into_response()
        })
        .into_router();
    let response = common::send(app, common::get("/")).await;

    assert_eq!(
        common::body_json(response).await,
        json!({ "user": "alice", "error": "suspended" })
    );
}

#[tokio::test]
async fn test_handler_panic_is_500() {
    let stack = ChainStack::new();
    stack.append_global(|_req: RawRequest, _res: RawResponse, _next: Next| async move {
        panic!("middleware exploded");
    });

    let app = common::app(common::config(Phase::OnRequest), &stack, hello());
    let response = common::send(app, common::get("/")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_proceeding_headers_merge_onto_route_response() {
    let stack = ChainStack::new();
    stack.append_global(|_req: RawRequest, res: RawResponse, next: Next| async move {
        res.set_header(header::HeaderName::from_static("x-powered-by"), HeaderValue::from_static("bridge"))
            .unwrap();
        res.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .unwrap();
        next.proceed();
    });

    let app = common::app(common::config(Phase::OnRequest), &stack, hello());
    let response = common::send(app, common::get("/")).await;

    assert_eq!(response.headers()["x-powered-by"], "bridge");
    assert_eq!(response.headers()["content-type"], "application/json");
}

#[tokio::test]
async fn test_security_headers_and_cors() {
    let stack = ChainStack::new();
    stack.append_global(Cors::permissive());
    stack.append_global(SecurityHeaders);

    let app = common::app(common::config(Phase::OnRequest), &stack, hello());
    let response = common::send(app, common::get("/")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");
    assert_eq!(common::body_json(response).await, json!({ "hello": "world" }));
}

#[tokio::test]
async fn test_cors_preflight_answers_204() {
    let hits = Arc::new(AtomicUsize::new(0));
    let stack = ChainStack::new();
    stack.append_global(Cors::allow_origin("https://example.com"));
    stack.append_global(SecurityHeaders);

    let request = common::request(Method::OPTIONS, "/")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();
    let app = common::app(common::config(Phase::OnRequest), &stack, counted(&hits));
    let response = common::send(app, request).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["access-control-allow-origin"], "https://example.com");
    assert_eq!(response.headers()["access-control-allow-headers"], "content-type");
    assert!(!response.headers().contains_key("x-frame-options"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
