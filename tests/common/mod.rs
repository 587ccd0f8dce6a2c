//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, Response},
    Router,
};
use middleware_bridge::config::{BridgeConfig, Phase};
use middleware_bridge::{ChainStack, HttpServer, Shutdown};
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const PEER: &str = "127.0.0.1:40000";

/// Config with the chain attached at `hook`.
pub fn config(hook: Phase) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.middleware.hook = hook;
    config
}

/// Build the full application router.
pub fn app(config: BridgeConfig, stack: &ChainStack, routes: Router) -> Router {
    HttpServer::new(config, stack.clone(), routes).into_router()
}

/// A request carrying the connect info the server would attach.
pub fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    let peer: SocketAddr = PEER.parse().unwrap();
    let mut builder = Request::builder().method(method).uri(uri).header("host", "localhost");
    if let Some(extensions) = builder.extensions_mut() {
        extensions.insert(ConnectInfo(peer));
    }
    builder
}

pub fn get(uri: &str) -> Request<Body> {
    request(Method::GET, uri).body(Body::empty()).unwrap()
}

/// Drive one request through `app`.
pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serve on an ephemeral port; returns the address and the shutdown handle.
pub async fn start_server(config: BridgeConfig, stack: &ChainStack, routes: Router) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, stack.clone(), routes);
    let stop = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, stop).await.unwrap();
    });
    (addr, shutdown)
}
