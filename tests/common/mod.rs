// Shared helpers for driving the composed app in-process
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use strawberry_core::{ClusterInfo, FamilyConfig, ServerConfig};
use strawberry_server::{build_app, factories_from_config, TokenManager};
use tower::ServiceExt;

pub const SECRET: &str = "test_secret_key_for_testing_only";

pub const CLUSTER: &str = "hahn";

/// One `sleep` family with two clusters; no host mappings, so `*` points
/// at the family.
pub fn sleep_config(disable_auth: bool) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.disable_auth = disable_auth;
    config.jwt_secret = Some(SECRET.to_string());
    config.token = "service-token".to_string();
    config.families.insert(
        "sleep".to_string(),
        FamilyConfig {
            controller: "sleep".to_string(),
            config: json!({"pool": "research"}),
        },
    );
    config
        .clusters
        .push(ClusterInfo::new("sleep", CLUSTER, "//sys/strawberry/sleep"));
    config.clusters.push(
        ClusterInfo::new("sleep", "localhost:8000", "//sys/strawberry/sleep").with_stage("local"),
    );
    config
}

pub fn build(config: &ServerConfig) -> Router {
    let factories = factories_from_config(config).unwrap();
    build_app(config, &factories, Arc::new(TokenManager::new(SECRET))).unwrap()
}

pub fn token(user: &str) -> String {
    TokenManager::new(SECRET).generate_token(user, vec![]).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn post_as(
    app: &Router,
    host: &str,
    path: &str,
    token: Option<&str>,
    params: Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("Host", host)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let body = json!({ "params": params }).to_string();
    send(app, builder.body(Body::from(body)).unwrap()).await
}

/// Runs `command` on the default cluster with auth disabled.
pub async fn command(app: &Router, command: &str, params: Value) -> (StatusCode, Value) {
    post_as(app, "localhost", &format!("/{}/{}", CLUSTER, command), None, params).await
}

pub async fn get(app: &Router, host: &str, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", host)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}
