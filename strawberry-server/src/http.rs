// HTTP composition: family routers, host table and the outer app

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header::HOST, Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use strawberry_core::{EnvSource, ExternalSource, NoSource, ServerConfig, ValueSource};
use tower::ServiceExt;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::client::Credential;
use crate::cluster::{ClusterRouter, RouterSettings};
use crate::commands;
use crate::controller::ControllerFactory;
use crate::error::{ApiError, StartupError};
use crate::security::Authenticator;

#[derive(Clone)]
struct FamilyState {
    family: Arc<str>,
    clusters: Arc<BTreeMap<String, Router>>,
    description: Arc<Value>,
}

/// Routes of one family: `/ping`, `/describe` and
/// `/<cluster>/<command>` for every cluster declared for it.
pub fn family_router(family: &str, clusters: Vec<ClusterRouter>) -> Router {
    let proxies: Vec<&str> = clusters.iter().map(|c| c.info.proxy.as_str()).collect();
    let description = json!({
        "clusters": proxies,
        "commands": commands::describe_all(),
    });

    let state = FamilyState {
        family: Arc::from(family),
        clusters: Arc::new(
            clusters
                .into_iter()
                .map(|cluster| (cluster.info.proxy, cluster.router))
                .collect(),
        ),
        description: Arc::new(description),
    };

    Router::new()
        .route("/ping", get(ping))
        .route("/describe", get(describe))
        .route("/:cluster/:command", any(forward_to_cluster))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(unknown_route)
        .with_state(state)
}

async fn unknown_route(uri: Uri) -> ApiError {
    ApiError::UnknownRoute(uri.path().to_string())
}

pub(crate) async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::MethodNotAllowed {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

/// `TimeoutLayer` answers with a bare 408; give it the error envelope.
async fn timeout_envelope(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        ApiError::Timeout.into_response()
    } else {
        response
    }
}

async fn ping() -> StatusCode {
    StatusCode::OK
}

async fn describe(State(state): State<FamilyState>) -> Json<Value> {
    Json(state.description.as_ref().clone())
}

async fn forward_to_cluster(
    State(state): State<FamilyState>,
    Path((cluster, command)): Path<(String, String)>,
    request: Request,
) -> Response {
    let Some(router) = state.clusters.get(&cluster) else {
        debug!(family = %state.family, cluster = %cluster, "unknown cluster");
        return ApiError::UnknownCluster(cluster).into_response();
    };
    if commands::find(&command).is_none() {
        return ApiError::UnknownCommand(command).into_response();
    }

    let (mut parts, body) = request.into_parts();
    let path_and_query = match parts.uri.query() {
        Some(query) => format!("/{}?{}", command, query),
        None => format!("/{}", command),
    };
    parts.uri = match path_and_query.parse::<Uri>() {
        Ok(uri) => uri,
        Err(_) => return ApiError::UnknownCommand(command).into_response(),
    };

    oneshot(router.clone(), Request::from_parts(parts, body)).await
}

async fn oneshot(router: Router, request: Request<Body>) -> Response {
    match router.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

/// Request host to family router. Lookup order: exact host, `*.suffix`
/// patterns (longest first), then `*`.
#[derive(Clone, Default)]
pub struct HostTable {
    exact: HashMap<String, Router>,
    suffixes: Vec<(String, Router)>,
    fallback: Option<Router>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pattern: &str, router: Router) {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern == "*" {
            self.fallback = Some(router);
        } else if let Some(suffix) = pattern.strip_prefix("*.") {
            self.suffixes.push((format!(".{}", suffix), router));
            self.suffixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        } else {
            self.exact.insert(pattern, router);
        }
    }

    pub fn resolve(&self, host: &str) -> Option<&Router> {
        let host = normalize_host(host);
        self.exact
            .get(&host)
            .or_else(|| {
                self.suffixes
                    .iter()
                    .find(|(suffix, _)| host.ends_with(suffix.as_str()))
                    .map(|(_, router)| router)
            })
            .or(self.fallback.as_ref())
    }
}

/// Lowercases and drops the port (IPv6 literals keep their brackets).
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    };
    without_port.to_ascii_lowercase()
}

fn request_host(request: &Request) -> String {
    request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().host().map(str::to_string))
        .unwrap_or_default()
}

async fn route_by_host(State(hosts): State<Arc<HostTable>>, request: Request) -> Response {
    let host = request_host(&request);
    match hosts.resolve(&host) {
        Some(router) => oneshot(router.clone(), request).await,
        None => {
            warn!(host = %host, "no family is mapped for host");
            ApiError::UnknownHost(host).into_response()
        }
    }
}

fn external_source(config: &ServerConfig) -> Arc<dyn ValueSource> {
    match config.params.external_source {
        ExternalSource::None => Arc::new(NoSource),
        ExternalSource::Env => Arc::new(EnvSource),
    }
}

/// Builds the whole routing table. Any failure aborts: the server never
/// starts with a partial table.
pub fn build_app(
    config: &ServerConfig,
    factories: &BTreeMap<String, ControllerFactory>,
    authenticator: Arc<dyn Authenticator>,
) -> Result<Router, StartupError> {
    let settings = RouterSettings {
        credential: Credential::new(config.service_user.clone(), config.token.clone()),
        authenticator,
        disable_auth: config.disable_auth,
        external: external_source(config),
    };
    if settings.disable_auth {
        warn!("⚠️  Authentication is disabled, every caller is trusted");
    }

    let mut families = BTreeMap::new();
    for (family, factory) in factories {
        let clusters = config
            .clusters_of(family)
            .map(|info| ClusterRouter::build(info, factory, &settings))
            .collect::<Result<Vec<_>, _>>()?;
        info!(family = %family, clusters = clusters.len(), "family router ready");
        families.insert(family.clone(), family_router(family, clusters));
    }

    let mut hosts = HostTable::new();
    for (host, family) in config.controller_mappings_or_default() {
        let router = families.get(&family).ok_or_else(|| StartupError::UnmappedFamily {
            host: host.clone(),
            family: family.clone(),
        })?;
        debug!(host = %host, family = %family, "host mapped");
        hosts.insert(&host, router.clone());
    }

    Ok(Router::new()
        .fallback(route_by_host)
        .with_state(Arc::new(hosts))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(middleware::map_response(timeout_envelope))
        .layer(TraceLayer::new_for_http()))
}
