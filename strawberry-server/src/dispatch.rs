// Request dispatch: body -> validated parameters -> handler -> envelope

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use strawberry_core::{parse, ClusterInfo, RequestParams, ValueSource};
use tracing::{info, warn};
use uuid::Uuid;

use crate::commands::CommandDescriptor;
use crate::controller::{Controller, OperationContext};
use crate::error::{ApiResult, Envelope};
use crate::security::Identity;

/// User reported to controllers when the auth gate is disabled.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Everything handlers of one cluster share.
pub struct ClusterApi {
    pub cluster: ClusterInfo,
    pub controller: Arc<dyn Controller>,
    /// Fallback for parameters missing from the request body.
    pub external: Arc<dyn ValueSource>,
}

/// Per-request facts passed to handlers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub command: &'static str,
    pub request_id: Uuid,
    pub identity: Option<Identity>,
}

impl RequestContext {
    pub fn operation(&self) -> OperationContext {
        OperationContext {
            user: self
                .identity
                .as_ref()
                .map_or_else(|| ANONYMOUS_USER.to_string(), |identity| identity.user.clone()),
            request_id: self.request_id.to_string(),
        }
    }
}

/// Runs one command against one cluster and renders the envelope.
/// Validation failures never reach the controller.
pub async fn dispatch(
    api: Arc<ClusterApi>,
    command: &'static CommandDescriptor,
    identity: Option<Identity>,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();
    let cluster = api.cluster.proxy.clone();
    info!(cmd = command.name, cluster = %cluster, request_id = %request_id, "command started");

    let started = Instant::now();
    let ctx = RequestContext {
        command: command.name,
        request_id,
        identity,
    };
    let outcome = run(api, command, ctx, &body).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(result) => {
            info!(
                cmd = command.name,
                cluster = %cluster,
                request_id = %request_id,
                elapsed_ms,
                "command finished"
            );
            Envelope::ok(result).into_response()
        }
        Err(err) => {
            warn!(
                cmd = command.name,
                cluster = %cluster,
                request_id = %request_id,
                elapsed_ms,
                status = err.status_code().as_u16(),
                "command finished with error: {}",
                err
            );
            err.into_response()
        }
    }
}

async fn run(
    api: Arc<ClusterApi>,
    command: &'static CommandDescriptor,
    ctx: RequestContext,
    body: &[u8],
) -> ApiResult<Value> {
    let request = RequestParams::from_body(body)?;
    let params = parse(&request, command.parameters, api.external.as_ref())?;
    (command.handler)(api, ctx, params).await
}
