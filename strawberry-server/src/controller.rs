// Capability contract between the HTTP layer and a family's controller

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use strawberry_core::{BackendError, ServerConfig};

use crate::client::ClusterClient;
use crate::error::StartupError;
use crate::sleep;

pub type BackendResult<T> = Result<T, BackendError>;

/// Caller facts handed to every controller operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub user: String,
    pub request_id: String,
}

/// How `start` should run the operation.
#[derive(Debug, Clone)]
pub enum StartMode {
    /// Started and tracked with the controller's own credential.
    Tracked,
    /// Started with the caller's credential and not tracked by the
    /// controller. The client is request-scoped and must not be kept.
    Untracked(ClusterClient),
}

/// Backend operations of one cluster of a family. One instance per
/// (family, cluster), shared by all requests to that cluster.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Aliases, or `{"$value": alias, "$attributes": {...}}` items when
    /// attributes are requested.
    async fn list(
        &self,
        ctx: &OperationContext,
        attributes: Option<&[String]>,
    ) -> BackendResult<Value>;

    async fn create(&self, ctx: &OperationContext, alias: &str) -> BackendResult<()>;

    async fn remove(&self, ctx: &OperationContext, alias: &str) -> BackendResult<()>;

    async fn exists(&self, ctx: &OperationContext, alias: &str) -> BackendResult<bool>;

    async fn status(&self, ctx: &OperationContext, alias: &str) -> BackendResult<Value>;

    async fn get_option(
        &self,
        ctx: &OperationContext,
        alias: &str,
        key: &str,
    ) -> BackendResult<Value>;

    async fn set_option(
        &self,
        ctx: &OperationContext,
        alias: &str,
        key: &str,
        value: Value,
    ) -> BackendResult<()>;

    async fn remove_option(
        &self,
        ctx: &OperationContext,
        alias: &str,
        key: &str,
    ) -> BackendResult<()>;

    async fn get_speclet(&self, ctx: &OperationContext, alias: &str) -> BackendResult<Value>;

    async fn set_speclet(
        &self,
        ctx: &OperationContext,
        alias: &str,
        speclet: Map<String, Value>,
    ) -> BackendResult<()>;

    async fn set_options(
        &self,
        ctx: &OperationContext,
        alias: &str,
        options: Map<String, Value>,
    ) -> BackendResult<()>;

    async fn start(
        &self,
        ctx: &OperationContext,
        alias: &str,
        mode: StartMode,
    ) -> BackendResult<()>;

    async fn stop(&self, ctx: &OperationContext, alias: &str) -> BackendResult<()>;

    async fn describe_options(&self, ctx: &OperationContext, alias: &str) -> BackendResult<Value>;
}

/// Everything a factory gets to build a controller for one cluster.
#[derive(Debug, Clone)]
pub struct ControllerContext {
    pub span: tracing::Span,
    pub client: ClusterClient,
    pub root: String,
    pub proxy: String,
    pub stage: String,
    /// Family configuration merged with the cluster's overrides.
    pub config: Value,
}

pub type ControllerCtor = fn(ControllerContext) -> Arc<dyn Controller>;

/// Constructor plus configuration of one family.
#[derive(Clone)]
pub struct ControllerFactory {
    pub ctor: ControllerCtor,
    pub config: Value,
}

impl std::fmt::Debug for ControllerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Controller implementations compiled into this binary.
pub fn builtin_controller(name: &str) -> Option<ControllerCtor> {
    match name {
        "sleep" => Some(sleep::new_controller),
        _ => None,
    }
}

/// Resolves every configured family to its factory.
pub fn factories_from_config(
    config: &ServerConfig,
) -> Result<BTreeMap<String, ControllerFactory>, StartupError> {
    config
        .families
        .iter()
        .map(|(family, family_config)| {
            let ctor = builtin_controller(&family_config.controller).ok_or_else(|| {
                StartupError::UnknownController {
                    family: family.clone(),
                    controller: family_config.controller.clone(),
                }
            })?;
            Ok((
                family.clone(),
                ControllerFactory {
                    ctor,
                    config: family_config.config.clone(),
                },
            ))
        })
        .collect()
}
