// Per-cluster router: backend client, controller and gated command routes

use axum::{extract::Extension, middleware, routing::post, Router};
use bytes::Bytes;
use std::sync::Arc;
use strawberry_core::{ClusterInfo, ValueSource};
use tracing::info;

use crate::client::{ClientConfig, ClusterClient, Credential};
use crate::commands;
use crate::controller::{ControllerContext, ControllerFactory};
use crate::dispatch::{dispatch, ClusterApi};
use crate::error::StartupError;
use crate::http::method_not_allowed;
use crate::security::{auth_middleware, AuthGate, Authenticator, Identity};

/// Settings shared by every cluster router of the process.
#[derive(Clone)]
pub struct RouterSettings {
    /// Service credential every backend client is built with.
    pub credential: Credential,
    pub authenticator: Arc<dyn Authenticator>,
    pub disable_auth: bool,
    pub external: Arc<dyn ValueSource>,
}

/// Command routes of one (family, cluster) pair.
pub struct ClusterRouter {
    pub info: ClusterInfo,
    pub api: Arc<ClusterApi>,
    pub router: Router,
}

impl ClusterRouter {
    /// Builds the client, the controller and the routes. A client that
    /// cannot be built is fatal for the whole process.
    pub fn build(
        info: &ClusterInfo,
        factory: &ControllerFactory,
        settings: &RouterSettings,
    ) -> Result<Self, StartupError> {
        let config = ClientConfig::new(info.proxy.clone(), settings.credential.clone());
        let client = ClusterClient::new(config).map_err(|source| StartupError::ClientConstruction {
            family: info.family.clone(),
            proxy: info.proxy.clone(),
            source,
        })?;

        let span = tracing::info_span!("controller", family = %info.family, cluster = %info.proxy);
        let controller = (factory.ctor)(ControllerContext {
            span,
            client,
            root: info.root.clone(),
            proxy: info.proxy.clone(),
            stage: info.stage.clone(),
            config: info.merged_config(&factory.config),
        });

        let api = Arc::new(ClusterApi {
            cluster: info.clone(),
            controller,
            external: settings.external.clone(),
        });

        let mut router = Router::new();
        for command in commands::registry() {
            let api = api.clone();
            router = router.route(
                &format!("/{}", command.name),
                post(move |identity: Option<Extension<Identity>>, body: Bytes| {
                    let api = api.clone();
                    let identity = identity.map(|Extension(id)| id);
                    async move { dispatch(api, command, identity, body).await }
                }),
            );
        }

        let gate = AuthGate {
            authenticator: settings.authenticator.clone(),
            disabled: settings.disable_auth,
            cluster: info.proxy.clone(),
        };
        let router = router
            .method_not_allowed_fallback(method_not_allowed)
            .layer(middleware::from_fn_with_state(gate, auth_middleware));

        info!(
            family = %info.family,
            cluster = %info.proxy,
            commands = commands::registry().len(),
            "cluster router ready"
        );

        Ok(Self {
            info: info.clone(),
            api,
            router,
        })
    }
}
