pub mod client;
pub mod cluster;
pub mod commands;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod security;
pub mod sleep;

pub use client::{ClientConfig, ClientError, ClusterClient, Credential};
pub use cluster::{ClusterRouter, RouterSettings};
pub use commands::{CommandDescriptor, Handler};
pub use controller::{
    builtin_controller, factories_from_config, BackendResult, Controller, ControllerContext,
    ControllerFactory, OperationContext, StartMode,
};
pub use dispatch::{dispatch, ClusterApi, RequestContext};
pub use error::{ApiError, ApiResult, AuthError, Envelope, StartupError};
pub use http::{build_app, family_router, HostTable};
pub use security::{auth_middleware, AuthGate, Authenticator, Identity, TokenManager};
