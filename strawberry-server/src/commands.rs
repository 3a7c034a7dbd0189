// Command registry: every command the control plane serves, with its
// parameter schema and handler

use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::Arc;
use strawberry_core::{
    BackendError, CommandDescription, ParamMap, ParamType, ParameterSchema, Transformer, Validator,
};

use crate::client::{ClientConfig, ClusterClient, Credential};
use crate::controller::StartMode;
use crate::dispatch::{ClusterApi, RequestContext};
use crate::error::{ApiResult, AuthError};

/// Handler bound to a command. Receives the cluster it was routed to and
/// the already validated parameters.
pub type Handler =
    fn(Arc<ClusterApi>, RequestContext, ParamMap) -> BoxFuture<'static, ApiResult<Value>>;

pub struct CommandDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ParameterSchema],
    pub handler: Handler,
}

impl CommandDescriptor {
    pub fn describe(&self) -> CommandDescription {
        CommandDescription {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: self.parameters.iter().map(ParameterSchema::describe).collect(),
        }
    }
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("parameters", &self.parameters.len())
            .finish_non_exhaustive()
    }
}

pub const ALIAS: ParameterSchema = ParameterSchema::new("alias", ParamType::String)
    .aliases(&["a"])
    .required()
    .env_var("ALIAS")
    .validator(Validator::AliasFormat)
    .description("alias for the operation");

pub const ATTRIBUTES: ParameterSchema = ParameterSchema::new("attributes", ParamType::Any)
    .elements("attribute", ParamType::String, "attribute to fetch for every operation")
    .transformer(Transformer::AttributeFilter)
    .description("attributes to fetch alongside the aliases");

pub const KEY: ParameterSchema = ParameterSchema::new("key", ParamType::String)
    .required()
    .validator(Validator::OptionKey)
    .description("name of the option");

pub const VALUE: ParameterSchema = ParameterSchema::new("value", ParamType::Any)
    .required()
    .description("new option value");

pub const SPECLET: ParameterSchema = ParameterSchema::new("speclet", ParamType::Any)
    .required()
    .validator(Validator::SpecletOptions)
    .description("full speclet of the operation");

pub const OPTIONS: ParameterSchema = ParameterSchema::new("options", ParamType::Any)
    .required()
    .validator(Validator::SpecletOptions)
    .description("options to set");

pub const UNTRACKED: ParameterSchema = ParameterSchema::flag("untracked")
    .description("start the operation with the caller's credential, without tracking it");

static COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor {
        name: "list",
        description: "list all operations on the cluster",
        parameters: &[ATTRIBUTES],
        handler: list,
    },
    CommandDescriptor {
        name: "create",
        description: "create a new operation",
        parameters: &[ALIAS.as_explicit()],
        handler: create,
    },
    CommandDescriptor {
        name: "remove",
        description: "remove the operation",
        parameters: &[ALIAS.as_explicit()],
        handler: remove,
    },
    CommandDescriptor {
        name: "exists",
        description: "check whether the operation exists",
        parameters: &[ALIAS.as_explicit()],
        handler: exists,
    },
    CommandDescriptor {
        name: "status",
        description: "show the operation status",
        parameters: &[ALIAS.as_explicit()],
        handler: status,
    },
    CommandDescriptor {
        name: "get_option",
        description: "get the option value",
        parameters: &[ALIAS, KEY],
        handler: get_option,
    },
    CommandDescriptor {
        name: "set_option",
        description: "set the option value",
        parameters: &[ALIAS, KEY, VALUE],
        handler: set_option,
    },
    CommandDescriptor {
        name: "remove_option",
        description: "remove the option",
        parameters: &[ALIAS, KEY],
        handler: remove_option,
    },
    CommandDescriptor {
        name: "get_speclet",
        description: "get the full speclet of the operation",
        parameters: &[ALIAS],
        handler: get_speclet,
    },
    CommandDescriptor {
        name: "set_speclet",
        description: "replace the speclet of the operation",
        parameters: &[ALIAS, SPECLET],
        handler: set_speclet,
    },
    CommandDescriptor {
        name: "set_options",
        description: "set several options at once",
        parameters: &[ALIAS, OPTIONS],
        handler: set_options,
    },
    CommandDescriptor {
        name: "start",
        description: "start the operation",
        parameters: &[ALIAS.as_explicit(), UNTRACKED],
        handler: start,
    },
    CommandDescriptor {
        name: "stop",
        description: "stop the operation",
        parameters: &[ALIAS.as_explicit()],
        handler: stop,
    },
    CommandDescriptor {
        name: "describe_options",
        description: "describe the options the operation accepts",
        parameters: &[ALIAS.as_explicit()],
        handler: describe_options,
    },
];

/// All commands, in registration order.
pub fn registry() -> &'static [CommandDescriptor] {
    COMMANDS
}

pub fn find(name: &str) -> Option<&'static CommandDescriptor> {
    COMMANDS.iter().find(|command| command.name == name)
}

pub fn describe_all() -> Vec<CommandDescription> {
    COMMANDS.iter().map(CommandDescriptor::describe).collect()
}

fn list(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let attributes = params.string_list("attributes")?;
        Ok(api.controller.list(&ctx.operation(), attributes.as_deref()).await?)
    })
}

fn create(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        api.controller.create(&ctx.operation(), alias).await?;
        Ok(Value::Null)
    })
}

fn remove(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        api.controller.remove(&ctx.operation(), alias).await?;
        Ok(Value::Null)
    })
}

fn exists(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        let exists = api.controller.exists(&ctx.operation(), alias).await?;
        Ok(json!(exists))
    })
}

fn status(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        Ok(api.controller.status(&ctx.operation(), alias).await?)
    })
}

fn get_option(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        let key = params.string("key")?;
        Ok(api.controller.get_option(&ctx.operation(), alias, key).await?)
    })
}

fn set_option(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        let key = params.string("key")?;
        let value = params.structured("value")?;
        api.controller
            .set_option(&ctx.operation(), alias, key, value)
            .await?;
        Ok(Value::Null)
    })
}

fn remove_option(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        let key = params.string("key")?;
        api.controller.remove_option(&ctx.operation(), alias, key).await?;
        Ok(Value::Null)
    })
}

fn get_speclet(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        Ok(api.controller.get_speclet(&ctx.operation(), alias).await?)
    })
}

fn set_speclet(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        let speclet = params.object("speclet")?;
        api.controller.set_speclet(&ctx.operation(), alias, speclet).await?;
        Ok(Value::Null)
    })
}

fn set_options(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        let options = params.object("options")?;
        api.controller.set_options(&ctx.operation(), alias, options).await?;
        Ok(Value::Null)
    })
}

fn start(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        let op = ctx.operation();

        // The user client lives only as long as this request.
        let mode = if params.flag("untracked")? {
            let identity = ctx.identity.as_ref().ok_or_else(|| {
                AuthError::MissingCredential(
                    "untracked start requires the caller's credential".to_string(),
                )
            })?;
            let credential = Credential::new(identity.user.clone(), identity.token.clone());
            let config = ClientConfig::new(api.cluster.proxy.clone(), credential);
            let client = ClusterClient::new(config).map_err(|e| {
                BackendError::internal(format!("failed to create user client: {}", e))
            })?;
            StartMode::Untracked(client)
        } else {
            StartMode::Tracked
        };

        api.controller.start(&op, alias, mode).await?;
        Ok(api.controller.status(&op, alias).await?)
    })
}

fn stop(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        api.controller.stop(&ctx.operation(), alias).await?;
        Ok(Value::Null)
    })
}

fn describe_options(
    api: Arc<ClusterApi>,
    ctx: RequestContext,
    params: ParamMap,
) -> BoxFuture<'static, ApiResult<Value>> {
    Box::pin(async move {
        let alias = params.string("alias")?;
        Ok(api.controller.describe_options(&ctx.operation(), alias).await?)
    })
}
