// In-memory "sleep" controller family
//
// Operations of this family do nothing but remember their state, which makes
// it the reference family for local deployments and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use strawberry_core::BackendError;
use tracing::{debug, info};

use crate::client::ClusterClient;
use crate::controller::{BackendResult, Controller, ControllerContext, OperationContext, StartMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Inactive,
    Active,
    Untracked,
}

#[derive(Debug, Clone)]
struct Entry {
    owner: String,
    creation_time: DateTime<Utc>,
    speclet: Map<String, Value>,
    speclet_revision: u64,
    state: OperationState,
    incarnation_index: u64,
    started_by: Option<String>,
}

impl Entry {
    fn health(&self) -> &'static str {
        match self.state {
            OperationState::Active | OperationState::Untracked => "good",
            OperationState::Inactive => "idle",
        }
    }

    fn attribute(&self, name: &str, stage: &str, default_pool: Option<&str>) -> Option<Value> {
        match name {
            "owner" => Some(json!(self.owner)),
            "creation_time" => Some(json!(self.creation_time.to_rfc3339())),
            "state" => Some(json!(self.state)),
            "health" => Some(json!(self.health())),
            "speclet_revision" => Some(json!(self.speclet_revision)),
            "stage" => {
                let stage = self.speclet.get("stage").and_then(Value::as_str).unwrap_or(stage);
                Some(json!(stage))
            }
            "pool" => self
                .speclet
                .get("pool")
                .cloned()
                .or_else(|| default_pool.map(|p| json!(p))),
            "started_by" => self.started_by.as_ref().map(|u| json!(u)),
            _ => None,
        }
    }
}

struct OptionInfo {
    name: &'static str,
    kind: &'static str,
    default: fn() -> Value,
    description: &'static str,
}

const OPTIONS: &[OptionInfo] = &[
    OptionInfo {
        name: "active",
        kind: "bool",
        default: || json!(false),
        description: "whether the operation should be kept running by the controller",
    },
    OptionInfo {
        name: "pool",
        kind: "string",
        default: || Value::Null,
        description: "compute pool to run the operation in",
    },
    OptionInfo {
        name: "restart_on_speclet_change",
        kind: "bool",
        default: || json!(true),
        description: "restart the operation when its speclet changes",
    },
    OptionInfo {
        name: "sleep_duration",
        kind: "uint64",
        default: || json!(600),
        description: "how long the sleeping job runs, in seconds",
    },
];

fn check_option_type(key: &str, value: &Value) -> BackendResult<()> {
    let Some(info) = OPTIONS.iter().find(|o| o.name == key) else {
        return Ok(());
    };
    let ok = match info.kind {
        "bool" => value.is_boolean(),
        "string" => value.is_string(),
        "uint64" => value.is_u64(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(BackendError::invalid_argument(format!(
            "option {:?} must be of type {}, got {}",
            key, info.kind, value
        )))
    }
}

pub struct SleepController {
    root: String,
    proxy: String,
    stage: String,
    client: ClusterClient,
    default_pool: Option<String>,
    span: tracing::Span,
    entries: RwLock<BTreeMap<String, Entry>>,
}

pub fn new_controller(ctx: ControllerContext) -> Arc<dyn Controller> {
    Arc::new(SleepController::new(ctx))
}

impl SleepController {
    pub fn new(ctx: ControllerContext) -> Self {
        let default_pool = ctx.config.get("pool").and_then(Value::as_str).map(str::to_string);
        Self {
            root: ctx.root,
            proxy: ctx.proxy,
            stage: ctx.stage,
            client: ctx.client,
            default_pool,
            span: ctx.span,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn not_found(&self, alias: &str) -> BackendError {
        BackendError::not_found(format!(
            "strawberry operation {:?} does not exist at {}/{} on cluster {}",
            alias, self.root, alias, self.proxy
        ))
    }

    fn with_entry<T>(&self, alias: &str, f: impl FnOnce(&Entry) -> T) -> BackendResult<T> {
        let entries = self.entries.read();
        entries.get(alias).map(f).ok_or_else(|| self.not_found(alias))
    }

    fn with_entry_mut<T>(
        &self,
        alias: &str,
        f: impl FnOnce(&mut Entry) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let mut entries = self.entries.write();
        match entries.get_mut(alias) {
            Some(entry) => f(entry),
            None => Err(self.not_found(alias)),
        }
    }

    fn update_speclet(
        &self,
        alias: &str,
        f: impl FnOnce(&mut Map<String, Value>),
    ) -> BackendResult<()> {
        self.with_entry_mut(alias, |entry| {
            f(&mut entry.speclet);
            entry.speclet_revision += 1;
            Ok(())
        })
    }
}

#[async_trait]
impl Controller for SleepController {
    async fn list(
        &self,
        _ctx: &OperationContext,
        attributes: Option<&[String]>,
    ) -> BackendResult<Value> {
        let entries = self.entries.read();
        let items = entries
            .iter()
            .map(|(alias, entry)| match attributes {
                None => json!(alias),
                Some(names) => {
                    let attrs: Map<String, Value> = names
                        .iter()
                        .filter_map(|name| {
                            entry
                                .attribute(name, &self.stage, self.default_pool.as_deref())
                                .map(|v| (name.clone(), v))
                        })
                        .collect();
                    json!({"$value": alias, "$attributes": attrs})
                }
            })
            .collect();
        Ok(Value::Array(items))
    }

    async fn create(&self, ctx: &OperationContext, alias: &str) -> BackendResult<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(alias) {
            return Err(BackendError::already_exists(format!(
                "strawberry operation {:?} already exists on cluster {}",
                alias, self.proxy
            )));
        }
        entries.insert(
            alias.to_string(),
            Entry {
                owner: ctx.user.clone(),
                creation_time: Utc::now(),
                speclet: Map::new(),
                speclet_revision: 1,
                state: OperationState::Inactive,
                incarnation_index: 0,
                started_by: None,
            },
        );
        info!(parent: &self.span, alias, owner = %ctx.user, "operation created");
        Ok(())
    }

    async fn remove(&self, _ctx: &OperationContext, alias: &str) -> BackendResult<()> {
        let removed = self.entries.write().remove(alias);
        match removed {
            Some(_) => {
                info!(parent: &self.span, alias, "operation removed");
                Ok(())
            }
            None => Err(self.not_found(alias)),
        }
    }

    async fn exists(&self, _ctx: &OperationContext, alias: &str) -> BackendResult<bool> {
        Ok(self.entries.read().contains_key(alias))
    }

    async fn status(&self, _ctx: &OperationContext, alias: &str) -> BackendResult<Value> {
        self.with_entry(alias, |entry| {
            json!({
                "state": entry.state,
                "health": entry.health(),
                "speclet_revision": entry.speclet_revision,
                "incarnation_index": entry.incarnation_index,
                "stage": entry.attribute("stage", &self.stage, None),
                "started_by": entry.started_by,
            })
        })
    }

    async fn get_option(
        &self,
        _ctx: &OperationContext,
        alias: &str,
        key: &str,
    ) -> BackendResult<Value> {
        self.with_entry(alias, |entry| entry.speclet.get(key).cloned())?
            .ok_or_else(|| {
                BackendError::not_found(format!(
                    "option {:?} is not set for strawberry operation {:?}",
                    key, alias
                ))
            })
    }

    async fn set_option(
        &self,
        _ctx: &OperationContext,
        alias: &str,
        key: &str,
        value: Value,
    ) -> BackendResult<()> {
        check_option_type(key, &value)?;
        self.update_speclet(alias, |speclet| {
            speclet.insert(key.to_string(), value);
        })
    }

    async fn remove_option(
        &self,
        _ctx: &OperationContext,
        alias: &str,
        key: &str,
    ) -> BackendResult<()> {
        self.update_speclet(alias, |speclet| {
            speclet.remove(key);
        })
    }

    async fn get_speclet(&self, _ctx: &OperationContext, alias: &str) -> BackendResult<Value> {
        self.with_entry(alias, |entry| Value::Object(entry.speclet.clone()))
    }

    async fn set_speclet(
        &self,
        _ctx: &OperationContext,
        alias: &str,
        speclet: Map<String, Value>,
    ) -> BackendResult<()> {
        for (key, value) in &speclet {
            check_option_type(key, value)?;
        }
        self.update_speclet(alias, |current| *current = speclet)
    }

    async fn set_options(
        &self,
        _ctx: &OperationContext,
        alias: &str,
        options: Map<String, Value>,
    ) -> BackendResult<()> {
        for (key, value) in &options {
            check_option_type(key, value)?;
        }
        self.update_speclet(alias, |speclet| speclet.extend(options))
    }

    async fn start(
        &self,
        ctx: &OperationContext,
        alias: &str,
        mode: StartMode,
    ) -> BackendResult<()> {
        let (state, starter) = match &mode {
            StartMode::Tracked => (OperationState::Active, self.client.credential().user.clone()),
            StartMode::Untracked(user_client) => {
                (OperationState::Untracked, user_client.credential().user.clone())
            }
        };
        self.with_entry_mut(alias, |entry| {
            if state == OperationState::Active {
                entry.speclet.insert("active".to_string(), Value::Bool(true));
                entry.speclet_revision += 1;
            }
            entry.state = state;
            entry.incarnation_index += 1;
            entry.started_by = Some(starter.clone());
            Ok(())
        })?;
        info!(
            parent: &self.span,
            alias,
            caller = %ctx.user,
            started_by = %starter,
            untracked = matches!(mode, StartMode::Untracked(_)),
            "operation started"
        );
        Ok(())
    }

    async fn stop(&self, _ctx: &OperationContext, alias: &str) -> BackendResult<()> {
        self.with_entry_mut(alias, |entry| {
            if entry.speclet.get("active") == Some(&Value::Bool(true)) {
                entry.speclet.insert("active".to_string(), Value::Bool(false));
                entry.speclet_revision += 1;
            }
            entry.state = OperationState::Inactive;
            Ok(())
        })?;
        debug!(parent: &self.span, alias, "operation stopped");
        Ok(())
    }

    async fn describe_options(&self, _ctx: &OperationContext, alias: &str) -> BackendResult<Value> {
        self.with_entry(alias, |entry| {
            let options: Vec<Value> = OPTIONS
                .iter()
                .map(|option| {
                    json!({
                        "name": option.name,
                        "type": option.kind,
                        "default_value": (option.default)(),
                        "current_value": entry.speclet.get(option.name),
                        "description": option.description,
                    })
                })
                .collect();
            json!([{"title": "Sleep options", "options": options}])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, Credential};

    fn controller() -> SleepController {
        let client = ClusterClient::new(ClientConfig::new(
            "hahn",
            Credential::new("robot-strawberry", "service-token"),
        ))
        .unwrap();
        SleepController::new(ControllerContext {
            span: tracing::Span::none(),
            client,
            root: "//sys/strawberry/sleep".to_string(),
            proxy: "hahn".to_string(),
            stage: "testing".to_string(),
            config: json!({"pool": "default-pool"}),
        })
    }

    fn ctx() -> OperationContext {
        OperationContext {
            user: "alice".to_string(),
            request_id: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_exists_remove() {
        let c = controller();
        assert!(!c.exists(&ctx(), "foo").await.unwrap());
        c.create(&ctx(), "foo").await.unwrap();
        assert!(c.exists(&ctx(), "foo").await.unwrap());

        let err = c.create(&ctx(), "foo").await.unwrap_err();
        assert_eq!(err.kind, strawberry_core::BackendErrorKind::AlreadyExists);

        c.remove(&ctx(), "foo").await.unwrap();
        assert!(!c.exists(&ctx(), "foo").await.unwrap());
        assert!(c.remove(&ctx(), "foo").await.is_err());
    }

    #[tokio::test]
    async fn test_options_and_speclet() {
        let c = controller();
        c.create(&ctx(), "foo").await.unwrap();
        c.set_option(&ctx(), "foo", "pool", json!("research")).await.unwrap();
        assert_eq!(c.get_option(&ctx(), "foo", "pool").await.unwrap(), json!("research"));

        let err = c.set_option(&ctx(), "foo", "active", json!("yes")).await.unwrap_err();
        assert_eq!(err.kind, strawberry_core::BackendErrorKind::InvalidArgument);

        let mut options = Map::new();
        options.insert("sleep_duration".to_string(), json!(5));
        c.set_options(&ctx(), "foo", options).await.unwrap();
        assert_eq!(
            c.get_speclet(&ctx(), "foo").await.unwrap(),
            json!({"pool": "research", "sleep_duration": 5})
        );

        c.remove_option(&ctx(), "foo", "pool").await.unwrap();
        assert!(c.get_option(&ctx(), "foo", "pool").await.is_err());

        let mut speclet = Map::new();
        speclet.insert("restart_on_speclet_change".to_string(), json!(false));
        c.set_speclet(&ctx(), "foo", speclet).await.unwrap();
        assert_eq!(
            c.get_speclet(&ctx(), "foo").await.unwrap(),
            json!({"restart_on_speclet_change": false})
        );
    }

    #[tokio::test]
    async fn test_start_attribution() {
        let c = controller();
        c.create(&ctx(), "foo").await.unwrap();

        c.start(&ctx(), "foo", StartMode::Tracked).await.unwrap();
        let status = c.status(&ctx(), "foo").await.unwrap();
        assert_eq!(status["state"], "active");
        assert_eq!(status["started_by"], "robot-strawberry");
        assert_eq!(c.get_option(&ctx(), "foo", "active").await.unwrap(), json!(true));

        let user_client = ClusterClient::new(ClientConfig::new(
            "hahn",
            Credential::new("alice", "alice-token"),
        ))
        .unwrap();
        c.start(&ctx(), "foo", StartMode::Untracked(user_client)).await.unwrap();
        let status = c.status(&ctx(), "foo").await.unwrap();
        assert_eq!(status["state"], "untracked");
        assert_eq!(status["started_by"], "alice");
        assert_eq!(status["incarnation_index"], 2);

        c.stop(&ctx(), "foo").await.unwrap();
        let status = c.status(&ctx(), "foo").await.unwrap();
        assert_eq!(status["state"], "inactive");
        assert_eq!(c.get_option(&ctx(), "foo", "active").await.unwrap(), json!(false));
    }

    #[tokio::test]
    async fn test_list_with_attributes() {
        let c = controller();
        c.create(&ctx(), "foo").await.unwrap();
        c.create(&ctx(), "bar").await.unwrap();

        assert_eq!(c.list(&ctx(), None).await.unwrap(), json!(["bar", "foo"]));

        let attrs = vec!["owner".to_string(), "pool".to_string(), "nonsense".to_string()];
        let listed = c.list(&ctx(), Some(&attrs)).await.unwrap();
        assert_eq!(
            listed,
            json!([
                {"$value": "bar", "$attributes": {"owner": "alice", "pool": "default-pool"}},
                {"$value": "foo", "$attributes": {"owner": "alice", "pool": "default-pool"}},
            ])
        );
    }

    #[tokio::test]
    async fn test_missing_alias_is_not_found() {
        let c = controller();
        let err = c.get_option(&ctx(), "missing", "x").await.unwrap_err();
        assert_eq!(err.kind, strawberry_core::BackendErrorKind::NotFound);
        assert!(c.status(&ctx(), "missing").await.is_err());
        assert!(c.describe_options(&ctx(), "missing").await.is_err());
    }

    #[tokio::test]
    async fn test_describe_options() {
        let c = controller();
        c.create(&ctx(), "foo").await.unwrap();
        c.set_option(&ctx(), "foo", "pool", json!("research")).await.unwrap();
        let described = c.describe_options(&ctx(), "foo").await.unwrap();
        let options = described[0]["options"].as_array().unwrap();
        let pool = options.iter().find(|o| o["name"] == "pool").unwrap();
        assert_eq!(pool["current_value"], "research");
    }
}
