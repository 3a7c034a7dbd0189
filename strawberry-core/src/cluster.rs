// Cluster declarations

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One backend cluster served by a family. Declared in the startup
/// configuration and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub family: String,
    /// Network address of the cluster; also the path prefix it is mounted at.
    pub proxy: String,
    #[serde(default = "default_stage")]
    pub stage: String,
    /// Root path under which the family keeps its entities on this cluster.
    pub root: String,
    /// Per-cluster overrides merged over the family configuration.
    #[serde(default)]
    pub config: Value,
}

fn default_stage() -> String {
    "production".to_string()
}

impl ClusterInfo {
    pub fn new(
        family: impl Into<String>,
        proxy: impl Into<String>,
        root: impl Into<String>,
    ) -> Self {
        Self {
            family: family.into(),
            proxy: proxy.into(),
            stage: default_stage(),
            root: root.into(),
            config: Value::Null,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Family configuration with this cluster's overrides applied on top.
    /// Only top-level keys are merged.
    pub fn merged_config(&self, family_config: &Value) -> Value {
        match (family_config, &self.config) {
            (Value::Object(base), Value::Object(overrides)) => {
                let mut merged = base.clone();
                for (k, v) in overrides {
                    merged.insert(k.clone(), v.clone());
                }
                Value::Object(merged)
            }
            (base, Value::Null) => base.clone(),
            (_, overrides) => overrides.clone(),
        }
    }
}
