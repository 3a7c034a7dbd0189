// Configuration system for the strawberry control plane

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::cluster::ClusterInfo;
use crate::error::ConfigError;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Where parameters missing from a request body may be taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalSource {
    #[default]
    None,
    Env,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamsConfig {
    #[serde(default)]
    pub external_source: ExternalSource,
}

/// One controller family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyConfig {
    /// Name of the controller implementation backing this family.
    pub controller: String,
    /// Opaque configuration handed to the controller factory.
    #[serde(default)]
    pub config: Value,
}

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub endpoint: String,
    /// Service credential used for every per-cluster backend client.
    pub token: String,
    /// User the service credential belongs to.
    pub service_user: String,
    /// Skips the authentication gate. Tests only.
    pub disable_auth: bool,
    pub jwt_secret: Option<String>,
    pub request_timeout_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub params: ParamsConfig,
    pub families: BTreeMap<String, FamilyConfig>,
    /// Request host (exact, `*.suffix` or `*`) to family name.
    pub controller_mappings: BTreeMap<String, String>,
    pub clusters: Vec<ClusterInfo>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: "0.0.0.0:8080".to_string(),
            token: String::new(),
            service_user: "robot-strawberry".to_string(),
            disable_auth: false,
            jwt_secret: None,
            request_timeout_secs: 60,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            params: ParamsConfig::default(),
            families: BTreeMap::new(),
            controller_mappings: BTreeMap::new(),
            clusters: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path, e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from string (JSON, TOML or YAML)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        // Try JSON first
        if let Ok(config) = serde_json::from_str::<ServerConfig>(content) {
            return Ok(config);
        }

        // Try TOML
        if let Ok(config) = toml::from_str::<ServerConfig>(content) {
            return Ok(config);
        }

        // Try YAML
        match serde_yaml::from_str::<ServerConfig>(content) {
            Ok(config) => Ok(config),
            Err(e) => Err(ConfigError::ParseError(format!(
                "not valid JSON, TOML or YAML: {}",
                e
            ))),
        }
    }

    /// Overlay environment variables on top of the loaded configuration
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("STRAWBERRY_ENDPOINT") {
            self.endpoint = endpoint;
        }

        if let Ok(token) = std::env::var("STRAWBERRY_TOKEN") {
            self.token = token;
        }

        if let Ok(secret) = std::env::var("STRAWBERRY_JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }

        if let Ok(flag) = std::env::var("STRAWBERRY_DISABLE_AUTH") {
            self.disable_auth = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Host mappings, or `*` pointing at the only family when none are set.
    pub fn controller_mappings_or_default(&self) -> BTreeMap<String, String> {
        if !self.controller_mappings.is_empty() {
            return self.controller_mappings.clone();
        }
        let mut mappings = BTreeMap::new();
        if self.families.len() == 1 {
            if let Some(family) = self.families.keys().next() {
                mappings.insert("*".to_string(), family.clone());
            }
        }
        mappings
    }

    /// Clusters declared for `family`, in declaration order.
    pub fn clusters_of<'a>(
        &'a self,
        family: &'a str,
    ) -> impl Iterator<Item = &'a ClusterInfo> + 'a {
        self.clusters.iter().filter(move |c| c.family == family)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "endpoint must not be empty".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be > 0".to_string(),
            ));
        }

        if !self.disable_auth && self.jwt_secret.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::ValidationError(
                "jwt_secret is required unless disable_auth is set".to_string(),
            ));
        }

        if self.families.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one family must be configured".to_string(),
            ));
        }

        for (i, cluster) in self.clusters.iter().enumerate() {
            if !self.families.contains_key(&cluster.family) {
                return Err(ConfigError::ValidationError(format!(
                    "cluster #{} ({}) refers to unknown family {:?}",
                    i, cluster.proxy, cluster.family
                )));
            }
            if cluster.proxy.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "cluster #{} has an empty proxy",
                    i
                )));
            }
            if self.clusters[..i]
                .iter()
                .any(|c| c.family == cluster.family && c.proxy == cluster.proxy)
            {
                return Err(ConfigError::ValidationError(format!(
                    "cluster {:?} is declared twice for family {:?}",
                    cluster.proxy, cluster.family
                )));
            }
        }

        for (host, family) in &self.controller_mappings {
            if !self.families.contains_key(family) {
                return Err(ConfigError::ValidationError(format!(
                    "host {:?} is mapped to unknown family {:?}",
                    host, family
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_CONFIG: &str = r#"
endpoint = "127.0.0.1:9000"
jwt_secret = "secret"

[families.sleep]
controller = "sleep"
config = { sleep_duration = 5 }

[controller_mappings]
"sleep.example.com" = "sleep"

[[clusters]]
family = "sleep"
proxy = "hahn"
root = "//sys/strawberry/sleep"
"#;

    #[test]
    fn test_from_str_toml() {
        let config = ServerConfig::from_str(TOML_CONFIG).unwrap();
        assert_eq!(config.endpoint, "127.0.0.1:9000");
        assert_eq!(config.families["sleep"].controller, "sleep");
        assert_eq!(config.families["sleep"].config["sleep_duration"], 5);
        assert_eq!(config.clusters.len(), 1);
        assert_eq!(config.clusters[0].stage, "production");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_str_json_and_yaml() {
        let json = r#"{"disable_auth": true, "families": {"sleep": {"controller": "sleep"}}}"#;
        let config = ServerConfig::from_str(json).unwrap();
        assert!(config.disable_auth);
        assert!(config.validate().is_ok());

        let yaml = "disable_auth: true\nfamilies:\n  sleep:\n    controller: sleep\n";
        let config = ServerConfig::from_str(yaml).unwrap();
        assert!(config.families.contains_key("sleep"));
    }

    #[test]
    fn test_default_mapping_for_single_family() {
        let config = ServerConfig::from_str(
            r#"{"disable_auth": true, "families": {"sleep": {"controller": "sleep"}}}"#,
        )
        .unwrap();
        let mappings = config.controller_mappings_or_default();
        assert_eq!(mappings.get("*").map(String::as_str), Some("sleep"));
    }

    #[test]
    fn test_no_default_mapping_for_many_families() {
        let mut config = ServerConfig::default();
        for name in ["chyt", "jupyt"] {
            config.families.insert(
                name.to_string(),
                FamilyConfig {
                    controller: "sleep".to_string(),
                    config: Value::Null,
                },
            );
        }
        assert!(config.controller_mappings_or_default().is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_clusters() {
        let mut config = ServerConfig::from_str(TOML_CONFIG).unwrap();
        config
            .clusters
            .push(ClusterInfo::new("sleep", "hahn", "//other"));
        assert!(config.validate().is_err());

        let mut config = ServerConfig::from_str(TOML_CONFIG).unwrap();
        config.clusters.push(ClusterInfo::new("chyt", "arnold", "//x"));
        assert!(config.validate().is_err());

        let mut config = ServerConfig::from_str(TOML_CONFIG).unwrap();
        config
            .controller_mappings
            .insert("*".to_string(), "missing".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_secret_when_auth_enabled() {
        let mut config = ServerConfig::from_str(TOML_CONFIG).unwrap();
        config.jwt_secret = None;
        assert!(config.validate().is_err());
        config.disable_auth = true;
        assert!(config.validate().is_ok());
    }
}
