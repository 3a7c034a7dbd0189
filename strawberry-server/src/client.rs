// Backend network client bound to one cluster

use reqwest::header::HeaderValue;
use reqwest::Url;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("cluster address is empty")]
    EmptyProxy,

    #[error("cluster address {proxy:?} is not a valid URL: {reason}")]
    InvalidAddress { proxy: String, reason: String },

    #[error("credential cannot be sent as a header: {0}")]
    InvalidCredential(String),
}

/// Token plus the user it authenticates as.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub token: String,
}

impl Credential {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub proxy: String,
    pub credential: Credential,
}

impl ClientConfig {
    pub fn new(proxy: impl Into<String>, credential: Credential) -> Self {
        Self {
            proxy: proxy.into(),
            credential,
        }
    }
}

/// Validated binding of a cluster address and the credential used there.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    proxy: String,
    base_url: Url,
    credential: Credential,
}

impl ClusterClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let proxy = config.proxy.trim();
        if proxy.is_empty() {
            return Err(ClientError::EmptyProxy);
        }

        let address = if proxy.contains("://") {
            proxy.to_string()
        } else {
            format!("http://{}", proxy)
        };
        let base_url = Url::parse(&address).map_err(|e| ClientError::InvalidAddress {
            proxy: proxy.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.host_str().map_or(true, str::is_empty) {
            return Err(ClientError::InvalidAddress {
                proxy: proxy.to_string(),
                reason: "no host".to_string(),
            });
        }

        // The token travels as an `Authorization: OAuth <token>` header.
        if !config.credential.token.is_empty() {
            HeaderValue::from_str(&format!("OAuth {}", config.credential.token))
                .map_err(|e| ClientError::InvalidCredential(e.to_string()))?;
        }

        Ok(Self {
            proxy: proxy.to_string(),
            base_url,
            credential: config.credential,
        })
    }

    /// Cluster address this client is bound to.
    pub fn proxy(&self) -> &str {
        &self.proxy
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential::new("robot-strawberry", "service-token")
    }

    #[test]
    fn test_bare_proxy_gets_http_scheme() {
        let client = ClusterClient::new(ClientConfig::new("hahn", credential())).unwrap();
        assert_eq!(client.proxy(), "hahn");
        assert_eq!(client.base_url().as_str(), "http://hahn/");
        assert_eq!(client.credential().user, "robot-strawberry");
    }

    #[test]
    fn test_explicit_scheme_and_port() {
        let client =
            ClusterClient::new(ClientConfig::new("https://localhost:8000", credential())).unwrap();
        assert_eq!(client.base_url().port(), Some(8000));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(matches!(
            ClusterClient::new(ClientConfig::new("  ", credential())),
            Err(ClientError::EmptyProxy)
        ));
        assert!(matches!(
            ClusterClient::new(ClientConfig::new("bad proxy", credential())),
            Err(ClientError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_invalid_credential() {
        let cred = Credential::new("robot", "line\nbreak");
        assert!(matches!(
            ClusterClient::new(ClientConfig::new("hahn", cred)),
            Err(ClientError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let printed = format!("{:?}", credential());
        assert!(!printed.contains("service-token"));
    }
}
