// Authentication gate in front of every per-cluster command route

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dispatch::ANONYMOUS_USER;
use crate::error::{ApiError, AuthError};

/// Longest bearer token accepted.
const MAX_TOKEN_LENGTH: usize = 4096;

/// JWT claims for authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user name)
    pub exp: usize,  // Expiration time
    pub iat: usize,  // Issued at
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Issues and verifies HS256 tokens signed with the configured secret.
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: usize,
}

impl TokenManager {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: 3600,
        }
    }

    /// Generate a signed token for `user`
    pub fn generate_token(&self, user: &str, roles: Vec<String>) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp().max(0) as usize;
        let claims = Claims {
            sub: user.to_string(),
            exp: now + self.ttl_secs,
            iat: now,
            roles,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidCredential(format!("cannot sign token: {}", e)))
    }

    /// Verify and decode a token
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidCredential(e.to_string()))
    }
}

/// Authenticated caller. The raw token is kept so that commands can act
/// with the caller's own credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub token: String,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Turns request headers into a caller identity.
pub trait Authenticator: Send + Sync {
    fn authorize(&self, headers: &HeaderMap) -> Result<Identity, AuthError>;
}

impl Authenticator for TokenManager {
    fn authorize(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = bearer_token(headers)?;
        let claims = self.verify_token(token)?;
        if claims.sub.is_empty() {
            return Err(AuthError::InvalidCredential("token has no subject".to_string()));
        }
        Ok(Identity {
            user: claims.sub,
            token: token.to_string(),
        })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AuthError::MissingCredential("no Authorization header".to_string()))?
        .to_str()
        .map_err(|_| {
            AuthError::InvalidCredential("Authorization header is not ASCII".to_string())
        })?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AuthError::InvalidCredential("malformed Authorization header".to_string()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidCredential(format!(
            "unsupported authorization scheme {:?}",
            scheme
        )));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredential("empty bearer token".to_string()));
    }
    if token.len() > MAX_TOKEN_LENGTH {
        return Err(AuthError::InvalidCredential(format!(
            "token too long: {} bytes",
            token.len()
        )));
    }
    Ok(token)
}

/// Middleware state of one cluster's auth gate.
#[derive(Clone)]
pub struct AuthGate {
    pub authenticator: Arc<dyn Authenticator>,
    pub disabled: bool,
    pub cluster: String,
}

/// Rejects unauthenticated requests with 401 before any command handler
/// runs. On success the caller's [`Identity`] is attached to the request.
///
/// A disabled gate lets everything through but still attaches whatever
/// bearer token the caller sent; a token it cannot verify is carried as is
/// under the anonymous user.
pub async fn auth_middleware(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if gate.disabled {
        let identity = passthrough_identity(gate.authenticator.as_ref(), request.headers());
        if let Some(identity) = identity {
            debug!(
                cluster = %gate.cluster,
                user = %identity.user,
                "credential attached, gate disabled"
            );
            request.extensions_mut().insert(identity);
        }
        return Ok(next.run(request).await);
    }

    match gate.authenticator.authorize(request.headers()) {
        Ok(identity) => {
            debug!(cluster = %gate.cluster, user = %identity.user, "request authenticated");
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(err) => {
            warn!(cluster = %gate.cluster, uri = %request.uri(), "authentication failed: {}", err);
            Err(err.into())
        }
    }
}

fn passthrough_identity(
    authenticator: &dyn Authenticator,
    headers: &HeaderMap,
) -> Option<Identity> {
    let token = bearer_token(headers).ok()?;
    Some(authenticator.authorize(headers).unwrap_or_else(|_| Identity {
        user: ANONYMOUS_USER.to_string(),
        token: token.to_string(),
    }))
}
