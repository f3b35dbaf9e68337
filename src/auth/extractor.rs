//! Authentication boundary for HTTP requests.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::error::AuthError;
use crate::auth::jwks::{
    DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT, JwksKeySource,
    KeyResolveError, KeyResolver,
};
use crate::auth::principal::Principal;
use crate::auth::verifier::{
    AuthMode, DEFAULT_TOKEN_USES, PermissiveVerifier, StrictVerifier, Verifier, unverified_claims,
};
use crate::directory::Directory;

/// Authentication configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Verification posture
    #[serde(default)]
    pub mode: AuthMode,
    /// AWS region of the user pool
    #[serde(default = "default_region")]
    pub region: String,
    /// Cognito user pool id, e.g. `us-east-1_AbCdEf`
    #[serde(default)]
    pub user_pool_id: String,
    /// App client id; the expected `aud`
    #[serde(default)]
    pub client_id: String,
    /// JWKS endpoint override (defaults to the pool's well-known URL)
    #[serde(default)]
    pub jwks_url: Option<String>,
    /// JWKS cache TTL in milliseconds (default: 600000)
    #[serde(default = "default_jwks_cache_ttl_ms")]
    pub jwks_cache_ttl_ms: u64,
    /// Maximum number of cached signing keys (default: 5)
    #[serde(default = "default_jwks_cache_max_entries")]
    pub jwks_cache_max_entries: usize,
    /// Timeout for JWKS fetches in seconds (default: 5)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Clock skew tolerated on `exp`/`nbf` in seconds (default: 0)
    #[serde(default)]
    pub leeway_secs: u64,
    /// Accepted `token_use` values
    #[serde(default = "default_token_uses")]
    pub allowed_token_uses: Vec<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_jwks_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL.as_millis() as u64
}

fn default_jwks_cache_max_entries() -> usize {
    DEFAULT_CACHE_MAX_ENTRIES
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

fn default_token_uses() -> Vec<String> {
    DEFAULT_TOKEN_USES.iter().map(|s| s.to_string()).collect()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Strict,
            region: default_region(),
            user_pool_id: String::new(),
            client_id: String::new(),
            jwks_url: None,
            jwks_cache_ttl_ms: default_jwks_cache_ttl_ms(),
            jwks_cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            leeway_secs: 0,
            allowed_token_uses: default_token_uses(),
        }
    }
}

impl AuthConfig {
    /// Strict verification against a Cognito user pool.
    pub fn cognito(region: String, user_pool_id: String, client_id: String) -> Self {
        Self {
            region,
            user_pool_id,
            client_id,
            ..Default::default()
        }
    }

    /// Permissive verification against a Cognito user pool.
    pub fn permissive(region: String, user_pool_id: String, client_id: String) -> Self {
        Self {
            mode: AuthMode::Permissive,
            ..Self::cognito(region, user_pool_id, client_id)
        }
    }

    /// Expected `iss` claim.
    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    /// JWKS endpoint: the override, else the pool's well-known document.
    pub fn jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("{}/.well-known/jwks.json", self.issuer()))
    }

    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.jwks_cache_ttl_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Check that the settings the configured mode needs are present.
    pub fn validate(&self) -> Result<(), AuthConfigError> {
        if self.region.is_empty() {
            return Err(AuthConfigError::Missing("region"));
        }
        if self.user_pool_id.is_empty() {
            return Err(AuthConfigError::Missing("user_pool_id"));
        }
        if self.mode == AuthMode::Strict && self.client_id.is_empty() {
            return Err(AuthConfigError::Missing("client_id"));
        }
        Ok(())
    }
}

/// Invalid authentication configuration.
#[derive(Debug, Error)]
pub enum AuthConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error(transparent)]
    Jwks(#[from] KeyResolveError),
}

/// Turns an `Authorization` header into a [`Principal`].
///
/// The verifier is chosen once; a request never falls back from one mode to
/// the other.
#[derive(Clone)]
pub struct Authenticator {
    verifier: Arc<dyn Verifier>,
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn Verifier>) -> Self {
        Self { verifier }
    }

    /// Build the verifier `config` selects.
    pub fn from_config(
        config: &AuthConfig,
        directory: Arc<dyn Directory>,
    ) -> Result<Self, AuthConfigError> {
        config.validate()?;

        let verifier: Arc<dyn Verifier> = match config.mode {
            AuthMode::Strict => {
                let source = JwksKeySource::new(config.jwks_url(), config.fetch_timeout())?;
                let resolver = KeyResolver::new(Arc::new(source))
                    .with_ttl(config.jwks_cache_ttl())
                    .with_max_entries(config.jwks_cache_max_entries);
                Arc::new(
                    StrictVerifier::new(Arc::new(resolver), config.issuer(), &config.client_id)
                        .with_leeway(config.leeway_secs)
                        .with_allowed_token_uses(config.allowed_token_uses.clone()),
                )
            }
            AuthMode::Permissive => {
                warn!(
                    user_pool_id = %config.user_pool_id,
                    "Permissive authentication enabled: token signatures are NOT verified"
                );
                Arc::new(
                    PermissiveVerifier::new(directory, config.issuer())
                        .with_leeway(config.leeway_secs),
                )
            }
        };

        Ok(Self::new(verifier))
    }

    pub fn mode(&self) -> AuthMode {
        self.verifier.mode()
    }

    /// Authenticate the raw `Authorization` header value.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let Some(header) = authorization else {
            debug!("Request without authorization header");
            return Err(AuthError::MissingCredentials);
        };

        let token = match bearer_token(header) {
            Ok(token) => token,
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "Authentication failed");
                return Err(err);
            }
        };

        let result = self
            .verifier
            .verify(token)
            .await
            .and_then(Principal::from_claims);

        match result {
            Ok(principal) => {
                debug!(
                    subject = %principal.subject(),
                    mode = %self.mode(),
                    "Authenticated request"
                );
                Ok(principal)
            }
            Err(err) => {
                let subject = unverified_claims(token).ok().and_then(|c| c.sub);
                warn!(
                    kind = err.kind(),
                    subject = subject.as_deref().unwrap_or("-"),
                    mode = %self.mode(),
                    error = %err,
                    "Authentication failed"
                );
                Err(normalize(err))
            }
        }
    }
}

/// Extract the token from `Bearer <token>`. The scheme is case-insensitive.
fn bearer_token(header: &str) -> Result<&str, AuthError> {
    let header = header.trim();
    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AuthError::MalformedToken("expected `Bearer <token>`".to_string()))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedToken(format!(
            "unsupported authorization scheme: {}",
            scheme
        )));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedToken("empty bearer token".to_string()));
    }
    Ok(token)
}

/// A verifier may only report authentication failures; anything that is not
/// one is collapsed into `AuthenticationFailed`.
fn normalize(err: AuthError) -> AuthError {
    match err {
        AuthError::Forbidden => AuthError::AuthenticationFailed("unexpected authorization error".to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::*;
    use crate::directory::{DirectoryUser, InMemoryDirectory};

    fn strict_authenticator() -> Authenticator {
        let resolver = KeyResolver::new(StaticKeySource::with_test_keys());
        Authenticator::new(Arc::new(StrictVerifier::new(
            Arc::new(resolver),
            test_issuer(),
            TEST_CLIENT_ID,
        )))
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    #[test]
    fn test_auth_config_default() {
        let config = AuthConfig::default();
        assert_eq!(config.mode, AuthMode::Strict);
        assert_eq!(config.jwks_cache_ttl_ms, 600_000);
        assert_eq!(config.jwks_cache_max_entries, 5);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.leeway_secs, 0);
        assert_eq!(config.allowed_token_uses, vec!["access", "id"]);
    }

    #[test]
    fn test_auth_config_urls() {
        let config = AuthConfig::cognito(
            TEST_REGION.to_string(),
            TEST_USER_POOL_ID.to_string(),
            TEST_CLIENT_ID.to_string(),
        );
        assert_eq!(config.issuer(), test_issuer());
        assert_eq!(
            config.jwks_url(),
            format!("{}/.well-known/jwks.json", test_issuer())
        );

        let config = AuthConfig {
            jwks_url: Some("http://127.0.0.1:4000/jwks.json".to_string()),
            ..config
        };
        assert_eq!(config.jwks_url(), "http://127.0.0.1:4000/jwks.json");
    }

    #[test]
    fn test_auth_config_deserialization_defaults() {
        let config: AuthConfig = serde_json::from_str(
            r#"{ "mode": "permissive", "user_pool_id": "eu-west-1_X" }"#,
        )
        .unwrap();
        assert_eq!(config.mode, AuthMode::Permissive);
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.jwks_cache_max_entries, 5);
    }

    #[test]
    fn test_auth_config_validate() {
        assert!(matches!(
            AuthConfig::default().validate(),
            Err(AuthConfigError::Missing("user_pool_id"))
        ));

        let strict = AuthConfig::cognito("us-east-1".into(), "us-east-1_X".into(), String::new());
        assert!(matches!(
            strict.validate(),
            Err(AuthConfigError::Missing("client_id"))
        ));

        let permissive =
            AuthConfig::permissive("us-east-1".into(), "us-east-1_X".into(), String::new());
        assert!(permissive.validate().is_ok());
    }

    #[test]
    fn test_from_config_selects_mode() {
        let directory = Arc::new(InMemoryDirectory::new());

        let config = AuthConfig::cognito(
            TEST_REGION.into(),
            TEST_USER_POOL_ID.into(),
            TEST_CLIENT_ID.into(),
        );
        let auth = Authenticator::from_config(&config, directory.clone()).unwrap();
        assert_eq!(auth.mode(), AuthMode::Strict);

        let config = AuthConfig {
            mode: AuthMode::Permissive,
            ..config
        };
        let auth = Authenticator::from_config(&config, directory).unwrap();
        assert_eq!(auth.mode(), AuthMode::Permissive);
    }

    #[test]
    fn test_from_config_rejects_plain_http_jwks() {
        let config = AuthConfig {
            jwks_url: Some("http://jwks.example.com/keys".to_string()),
            ..AuthConfig::cognito(
                TEST_REGION.into(),
                TEST_USER_POOL_ID.into(),
                TEST_CLIENT_ID.into(),
            )
        };

        let result = Authenticator::from_config(&config, Arc::new(InMemoryDirectory::new()));
        assert!(matches!(result, Err(AuthConfigError::Jwks(_))));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
        assert_eq!(bearer_token("bearer   abc  ").unwrap(), "abc");
        assert!(bearer_token("Bearer").is_err());
        assert!(bearer_token("Bearer    ").is_err());
        assert!(bearer_token("Basic dXNlcjpwYXNz").is_err());
        assert!(bearer_token("").is_err());
    }

    #[tokio::test]
    async fn test_missing_header() {
        let err = strict_authenticator().authenticate(None).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));
        assert_eq!(err.public_message(), "Missing authorization header");
    }

    #[tokio::test]
    async fn test_valid_token_yields_principal() {
        let token = sign_with_key_a(&valid_claims("u1", &["admin"]));

        let principal = strict_authenticator()
            .authenticate(Some(&bearer(&token)))
            .await
            .unwrap();
        assert_eq!(principal.subject().as_str(), "u1");
        assert_eq!(principal.username().as_str(), "user-u1");
        assert_eq!(principal.email(), "u1@example.com");
        assert!(principal.in_group("admin"));
    }

    #[tokio::test]
    async fn test_garbage_token_is_invalid_token() {
        let auth = strict_authenticator();

        for header in ["Bearer garbage", "Bearer a.b.c", "Token xyz", "Bearer "] {
            let err = auth.authenticate(Some(header)).await.unwrap_err();
            assert_eq!(err.status_code(), 401, "{}", header);
            assert_eq!(err.public_message(), "Invalid token", "{}", header);
        }
    }

    #[tokio::test]
    async fn test_permissive_authenticator_uses_directory_email() {
        let directory = InMemoryDirectory::from_users(vec![
            DirectoryUser::new("user-u2").with_email("u2@corp.example"),
        ]);
        let auth = Authenticator::new(Arc::new(PermissiveVerifier::new(
            Arc::new(directory),
            test_issuer(),
        )));
        let token = sign_with_key_a(&valid_claims("u2", &[]));

        let principal = auth.authenticate(Some(&bearer(&token))).await.unwrap();
        assert_eq!(principal.email(), "u2@corp.example");
        assert!(principal.groups().is_empty());
    }

    #[test]
    fn test_normalize_never_forbids() {
        assert!(matches!(
            normalize(AuthError::Forbidden),
            AuthError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            normalize(AuthError::InvalidSignature),
            AuthError::InvalidSignature
        ));
    }
}
