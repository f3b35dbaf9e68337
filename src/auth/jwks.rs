//! JWKS (JSON Web Key Set) fetching and caching module.
//!
//! `KeySource` is the network capability: given a key id, produce the
//! verification key. `JwksKeySource` implements it against the issuer's
//! `/.well-known/jwks.json` document. `KeyResolver` sits in front of any
//! source and caches resolved keys per key id, bounded in age and count.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, PublicKeyUse};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::clock::{Clock, SystemClock};
use crate::types::KeyId;

/// Default age after which a cached key is refetched (10 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(600_000);

/// Default number of keys retained in the cache.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 5;

/// Default timeout for JWKS HTTP fetches.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur while resolving a signing key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyResolveError {
    /// The key set was fetched but has no usable key with this id.
    #[error("key not found: {0}")]
    KeyNotFound(String),
    /// The key set could not be fetched or parsed.
    #[error("failed to fetch JWKS: {0}")]
    FetchError(String),
}

/// Capability that produces the verification key for a key id.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch(&self, kid: &KeyId) -> Result<DecodingKey, KeyResolveError>;
}

/// `KeySource` backed by a remote JWKS endpoint.
#[derive(Debug, Clone)]
pub struct JwksKeySource {
    /// The JWKS endpoint URL.
    jwks_url: String,
    /// HTTP client for fetching JWKS.
    client: reqwest::Client,
}

impl JwksKeySource {
    /// Create a source for `jwks_url`.
    ///
    /// The URL must use HTTPS; plain HTTP is accepted for loopback hosts only.
    pub fn new(jwks_url: impl Into<String>, timeout: Duration) -> Result<Self, KeyResolveError> {
        let jwks_url = jwks_url.into();
        check_jwks_url(&jwks_url)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeyResolveError::FetchError(format!("HTTP client: {}", e)))?;

        Ok(Self { jwks_url, client })
    }

    /// The endpoint this source fetches from.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Fetch the full key set.
    pub async fn fetch_key_set(&self) -> Result<JwkSet, KeyResolveError> {
        debug!(jwks_url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| KeyResolveError::FetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeyResolveError::FetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| KeyResolveError::FetchError(format!("invalid JWKS document: {}", e)))?;

        info!(
            jwks_url = %self.jwks_url,
            key_count = jwks.keys.len(),
            "Fetched JWKS"
        );
        Ok(jwks)
    }
}

#[async_trait]
impl KeySource for JwksKeySource {
    async fn fetch(&self, kid: &KeyId) -> Result<DecodingKey, KeyResolveError> {
        let jwks = self.fetch_key_set().await?;

        let jwk = jwks
            .find(kid.as_str())
            .ok_or_else(|| KeyResolveError::KeyNotFound(kid.to_string()))?;

        if jwk.common.public_key_use == Some(PublicKeyUse::Encryption) {
            warn!(kid = %kid, "JWKS entry is an encryption key, refusing to verify with it");
            return Err(KeyResolveError::KeyNotFound(kid.to_string()));
        }

        jwk_to_decoding_key(jwk)
    }
}

/// Convert an RSA JWK to a jsonwebtoken DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, KeyResolveError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|e| KeyResolveError::FetchError(format!("invalid RSA components: {}", e))),
        _ => Err(KeyResolveError::FetchError(
            "JWKS entry is not an RSA key".to_string(),
        )),
    }
}

fn check_jwks_url(jwks_url: &str) -> Result<(), KeyResolveError> {
    let url = url::Url::parse(jwks_url)
        .map_err(|e| KeyResolveError::FetchError(format!("invalid JWKS URL: {}", e)))?;

    let loopback = matches!(
        url.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    );

    match url.scheme() {
        "https" => Ok(()),
        "http" if loopback => Ok(()),
        _ => Err(KeyResolveError::FetchError(
            "JWKS endpoint must use HTTPS (HTTP only allowed for loopback hosts)".to_string(),
        )),
    }
}

/// Cached key entry with metadata.
#[derive(Clone)]
struct CachedKey {
    decoding_key: DecodingKey,
    fetched_at: Instant,
}

/// Process-wide signing key cache.
///
/// A fresh entry is served without touching the source. Misses and stale
/// entries go to the source; the lock is not held during the fetch, so
/// concurrent misses for the same key may both fetch and the last insert wins.
pub struct KeyResolver {
    source: Arc<dyn KeySource>,
    clock: Arc<dyn Clock>,
    cache_ttl: Duration,
    max_entries: usize,
    keys: RwLock<HashMap<KeyId, CachedKey>>,
}

impl KeyResolver {
    /// Create a resolver with the default TTL and capacity.
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self {
            source,
            clock: Arc::new(SystemClock),
            cache_ttl: DEFAULT_CACHE_TTL,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Resolve the verification key for `kid`.
    pub async fn resolve(&self, kid: &KeyId) -> Result<DecodingKey, KeyResolveError> {
        if let Some(key) = self.get_fresh(kid).await {
            debug!(kid = %kid, "Signing key cache hit");
            return Ok(key);
        }

        debug!(kid = %kid, "Signing key cache miss");
        let decoding_key = self.source.fetch(kid).await?;
        self.insert(kid.clone(), decoding_key.clone()).await;
        Ok(decoding_key)
    }

    async fn get_fresh(&self, kid: &KeyId) -> Option<DecodingKey> {
        let now = self.clock.now();
        let keys = self.keys.read().await;
        keys.get(kid)
            .filter(|cached| now.saturating_duration_since(cached.fetched_at) < self.cache_ttl)
            .map(|cached| cached.decoding_key.clone())
    }

    async fn insert(&self, kid: KeyId, decoding_key: DecodingKey) {
        let now = self.clock.now();
        let mut keys = self.keys.write().await;
        keys.insert(
            kid,
            CachedKey {
                decoding_key,
                fetched_at: now,
            },
        );

        if keys.len() > self.max_entries {
            keys.retain(|_, cached| now.saturating_duration_since(cached.fetched_at) < self.cache_ttl);
        }

        while keys.len() > self.max_entries {
            let oldest = keys
                .iter()
                .min_by_key(|(_, cached)| cached.fetched_at)
                .map(|(kid, _)| kid.clone());

            match oldest {
                Some(kid) => {
                    debug!(kid = %kid, "Evicting oldest signing key");
                    keys.remove(&kid);
                }
                None => break,
            }
        }
    }

    /// Number of cached keys, fresh or not.
    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Whether `kid` is cached, fresh or not.
    pub async fn contains(&self, kid: &KeyId) -> bool {
        self.keys.read().await.contains_key(kid)
    }

    /// Drop every cached key.
    pub async fn clear(&self) {
        self.keys.write().await.clear();
    }
}
