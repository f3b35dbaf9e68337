//! Bearer token verification.
//!
//! Two postures behind one [`Verifier`] trait, chosen once at startup:
//!
//! - [`StrictVerifier`] checks the RS256 signature against the issuer's JWKS
//!   and validates `iss`, `aud`, `exp` and `nbf`.
//! - [`PermissiveVerifier`] does not check the signature. It validates expiry
//!   and issuer, then asks the directory whether the subject still exists
//!   and is enabled. Only meant for deployments where the signing keys are
//!   unreachable; it trusts whoever can produce a well-formed token for a
//!   known user.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::error::{AuthError, Claim};
use crate::auth::jwks::KeyResolver;
use crate::auth::principal::TokenClaims;
use crate::directory::Directory;
use crate::types::KeyId;

/// Token kinds accepted by default (Cognito `token_use`).
pub const DEFAULT_TOKEN_USES: [&str; 2] = ["access", "id"];

/// Verification posture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Signature and claim validation against the issuer's JWKS.
    #[default]
    Strict,
    /// Expiry, issuer and directory existence checks; no signature check.
    Permissive,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Permissive => write!(f, "permissive"),
        }
    }
}

/// Turns a raw bearer token into claims the gateway can trust.
#[async_trait]
pub trait Verifier: Send + Sync {
    fn mode(&self) -> AuthMode;

    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError>;
}

/// RS256 verification against keys from a [`KeyResolver`].
pub struct StrictVerifier {
    resolver: Arc<KeyResolver>,
    issuer: String,
    audience: String,
    leeway_secs: u64,
    allowed_token_uses: Vec<String>,
}

impl StrictVerifier {
    pub fn new(
        resolver: Arc<KeyResolver>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_secs: 0,
            allowed_token_uses: DEFAULT_TOKEN_USES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Clock skew tolerated on `exp` and `nbf`.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    pub fn with_allowed_token_uses(mut self, token_uses: Vec<String>) -> Self {
        self.allowed_token_uses = token_uses;
        self
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["sub", "exp", "iss", "aud"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = self.leeway_secs;
        validation
    }
}

#[async_trait]
impl Verifier for StrictVerifier {
    fn mode(&self) -> AuthMode {
        AuthMode::Strict
    }

    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let header = decode_header(token)?;

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .map(KeyId::new)
            .ok_or_else(|| AuthError::MalformedToken("token header has no kid".to_string()))?;

        // Checked before any key lookup so a forged header cannot trigger a fetch.
        if header.alg != Algorithm::RS256 {
            debug!(alg = ?header.alg, "Rejecting token with unexpected algorithm");
            return Err(AuthError::ClaimValidationFailed(Claim::Algorithm));
        }

        let key = self.resolver.resolve(&kid).await?;
        let data = decode::<TokenClaims>(token, &key, &self.validation())?;
        let claims = data.claims;

        // `set_audience` accepts any overlap; only the bare client id is ours.
        if !matches!(&claims.aud, Some(serde_json::Value::String(aud)) if *aud == self.audience) {
            debug!(aud = ?claims.aud, "Rejecting token with unexpected audience");
            return Err(AuthError::ClaimValidationFailed(Claim::Audience));
        }

        if let Some(token_use) = claims.token_use.as_deref() {
            if !self.allowed_token_uses.iter().any(|u| u == token_use) {
                return Err(AuthError::ClaimValidationFailed(Claim::TokenUse));
            }
        }

        if claims.sub.as_deref().is_none_or(str::is_empty) {
            return Err(AuthError::MalformedToken("token has no subject".to_string()));
        }

        Ok(claims)
    }
}

/// Unsigned verification backed by a directory existence check.
pub struct PermissiveVerifier {
    directory: Arc<dyn Directory>,
    issuer: String,
    leeway_secs: u64,
}

impl PermissiveVerifier {
    pub fn new(directory: Arc<dyn Directory>, issuer: impl Into<String>) -> Self {
        Self {
            directory,
            issuer: issuer.into(),
            leeway_secs: 0,
        }
    }

    /// Clock skew tolerated on `exp`, same boundary as strict mode.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }
}

#[async_trait]
impl Verifier for PermissiveVerifier {
    fn mode(&self) -> AuthMode {
        AuthMode::Permissive
    }

    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut claims = unverified_claims(token)?;

        if claims.sub.as_deref().is_none_or(str::is_empty) {
            return Err(AuthError::MalformedToken("token has no subject".to_string()));
        }

        let now = chrono::Utc::now().timestamp() as f64;
        match claims.exp {
            None => return Err(AuthError::ClaimValidationFailed(Claim::Missing("exp"))),
            Some(exp) if exp + (self.leeway_secs as f64) < now => {
                return Err(AuthError::ClaimValidationFailed(Claim::Expiry));
            }
            Some(_) => {}
        }

        if claims.iss.as_deref().is_some_and(|iss| iss != self.issuer) {
            return Err(AuthError::ClaimValidationFailed(Claim::Issuer));
        }

        let lookup = claims.lookup_name().unwrap_or_default().to_string();
        let user = self
            .directory
            .get_user(&lookup)
            .await
            .map_err(|e| {
                warn!(error = %e, "Directory lookup failed during permissive verification");
                AuthError::AuthenticationFailed(e.to_string())
            })?
            .filter(|user| user.enabled)
            .ok_or_else(|| AuthError::PrincipalNotFound(lookup.clone()))?;

        claims.username = Some(user.username);
        if !user.email.is_empty() {
            claims.email = Some(user.email);
        }
        Ok(claims)
    }
}

/// Decode a token's payload without checking anything.
///
/// Used by permissive verification and to name the subject in failure logs.
/// Nothing returned from here is trustworthy.
pub fn unverified_claims(token: &str) -> Result<TokenClaims, AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, payload, _signature] = segments.as_slice() else {
        return Err(AuthError::MalformedToken(format!(
            "expected 3 segments, got {}",
            segments.len()
        )));
    };

    let header = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| AuthError::MalformedToken(format!("header encoding: {}", e)))?;
    let header: serde_json::Value = serde_json::from_slice(&header)
        .map_err(|e| AuthError::MalformedToken(format!("header JSON: {}", e)))?;
    if !header.is_object() {
        return Err(AuthError::MalformedToken("header is not an object".to_string()));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::MalformedToken(format!("payload encoding: {}", e)))?;
    serde_json::from_slice(&payload)
        .map_err(|e| AuthError::MalformedToken(format!("payload JSON: {}", e)))
}
