//! Authentication error taxonomy.
//!
//! Every variant except `Forbidden` maps to `401 Unauthorized`. None of them is
//! ever reported as a server error, even when the root cause is an upstream
//! outage: a request whose identity cannot be established is rejected.

use std::fmt;

use thiserror::Error;

use crate::auth::jwks::KeyResolveError;

/// Message returned when the `Authorization` header is absent.
pub const MISSING_HEADER_MESSAGE: &str = "Missing authorization header";

/// Message returned for every token that cannot be verified.
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid token";

/// Message returned when an authenticated caller lacks admin privileges.
pub const FORBIDDEN_MESSAGE: &str = "Admin privileges required";

/// The claim (or header field) that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Algorithm,
    Issuer,
    Audience,
    Expiry,
    NotBefore,
    TokenUse,
    /// A claim required by the validation rules is absent.
    Missing(&'static str),
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Algorithm => write!(f, "alg"),
            Self::Issuer => write!(f, "iss"),
            Self::Audience => write!(f, "aud"),
            Self::Expiry => write!(f, "exp"),
            Self::NotBefore => write!(f, "nbf"),
            Self::TokenUse => write!(f, "token_use"),
            Self::Missing(name) => write!(f, "{} (missing)", name),
        }
    }
}

/// Authentication and authorization errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header on a protected request.
    #[error("authorization header missing")]
    MissingCredentials,

    /// The token is structurally invalid (bad segments, missing `kid` or `sub`).
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The signing key could not be resolved.
    #[error("signing key unavailable: {0}")]
    SignatureKeyUnavailable(#[from] KeyResolveError),

    /// The signature does not match the resolved key.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// A claim did not match its expected value.
    #[error("claim validation failed: {0}")]
    ClaimValidationFailed(Claim),

    /// Permissive mode: the directory has no (enabled) record for the subject.
    #[error("principal not found in directory: {0}")]
    PrincipalNotFound(String),

    /// Authenticated, but not entitled to the operation.
    #[error("admin privileges required")]
    Forbidden,

    /// Anything else that went wrong while establishing the principal.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
}

impl AuthError {
    /// Short, stable name of the failure kind for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::MalformedToken(_) => "malformed_token",
            Self::SignatureKeyUnavailable(_) => "signature_key_unavailable",
            Self::InvalidSignature => "invalid_signature",
            Self::ClaimValidationFailed(_) => "claim_validation_failed",
            Self::PrincipalNotFound(_) => "principal_not_found",
            Self::Forbidden => "forbidden",
            Self::AuthenticationFailed(_) => "authentication_failed",
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Forbidden => 403,
            _ => 401,
        }
    }

    /// Fixed, caller-facing message. Never contains internal detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MissingCredentials => MISSING_HEADER_MESSAGE,
            Self::Forbidden => FORBIDDEN_MESSAGE,
            _ => INVALID_TOKEN_MESSAGE,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::ClaimValidationFailed(Claim::Expiry),
            ErrorKind::ImmatureSignature => Self::ClaimValidationFailed(Claim::NotBefore),
            ErrorKind::InvalidIssuer => Self::ClaimValidationFailed(Claim::Issuer),
            ErrorKind::InvalidAudience => Self::ClaimValidationFailed(Claim::Audience),
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                Self::ClaimValidationFailed(Claim::Algorithm)
            }
            ErrorKind::MissingRequiredClaim(name) => {
                Self::ClaimValidationFailed(Claim::Missing(static_claim_name(name)))
            }
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::MalformedToken(err.to_string()),
            _ => Self::AuthenticationFailed(err.to_string()),
        }
    }
}

fn static_claim_name(name: &str) -> &'static str {
    match name {
        "exp" => "exp",
        "iss" => "iss",
        "aud" => "aud",
        "sub" => "sub",
        "nbf" => "nbf",
        _ => "unknown",
    }
}
