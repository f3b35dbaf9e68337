//! Request-scoped caller identity.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::auth::error::AuthError;
use crate::types::{Subject, Username};

/// Token claims consumed by the gateway.
///
/// Strict mode only produces this after signature and claim validation;
/// permissive mode after the directory confirmed the subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (stable user id)
    #[serde(default)]
    pub sub: Option<String>,
    /// Email
    #[serde(default)]
    pub email: Option<String>,
    /// Directory login name
    #[serde(rename = "cognito:username", default)]
    pub username: Option<String>,
    /// Group memberships
    #[serde(rename = "cognito:groups", default)]
    pub groups: Option<Vec<String>>,
    /// Issuer
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience; a single client id is the only accepted shape
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Expiration time (Unix timestamp, fractional seconds allowed)
    #[serde(default)]
    pub exp: Option<f64>,
    /// Cognito token kind ("id" or "access")
    #[serde(default)]
    pub token_use: Option<String>,
}

impl TokenClaims {
    /// Login name to look the caller up by: `cognito:username`, else `sub`.
    pub fn lookup_name(&self) -> Option<&str> {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.sub.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Authenticated identity of the caller.
///
/// Immutable once built; lives for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    subject: Subject,
    username: Username,
    email: String,
    groups: BTreeSet<String>,
}

impl Principal {
    /// Build a principal. Fails when `subject` is empty.
    pub fn new(
        subject: impl Into<String>,
        username: Option<String>,
        email: Option<String>,
        groups: impl IntoIterator<Item = String>,
    ) -> Result<Self, AuthError> {
        let subject = subject.into();
        if subject.is_empty() {
            return Err(AuthError::MalformedToken(
                "subject claim is empty".to_string(),
            ));
        }

        let username = username
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| subject.clone());

        Ok(Self {
            subject: Subject::new(subject),
            username: Username::new(username),
            email: email.unwrap_or_default(),
            groups: groups.into_iter().collect(),
        })
    }

    /// Map verified claims to a principal.
    pub fn from_claims(claims: TokenClaims) -> Result<Self, AuthError> {
        Self::new(
            claims.sub.unwrap_or_default(),
            claims.username,
            claims.email,
            claims.groups.unwrap_or_default(),
        )
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    /// Email, or an empty string when the token carried none.
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}
