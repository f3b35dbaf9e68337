//! User directory capability.
//!
//! The identity provider owns the user records; the gateway only reads them
//! (permissive-mode existence checks, the profile endpoint) and forwards the
//! admin operations. Two implementations are provided:
//!
//! - [`InMemoryDirectory`]: process-local records, optionally seeded from a
//!   JSON file. Used for tests and local development.
//! - [`HttpDirectory`]: a remote user service speaking JSON over HTTP.

mod http;
mod memory;

pub use http::{DEFAULT_DIRECTORY_TIMEOUT, HttpDirectory};
pub use memory::InMemoryDirectory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on users returned by a listing.
pub const DEFAULT_LIST_LIMIT: usize = 60;

/// A user record as held by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub username: String,
    /// Token subject of this account, when the directory tracks it.
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Provider account status (e.g. "CONFIRMED").
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl DirectoryUser {
    /// A new enabled account with no attributes besides its name.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            subject: None,
            email: String::new(),
            email_verified: false,
            name: String::new(),
            enabled: true,
            status: None,
            groups: Vec::new(),
            created_at: None,
            last_modified: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether `name` identifies this account, by username or subject.
    pub fn matches(&self, name: &str) -> bool {
        self.username == name || self.subject.as_deref() == Some(name)
    }
}

/// Attribute changes requested by an administrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.enabled.is_none()
    }

    /// Apply the requested changes to `user`. Empty strings are ignored.
    pub fn apply_to(&self, user: &mut DirectoryUser) {
        if let Some(name) = self.name.as_ref().filter(|n| !n.is_empty()) {
            user.name = name.clone();
        }
        if let Some(email) = self.email.as_ref().filter(|e| !e.is_empty()) {
            user.email = email.clone();
        }
        if let Some(enabled) = self.enabled {
            user.enabled = enabled;
        }
        user.last_modified = Some(Utc::now());
    }
}

/// Errors talking to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Transport(String),
    #[error("directory returned HTTP {0}")]
    Status(u16),
    #[error("invalid directory response: {0}")]
    Decode(String),
}

/// Access to the identity provider's user records.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Fetch a user by username (or subject). `None` when no such account.
    async fn get_user(&self, username: &str) -> Result<Option<DirectoryUser>, DirectoryError>;

    /// List up to `limit` users.
    async fn list_users(&self, limit: usize) -> Result<Vec<DirectoryUser>, DirectoryError>;

    /// Update a user. `None` when no such account.
    async fn update_user(
        &self,
        username: &str,
        update: &UserUpdate,
    ) -> Result<Option<DirectoryUser>, DirectoryError>;

    /// Delete a user. `false` when no such account.
    async fn delete_user(&self, username: &str) -> Result<bool, DirectoryError>;
}
