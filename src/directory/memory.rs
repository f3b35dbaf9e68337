//! Process-local directory.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Directory, DirectoryError, DirectoryUser, UserUpdate};

/// Directory held in memory, keyed by username.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<BTreeMap<String, DirectoryUser>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory holding `users`.
    pub fn from_users(users: impl IntoIterator<Item = DirectoryUser>) -> Self {
        let now = Utc::now();
        let users = users
            .into_iter()
            .map(|mut user| {
                user.created_at.get_or_insert(now);
                (user.username.clone(), user)
            })
            .collect();

        Self {
            users: RwLock::new(users),
        }
    }

    /// Add or replace a user.
    pub async fn insert(&self, user: DirectoryUser) {
        self.users.write().await.insert(user.username.clone(), user);
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn get_user(&self, username: &str) -> Result<Option<DirectoryUser>, DirectoryError> {
        let users = self.users.read().await;
        if let Some(user) = users.get(username) {
            return Ok(Some(user.clone()));
        }
        Ok(users.values().find(|u| u.matches(username)).cloned())
    }

    async fn list_users(&self, limit: usize) -> Result<Vec<DirectoryUser>, DirectoryError> {
        let users = self.users.read().await;
        Ok(users.values().take(limit).cloned().collect())
    }

    async fn update_user(
        &self,
        username: &str,
        update: &UserUpdate,
    ) -> Result<Option<DirectoryUser>, DirectoryError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(username).map(|user| {
            update.apply_to(user);
            user.clone()
        }))
    }

    async fn delete_user(&self, username: &str) -> Result<bool, DirectoryError> {
        Ok(self.users.write().await.remove(username).is_some())
    }
}
