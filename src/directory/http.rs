//! Directory backed by a remote user service.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `GET users/{username}` → `DirectoryUser` (404 when unknown)
//! - `GET users?limit=N` → `{"users": [DirectoryUser]}`
//! - `PATCH users/{username}` with `UserUpdate` → `DirectoryUser`
//! - `DELETE users/{username}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{Directory, DirectoryError, DirectoryUser, UserUpdate};

/// Default timeout for directory requests.
pub const DEFAULT_DIRECTORY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct UsersPage {
    users: Vec<DirectoryUser>,
}

#[derive(Debug, Clone)]
pub struct HttpDirectory {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DirectoryError::Transport(format!("invalid directory URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::Transport(format!(
                "directory URL cannot be a base: {}",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        Ok(Self { base_url, client })
    }

    fn users_url(&self, username: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("users");
            if let Some(username) = username {
                segments.push(username);
            }
        }
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, DirectoryError> {
        request
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), DirectoryError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(DirectoryError::Status(response.status().as_u16()))
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, DirectoryError> {
    response
        .json()
        .await
        .map_err(|e| DirectoryError::Decode(e.to_string()))
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn get_user(&self, username: &str) -> Result<Option<DirectoryUser>, DirectoryError> {
        let url = self.users_url(Some(username));
        debug!(url = %url, "Directory lookup");

        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(&response)?;
        decode(response).await.map(Some)
    }

    async fn list_users(&self, limit: usize) -> Result<Vec<DirectoryUser>, DirectoryError> {
        let mut url = self.users_url(None);
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());

        let response = self.send(self.client.get(url)).await?;
        check_status(&response)?;
        let page: UsersPage = decode(response).await?;
        Ok(page.users)
    }

    async fn update_user(
        &self,
        username: &str,
        update: &UserUpdate,
    ) -> Result<Option<DirectoryUser>, DirectoryError> {
        let url = self.users_url(Some(username));
        let response = self.send(self.client.patch(url).json(update)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(&response)?;
        decode(response).await.map(Some)
    }

    async fn delete_user(&self, username: &str) -> Result<bool, DirectoryError> {
        let url = self.users_url(Some(username));
        let response = self.send(self.client.delete(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(&response)?;
        Ok(true)
    }
}
