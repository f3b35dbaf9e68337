// Core modules
mod config;
pub mod api;
pub mod auth;
pub mod directory;
pub mod server;
pub mod types;

// Re-export key types and functions
pub use auth::{AuthConfig, AuthError, AuthMode, Authenticator, Principal};
pub use config::{DirectorySeed, load_directory_seed, resolve_directory_seed_path};
pub use directory::{Directory, DirectoryUser, HttpDirectory, InMemoryDirectory};

use std::sync::Arc;

/// Build the directory the gateway talks to: the remote user service when
/// `directory_url` is set, otherwise an in-memory directory seeded from the
/// seed file (if one is found).
pub fn create_directory(directory_url: Option<&str>) -> anyhow::Result<Arc<dyn Directory>> {
    if let Some(url) = directory_url {
        tracing::info!("Using remote user directory at {}", url);
        let directory = HttpDirectory::new(url, directory::DEFAULT_DIRECTORY_TIMEOUT)?;
        return Ok(Arc::new(directory));
    }

    let users = match resolve_directory_seed_path() {
        Some(path) => {
            let users = load_directory_seed(&path)?;
            tracing::info!("Loaded {} users from {}", users.len(), path.display());
            users
        }
        None => {
            tracing::warn!("No directory configured; starting with an empty in-memory directory");
            Vec::new()
        }
    };

    Ok(Arc::new(InMemoryDirectory::from_users(users)))
}

/// Wire configuration into the API state.
pub fn create_state(
    auth_config: &AuthConfig,
    directory: Arc<dyn Directory>,
) -> anyhow::Result<api::AppState> {
    let authenticator = Authenticator::from_config(auth_config, directory.clone())?;
    Ok(api::AppState::new(authenticator, directory))
}
