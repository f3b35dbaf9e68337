//! Directory seed file for the in-memory directory.
//!
//! ```json
//! {
//!   "users": [
//!     { "username": "alice", "email": "alice@${MAIL_DOMAIN}", "groups": ["admin"] }
//!   ]
//! }
//! ```
//!
//! `${VAR}` in string fields is replaced from the environment; unknown
//! variables are left as written.

use serde::Deserialize;
use std::{env, fs, path::Path, path::PathBuf};

use crate::directory::DirectoryUser;

#[derive(Debug, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub users: Vec<DirectoryUser>,
}

/// Locate the seed file: `DIRECTORY_SEED`, else `./directory.json` if present.
pub fn resolve_directory_seed_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("DIRECTORY_SEED") {
        return Some(PathBuf::from(p));
    }

    let candidate = PathBuf::from("directory.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

fn expand_vars_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            match lookup(&name) {
                Some(val) if closed => out.push_str(&val),
                _ => {
                    out.push_str("${");
                    out.push_str(&name);
                    if closed {
                        out.push('}');
                    }
                }
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_env_vars(input: &str) -> String {
    expand_vars_with(input, |name| env::var(name).ok())
}

fn expand_user(mut user: DirectoryUser) -> DirectoryUser {
    user.username = expand_env_vars(&user.username);
    user.email = expand_env_vars(&user.email);
    user.name = expand_env_vars(&user.name);
    if let Some(subject) = user.subject.as_mut() {
        *subject = expand_env_vars(subject);
    }
    user.groups = user.groups.iter().map(|g| expand_env_vars(g)).collect();

    user
}

/// Read and expand the seed file at `path`.
pub fn load_directory_seed(path: &Path) -> anyhow::Result<Vec<DirectoryUser>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
    let seed: DirectorySeed = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("parsing {}: {}", path.display(), e))?;

    let mut users = Vec::with_capacity(seed.users.len());
    for user in seed.users {
        let user = expand_user(user);
        if user.username.is_empty() {
            return Err(anyhow::anyhow!(
                "{}: every user needs a non-empty `username`",
                path.display()
            ));
        }
        users.push(user);
    }

    Ok(users)
}
