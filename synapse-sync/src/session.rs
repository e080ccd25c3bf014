use std::path::{Path, PathBuf};

use synapse_core::{SynapseClient, UserProfile};
use thiserror::Error;

use crate::config::SyncConfig;
use crate::sync::paths::expand_tilde;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unable to read token file '{path}': {source}")]
    ReadToken {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token file '{0}' is empty")]
    EmptyToken(PathBuf),
    #[error("invalid repository endpoint: {0}")]
    Client(#[source] synapse_core::SynapseError),
    #[error("login failed: {0}")]
    Login(#[source] synapse_core::SynapseError),
}

/// Personal access token read from disk. Never printed.
pub struct AccessToken(String);

impl AccessToken {
    pub fn from_file(path: &Path) -> Result<Self, SessionError> {
        let path = expand_tilde(&path.to_string_lossy());
        let raw = std::fs::read_to_string(&path).map_err(|source| SessionError::ReadToken {
            path: path.clone(),
            source,
        })?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(SessionError::EmptyToken(path));
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

pub struct Session {
    pub client: SynapseClient,
    pub profile: UserProfile,
}

/// Builds an authenticated client and proves the token works before any manifest work starts.
pub async fn login(config: &SyncConfig, token: &AccessToken) -> Result<Session, SessionError> {
    let client = SynapseClient::with_base_url(&config.repo_endpoint, token.as_str())
        .map_err(SessionError::Client)?;
    let profile = client
        .get_user_profile()
        .await
        .map_err(SessionError::Login)?;
    tracing::info!(user = %profile.user_name, "logged in");
    Ok(Session { client, profile })
}
