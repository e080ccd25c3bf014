use std::path::PathBuf;

use crate::sync::paths::expand_tilde;

const DEFAULT_CACHE_ROOT: &str = "/tmp/.synapseCache";
const DEFAULT_REPO_ENDPOINT: &str = "https://repo-prod.prod.sagebase.org";
const DEFAULT_PART_SIZE_MB: u64 = 8;
const MIN_PART_SIZE_MB: u64 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub repo_endpoint: String,
    pub cache_root: PathBuf,
    pub upload_part_size: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            repo_endpoint: DEFAULT_REPO_ENDPOINT.to_string(),
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            upload_part_size: DEFAULT_PART_SIZE_MB * 1024 * 1024,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache_root = lookup("SYNAPSE_CACHE_FOLDER")
            .filter(|value| !value.trim().is_empty())
            .map(|value| expand_tilde(value.trim()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_ROOT));
        let repo_endpoint = lookup("SYNAPSE_REPO_ENDPOINT")
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_REPO_ENDPOINT.to_string());
        let part_size_mb = lookup("SYNAPSE_UPLOAD_PART_MB")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v >= MIN_PART_SIZE_MB)
            .unwrap_or(DEFAULT_PART_SIZE_MB);

        Self {
            repo_endpoint,
            cache_root,
            upload_part_size: part_size_mb * 1024 * 1024,
        }
    }

    /// Staging area for downloads that have not been moved into place yet.
    pub fn download_staging_dir(&self) -> PathBuf {
        self.cache_root.join("downloads")
    }
}
