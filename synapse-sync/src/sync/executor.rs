use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::outcome::{FailureReason, TransferOutcome};
use super::remote::{RemoteStore, StoreError};
use super::transfer::move_file;

/// Upload problems that end the whole run rather than one item.
#[derive(Debug, Error)]
pub enum UploadAbort {
    #[error("file '{0}' listed in the manifest does not exist")]
    MissingLocalFile(PathBuf),
}

/// Fetches one remote file to `target`. Never errors: every failure is
/// reported and returned as [`TransferOutcome::Failed`].
pub async fn download_one<S>(store: &S, id: &str, target: &Path, overwrite: bool) -> TransferOutcome
where
    S: RemoteStore + ?Sized,
{
    let outcome = match try_download(store, id, target, overwrite).await {
        Ok(outcome) => outcome,
        Err(reason) => TransferOutcome::Failed(reason),
    };
    match &outcome {
        TransferOutcome::Transferred => println!("DOWNLOADED: '{}'", target.display()),
        TransferOutcome::SkippedExisting => {
            println!("SKIPPED: '{}' already exists", target.display())
        }
        TransferOutcome::Failed(reason) => println!("FAILED: could not download '{id}': {reason}"),
    }
    outcome
}

async fn try_download<S>(
    store: &S,
    id: &str,
    target: &Path,
    overwrite: bool,
) -> Result<TransferOutcome, FailureReason>
where
    S: RemoteStore + ?Sized,
{
    if !overwrite && tokio::fs::try_exists(target).await.unwrap_or(false) {
        return Ok(TransferOutcome::SkippedExisting);
    }
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| {
            FailureReason::InvalidTarget(format!("'{}' has no parent", target.display()))
        })?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|err| FailureReason::Io(err.to_string()))?;

    let downloaded = store
        .download(id, parent)
        .await
        .map_err(|err| FailureReason::Remote(err.to_string()))?;

    if downloaded != target {
        if !tokio::fs::try_exists(&downloaded).await.unwrap_or(false) {
            return Err(FailureReason::MissingAfterDownload(
                downloaded.display().to_string(),
            ));
        }
        move_file(&downloaded, target)
            .await
            .map_err(|err| FailureReason::Io(err.to_string()))?;
    } else if !tokio::fs::try_exists(target).await.unwrap_or(false) {
        return Err(FailureReason::MissingAfterDownload(
            target.display().to_string(),
        ));
    }
    tracing::debug!(id, target = %target.display(), "download complete");
    Ok(TransferOutcome::Transferred)
}

/// Publishes one local file under `parent_id` unless a same-named entity is
/// already there. Duplicates are detected by name only, never by content.
///
/// A missing local file aborts the run; a failed store is a per-item failure.
pub async fn upload_one<S>(
    store: &S,
    local: &Path,
    parent_id: &str,
    annotations: &BTreeMap<String, String>,
) -> Result<TransferOutcome, UploadAbort>
where
    S: RemoteStore + ?Sized,
{
    if !tokio::fs::try_exists(local).await.unwrap_or(false) {
        return Err(UploadAbort::MissingLocalFile(local.to_path_buf()));
    }

    let name = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match store.find_by_name(&name, parent_id).await {
        Ok(Some(existing)) => {
            println!(
                "SKIPPED: '{}' already exists in Synapse (ID: {existing})",
                local.display()
            );
            return Ok(TransferOutcome::SkippedExisting);
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(file = %local.display(), error = %err, "could not check for existing entity");
        }
    }

    let outcome = match store.store(local, parent_id, annotations).await {
        Ok(stored) => {
            println!("UPLOADED: '{}' -> Synapse ID {}", local.display(), stored.id);
            TransferOutcome::Transferred
        }
        Err(err) => {
            println!("FAILED: could not upload '{}': {err}", local.display());
            TransferOutcome::Failed(store_failure(err))
        }
    };
    Ok(outcome)
}

fn store_failure(err: StoreError) -> FailureReason {
    match err {
        StoreError::Io(err) => FailureReason::Io(err.to_string()),
        other => FailureReason::Remote(other.to_string()),
    }
}
