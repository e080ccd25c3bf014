use std::path::{Path, PathBuf};

use synapse_core::EntityKind;
use thiserror::Error;

use crate::manifest::{ManifestEntry, UploadEntry};

use super::executor::{UploadAbort, download_one, upload_one};
use super::outcome::{Direction, FailureReason, RunSummary, TransferOutcome, print_summary};
use super::paths::{PathError, container_root, file_target, resolve, upload_source};
use super::remote::{RemoteEntity, RemoteStore, StoreError};
use super::walker::walk;

/// Errors that stop the whole run. Per-item problems never end up here.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid Synapse ID '{0}': it does not exist or is not accessible")]
    InvalidId(String),
    #[error("cannot access Synapse ID '{id}': {source}")]
    Inaccessible {
        id: String,
        #[source]
        source: StoreError,
    },
    #[error("unable to resolve '{path}': {source}")]
    LocalPath {
        path: PathBuf,
        #[source]
        source: PathError,
    },
    #[error(transparent)]
    Upload(#[from] UploadAbort),
}

/// A manifest entry whose remote entity has been fetched and classified.
#[derive(Debug, Clone)]
pub struct ValidatedEntry {
    pub entry: ManifestEntry,
    pub entity: RemoteEntity,
}

pub struct Reconciler<S> {
    store: S,
}

impl<S> Reconciler<S>
where
    S: RemoteStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Confirms `id` exists and is readable, printing what was found.
    pub async fn validate_entity(&self, id: &str) -> Result<RemoteEntity, ReconcileError> {
        println!("Checking Synapse ID: {id}");
        match self.store.get(id).await {
            Ok(entity) => {
                println!("SUCCESS: Synapse ID '{id}' exists");
                println!("   Name: {}", entity.name);
                println!("   Type: {}", entity.type_descriptor);
                println!(
                    "   Description: {}",
                    entity
                        .description
                        .as_deref()
                        .unwrap_or("No description available")
                );
                println!();
                Ok(entity)
            }
            Err(StoreError::NotFound(_)) => {
                println!("ERROR: Synapse ID '{id}' does not exist or is not accessible");
                Err(ReconcileError::InvalidId(id.to_string()))
            }
            Err(source) => {
                println!("ERROR: Failed to access Synapse ID '{id}': {source}");
                Err(ReconcileError::Inaccessible {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }

    /// Validates every entry before anything is transferred. The first bad ID ends the run.
    pub async fn validate_manifest(
        &self,
        entries: Vec<ManifestEntry>,
    ) -> Result<Vec<ValidatedEntry>, ReconcileError> {
        let mut validated = Vec::with_capacity(entries.len());
        for entry in entries {
            let entity = self.validate_entity(&entry.remote_id).await?;
            validated.push(ValidatedEntry { entry, entity });
        }
        Ok(validated)
    }

    /// Materialises each manifest entry under `output_root`. Files inside a
    /// container count individually towards the returned summary.
    pub async fn download_manifest(
        &self,
        entries: Vec<ManifestEntry>,
        output_root: &Path,
        overwrite: bool,
    ) -> Result<RunSummary, ReconcileError> {
        if entries.is_empty() {
            println!("No files found in the CSV; nothing to download.");
            return Ok(RunSummary::default());
        }

        println!("Validating Synapse IDs...");
        let validated = self.validate_manifest(entries).await?;
        let output_root = resolve(output_root).map_err(|source| ReconcileError::LocalPath {
            path: output_root.to_path_buf(),
            source,
        })?;

        println!("Starting downloads...");
        let mut summary = RunSummary::default();
        for item in &validated {
            summary.absorb(self.download_entry(item, &output_root, overwrite).await);
        }

        print_summary(Direction::Download, "", &summary);
        println!("Download complete.");
        Ok(summary)
    }

    async fn download_entry(
        &self,
        item: &ValidatedEntry,
        output_root: &Path,
        overwrite: bool,
    ) -> RunSummary {
        let id = item.entity.id.as_str();
        let declared = item.entry.declared_save_path.as_str();
        let mut summary = RunSummary::default();

        if declared.trim().is_empty() {
            println!("WARNING: no save_path specified for {id}, skipping");
            summary.record(&TransferOutcome::Failed(FailureReason::MissingSavePath));
            return summary;
        }

        match item.entity.kind {
            EntityKind::Container => {
                match container_root(declared, output_root, &item.entity.name) {
                    Ok(root) => {
                        println!("Downloading folder {id} to {}...", root.display());
                        summary = self.download_container(id, &root, overwrite).await;
                    }
                    Err(err) => record_failure(&mut summary, id, FailureReason::InvalidTarget(err.to_string())),
                }
            }
            EntityKind::File => match file_target(declared, output_root, &item.entity.name) {
                Ok(target) => {
                    println!("Downloading file {id} to {}...", target.display());
                    summary.record(&download_one(&self.store, id, &target, overwrite).await);
                }
                Err(err) => record_failure(&mut summary, id, FailureReason::InvalidTarget(err.to_string())),
            },
            EntityKind::Unknown => record_failure(
                &mut summary,
                id,
                FailureReason::UnsupportedKind(item.entity.type_descriptor.clone()),
            ),
        }
        summary
    }

    /// Downloads every file below a container into `root`, keeping the remote
    /// layout. Prints and returns the folder's own summary.
    pub async fn download_container(&self, id: &str, root: &Path, overwrite: bool) -> RunSummary {
        let mut summary = RunSummary::default();
        if let Err(err) = tokio::fs::create_dir_all(root).await {
            record_failure(&mut summary, id, FailureReason::Io(err.to_string()));
            return summary;
        }

        let plan = walk(&self.store, id, root.to_path_buf()).await;
        if plan.is_empty() {
            println!("No files found in folder {id}");
            return summary;
        }

        println!("Downloading {} files from folder {id}...", plan.len());
        for file in &plan {
            let outcome = download_one(&self.store, &file.remote_id, &file.save_path, overwrite).await;
            summary.record(&outcome);
        }
        print_summary(Direction::Download, &format!("folder {id}"), &summary);
        summary
    }

    /// Publishes each local file into `parent_id`. Every source path is checked
    /// before the first upload so a bad manifest uploads nothing.
    pub async fn upload_manifest(
        &self,
        entries: Vec<UploadEntry>,
        parent_id: &str,
    ) -> Result<RunSummary, ReconcileError> {
        if entries.is_empty() {
            println!("No files found in the CSV; nothing to upload.");
            return Ok(RunSummary::default());
        }

        let mut planned = Vec::with_capacity(entries.len());
        for entry in entries {
            let source = upload_source(&entry.local_path).map_err(|source| {
                ReconcileError::LocalPath {
                    path: entry.local_path.clone(),
                    source,
                }
            })?;
            if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
                return Err(UploadAbort::MissingLocalFile(entry.local_path).into());
            }
            planned.push((source, entry.annotations()));
        }

        let mut summary = RunSummary::default();
        for (source, annotations) in &planned {
            let outcome = upload_one(&self.store, source, parent_id, annotations).await?;
            summary.record(&outcome);
        }

        print_summary(Direction::Upload, "", &summary);
        println!("Upload complete.");
        Ok(summary)
    }
}

fn record_failure(summary: &mut RunSummary, id: &str, reason: FailureReason) {
    println!("FAILED: could not download '{id}': {reason}");
    summary.record(&TransferOutcome::Failed(reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::fake_store::FakeStore;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn entry(id: &str, save_path: &str) -> ManifestEntry {
        ManifestEntry {
            remote_id: id.to_string(),
            declared_save_path: save_path.to_string(),
            extra_fields: BTreeMap::new(),
        }
    }

    fn upload_entry(path: PathBuf) -> UploadEntry {
        UploadEntry {
            local_path: path,
            extra_fields: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn single_file_entry_resolves_under_output_root() {
        let dir = tempdir().unwrap();
        let out = resolve(dir.path()).unwrap();
        let reconciler = Reconciler::new(FakeStore::new().with_file("R1", "b.txt", None, b"hi"));

        let summary = reconciler
            .download_manifest(vec![entry("R1", "a/b.txt")], &out, false)
            .await
            .unwrap();

        assert_eq!(
            summary,
            RunSummary {
                transferred: 1,
                skipped: 0,
                failed: 0
            }
        );
        assert_eq!(std::fs::read(out.join("a/b.txt")).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn declared_directory_receives_entity_name() {
        let dir = tempdir().unwrap();
        let out = resolve(dir.path()).unwrap();
        let reconciler = Reconciler::new(FakeStore::new().with_file("R1", "b.txt", None, b"hi"));

        reconciler
            .download_manifest(vec![entry("R1", "data")], &out, false)
            .await
            .unwrap();

        assert!(out.join("data/b.txt").is_file());
    }

    #[tokio::test]
    async fn absolute_save_path_ignores_output_root() {
        let out = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        let abs = resolve(elsewhere.path()).unwrap();
        let reconciler = Reconciler::new(FakeStore::new().with_file("R1", "b.txt", None, b"hi"));

        reconciler
            .download_manifest(vec![entry("R1", &abs.to_string_lossy())], out.path(), false)
            .await
            .unwrap();

        assert!(abs.join("b.txt").is_file());
        assert!(!out.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn container_expands_into_per_file_counts() {
        let dir = tempdir().unwrap();
        let out = resolve(dir.path()).unwrap();
        let store = FakeStore::new()
            .with_folder("F1", "F1name", None)
            .with_file("X", "x.txt", Some("F1"), b"x")
            .with_folder("S", "sub", Some("F1"))
            .with_file("Y", "y.txt", Some("S"), b"y");
        let reconciler = Reconciler::new(store);

        let summary = reconciler
            .download_manifest(vec![entry("F1", "dest")], &out, false)
            .await
            .unwrap();

        assert_eq!(summary.transferred, 2);
        assert_eq!(summary.total(), 2);
        assert_eq!(std::fs::read(out.join("dest/F1name/x.txt")).unwrap(), b"x");
        assert_eq!(std::fs::read(out.join("dest/F1name/sub/y.txt")).unwrap(), b"y");
    }

    #[tokio::test]
    async fn second_run_skips_everything() {
        let dir = tempdir().unwrap();
        let out = resolve(dir.path()).unwrap();
        let store = FakeStore::new()
            .with_folder("F1", "F1name", None)
            .with_file("X", "x.txt", Some("F1"), b"x")
            .with_file("R1", "b.txt", None, b"b");
        let reconciler = Reconciler::new(store);
        let manifest = vec![entry("F1", "dest"), entry("R1", "files")];

        reconciler
            .download_manifest(manifest.clone(), &out, false)
            .await
            .unwrap();
        let downloads_after_first = reconciler.store().calls_matching("download:");
        let summary = reconciler
            .download_manifest(manifest, &out, false)
            .await
            .unwrap();

        assert_eq!(
            summary,
            RunSummary {
                transferred: 0,
                skipped: 2,
                failed: 0
            }
        );
        assert_eq!(
            reconciler.store().calls_matching("download:"),
            downloads_after_first
        );
    }

    #[tokio::test]
    async fn empty_container_still_gets_root_directory() {
        let dir = tempdir().unwrap();
        let out = resolve(dir.path()).unwrap();
        let reconciler = Reconciler::new(FakeStore::new().with_folder("F", "Empty", None));

        let summary = reconciler
            .download_manifest(vec![entry("F", ".")], &out, false)
            .await
            .unwrap();

        assert_eq!(summary, RunSummary::default());
        assert!(out.join("Empty").is_dir());
    }

    #[tokio::test]
    async fn invalid_id_aborts_before_any_transfer() {
        let dir = tempdir().unwrap();
        let store = FakeStore::new().with_file("R1", "b.txt", None, b"hi");
        let reconciler = Reconciler::new(store);

        let err = reconciler
            .download_manifest(
                vec![entry("R1", "a"), entry("missing", "b")],
                dir.path(),
                false,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::InvalidId(id) if id == "missing"));
        assert_eq!(reconciler.store().calls_matching("download:"), 0);
        assert!(!dir.path().join("a").exists());
    }

    #[tokio::test]
    async fn missing_save_path_and_unknown_kind_are_item_failures() {
        let dir = tempdir().unwrap();
        let out = resolve(dir.path()).unwrap();
        let store = FakeStore::new()
            .with_file("R1", "b.txt", None, b"hi")
            .with_unknown("T1", "table", None)
            .with_file("R2", "c.txt", None, b"c")
            .with_failing_download("R2");
        let reconciler = Reconciler::new(store);

        let summary = reconciler
            .download_manifest(
                vec![entry("R1", ""), entry("T1", "t"), entry("R2", "c")],
                &out,
                false,
            )
            .await
            .unwrap();

        assert_eq!(
            summary,
            RunSummary {
                transferred: 0,
                skipped: 0,
                failed: 3
            }
        );
    }

    #[tokio::test]
    async fn empty_manifest_makes_no_remote_calls() {
        let dir = tempdir().unwrap();
        let reconciler = Reconciler::new(FakeStore::new());

        let summary = reconciler
            .download_manifest(Vec::new(), dir.path(), false)
            .await
            .unwrap();

        assert_eq!(summary, RunSummary::default());
        assert!(reconciler.store().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_twice_creates_no_duplicates() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bam");
        let b = dir.path().join("b.fastq");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();
        let reconciler = Reconciler::new(FakeStore::new().with_folder("P", "parent", None));
        let manifest = vec![upload_entry(a), upload_entry(b)];

        let first = reconciler
            .upload_manifest(manifest.clone(), "P")
            .await
            .unwrap();
        let second = reconciler.upload_manifest(manifest, "P").await.unwrap();

        assert_eq!(first.transferred, 2);
        assert_eq!(
            second,
            RunSummary {
                transferred: 0,
                skipped: 2,
                failed: 0
            }
        );
        assert_eq!(reconciler.store().stored.lock().unwrap().len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_upload_is_published_under_manifest_name() {
        let dir = tempdir().unwrap();
        let blob = dir.path().join("blob-3f9a");
        let link = dir.path().join("sample.bam");
        std::fs::write(&blob, b"reads").unwrap();
        std::os::unix::fs::symlink(&blob, &link).unwrap();
        let reconciler = Reconciler::new(FakeStore::new().with_folder("P", "parent", None));

        let first = reconciler
            .upload_manifest(vec![upload_entry(link.clone())], "P")
            .await
            .unwrap();
        let second = reconciler
            .upload_manifest(vec![upload_entry(link)], "P")
            .await
            .unwrap();

        assert_eq!(first.transferred, 1);
        assert_eq!(second.skipped, 1);
        let calls = reconciler.store().calls.lock().unwrap().clone();
        assert!(calls.contains(&"find:sample.bam".to_string()));
        assert!(calls.contains(&"store:sample.bam".to_string()));
        assert_eq!(reconciler.store().calls_matching("store:"), 1);
        assert!(!calls.iter().any(|c| c.contains("blob-3f9a")));
    }

    #[tokio::test]
    async fn missing_upload_source_aborts_with_nothing_uploaded() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("present.bam");
        std::fs::write(&present, b"p").unwrap();
        let reconciler = Reconciler::new(FakeStore::new().with_folder("P", "parent", None));

        let err = reconciler
            .upload_manifest(
                vec![
                    upload_entry(present),
                    upload_entry(dir.path().join("absent.bam")),
                ],
                "P",
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::Upload(UploadAbort::MissingLocalFile(_))
        ));
        assert!(reconciler.store().stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_store_failure_continues_batch() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bam");
        let b = dir.path().join("b.bam");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();
        let store = FakeStore::new()
            .with_folder("P", "parent", None)
            .with_failing_store("a.bam");
        let reconciler = Reconciler::new(store);

        let summary = reconciler
            .upload_manifest(vec![upload_entry(a), upload_entry(b)], "P")
            .await
            .unwrap();

        assert_eq!(summary.transferred, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn validate_entity_reports_invalid_id() {
        let reconciler = Reconciler::new(FakeStore::new());
        let err = reconciler.validate_entity("syn0").await.unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidId(_)));
    }
}
