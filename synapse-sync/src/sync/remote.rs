use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use synapse_core::{
    AnnotationValue, Entity, EntityHeader, EntityKind, MultipartUploadRequest, NewFileEntity,
    SynapseClient, SynapseError,
};
use thiserror::Error;
use tokio::io::AsyncReadExt;

use super::paths::checked_name;
use super::transfer::{
    TransferClient, TransferError, bytes_md5, file_md5, keep_both_path, move_file,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity '{0}' does not exist or is not accessible")]
    NotFound(String),
    #[error("api error: {0}")]
    Api(#[from] SynapseError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("entity '{0}' has no downloadable file")]
    NoFileHandle(String),
    #[error("upload of '{path}' failed: {reason}")]
    Upload { path: PathBuf, reason: String },
}

/// Entity as seen by the engine: just enough to classify and name it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub type_descriptor: String,
    pub description: Option<String>,
}

impl From<Entity> for RemoteEntity {
    fn from(entity: Entity) -> Self {
        Self {
            kind: entity.kind(),
            id: entity.id,
            name: entity.name,
            type_descriptor: entity.concrete_type,
            description: entity.description.filter(|d| !d.trim().is_empty()),
        }
    }
}

impl From<EntityHeader> for RemoteEntity {
    fn from(header: EntityHeader) -> Self {
        Self {
            kind: header.kind(),
            id: header.id,
            name: header.name,
            type_descriptor: header.entity_type,
            description: None,
        }
    }
}

/// The remote operations the reconciler depends on.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<RemoteEntity, StoreError>;

    async fn list_children(&self, id: &str) -> Result<Vec<RemoteEntity>, StoreError>;

    async fn find_by_name(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Fetches the file content into `dest_dir`; the store picks the file name
    /// and returns the path it wrote. Existing files in `dest_dir` are never replaced.
    async fn download(&self, id: &str, dest_dir: &Path) -> Result<PathBuf, StoreError>;

    async fn store(
        &self,
        local: &Path,
        parent_id: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<RemoteEntity, StoreError>;
}

pub struct SynapseStore {
    client: SynapseClient,
    transfer: TransferClient,
    staging_root: PathBuf,
    part_size: u64,
}

impl SynapseStore {
    pub fn new(client: SynapseClient, staging_root: PathBuf, part_size: u64) -> Self {
        Self {
            client,
            transfer: TransferClient::new(),
            staging_root,
            part_size: part_size.max(1),
        }
    }

    async fn upload_file_handle(&self, local: &Path, file_name: &str) -> Result<String, StoreError> {
        let size = tokio::fs::metadata(local).await?.len();
        let content_md5 = file_md5(local).await?;
        let request = MultipartUploadRequest::new(file_name, content_md5, size, self.part_size);
        let status = self.client.start_multipart_upload(&request).await?;
        let upload_failed = |reason: String| StoreError::Upload {
            path: local.to_path_buf(),
            reason,
        };

        if !status.is_completed() {
            let part_count = size.div_ceil(self.part_size).max(1);
            let part_numbers: Vec<u64> = (1..=part_count).collect();
            let urls = self
                .client
                .get_part_upload_urls(&status.upload_id, &part_numbers)
                .await?;

            let mut file = tokio::fs::File::open(local).await?;
            for part_number in part_numbers {
                let presigned = urls
                    .iter()
                    .find(|u| u.part_number == part_number)
                    .ok_or_else(|| upload_failed(format!("no upload url for part {part_number}")))?;
                let remaining = size.saturating_sub((part_number - 1) * self.part_size);
                let len = remaining.min(self.part_size) as usize;
                let mut chunk = vec![0u8; len];
                file.read_exact(&mut chunk).await?;
                let part_md5 = bytes_md5(&chunk);

                self.transfer
                    .upload_part(&presigned.upload_presigned_url, &presigned.signed_headers, chunk)
                    .await?;
                let added = self
                    .client
                    .add_part(&status.upload_id, part_number, &part_md5)
                    .await?;
                if !added.succeeded() {
                    return Err(upload_failed(format!(
                        "part {part_number} rejected: {}",
                        added.error_message.unwrap_or_default()
                    )));
                }
            }
        }

        let completed = if status.is_completed() {
            status
        } else {
            self.client
                .complete_multipart_upload(&status.upload_id)
                .await?
        };
        if !completed.is_completed() {
            return Err(upload_failed(format!(
                "upload ended in state {}",
                completed.state
            )));
        }
        completed
            .result_file_handle_id
            .ok_or_else(|| upload_failed("no file handle returned".to_string()))
    }
}

#[async_trait]
impl RemoteStore for SynapseStore {
    async fn get(&self, id: &str) -> Result<RemoteEntity, StoreError> {
        match self.client.get_entity(id).await {
            Ok(entity) => Ok(entity.into()),
            Err(err) if err.is_not_found() => Err(StoreError::NotFound(id.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_children(&self, id: &str) -> Result<Vec<RemoteEntity>, StoreError> {
        let children = self.client.get_children_all(id).await?;
        Ok(children.into_iter().map(RemoteEntity::from).collect())
    }

    async fn find_by_name(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.client.find_entity_id(name, parent_id).await?)
    }

    async fn download(&self, id: &str, dest_dir: &Path) -> Result<PathBuf, StoreError> {
        let entity = self.client.get_entity(id).await?;
        let handle_id = entity
            .data_file_handle_id
            .ok_or_else(|| StoreError::NoFileHandle(id.to_string()))?;
        let handle = self
            .client
            .get_file_handles(id)
            .await?
            .into_iter()
            .find(|h| h.id == handle_id)
            .ok_or_else(|| StoreError::NoFileHandle(id.to_string()))?;
        let file_name = checked_name(&handle.file_name)
            .map_err(|_| StoreError::NoFileHandle(id.to_string()))?;

        let url = self.client.get_file_download_url(id).await?;
        let staging_dir = self.staging_root.join(&handle.id);
        let staged = staging_dir.join(file_name);
        let fetched = self
            .transfer
            .download_to_path_checked(&url, &staged, handle.content_md5.as_deref())
            .await;
        let output = match fetched {
            Ok(()) => {
                let output = keep_both_path(dest_dir, file_name).await;
                move_file(&staged, &output)
                    .await
                    .map(|()| output)
                    .map_err(StoreError::from)
            }
            Err(err) => Err(StoreError::from(err)),
        };
        if output.is_err() {
            let _ = tokio::fs::remove_file(&staged).await;
        }
        let _ = tokio::fs::remove_dir(&staging_dir).await;
        let output = output?;
        tracing::debug!(id, path = %output.display(), "download stored");
        Ok(output)
    }

    async fn store(
        &self,
        local: &Path,
        parent_id: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<RemoteEntity, StoreError> {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StoreError::Upload {
                path: local.to_path_buf(),
                reason: "path has no file name".to_string(),
            })?;
        let handle_id = self.upload_file_handle(local, &file_name).await?;
        let created = self
            .client
            .create_entity(&NewFileEntity::new(&file_name, parent_id, handle_id))
            .await?;

        if !annotations.is_empty() {
            let mut current = self.client.get_annotations(&created.id).await?;
            for (key, value) in annotations {
                current
                    .annotations
                    .insert(key.clone(), AnnotationValue::string(value.clone()));
            }
            self.client.update_annotations(&current).await?;
        }
        Ok(created.into())
    }
}
