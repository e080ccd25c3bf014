use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use synapse_core::EntityKind;

use super::remote::{RemoteEntity, RemoteStore, StoreError};
use super::transfer::keep_both_path;

#[derive(Debug, Clone)]
struct Node {
    entity: RemoteEntity,
    parent: Option<String>,
    content: Vec<u8>,
    download_name: Option<String>,
}

/// In-memory tree standing in for the remote store.
#[derive(Default)]
pub struct FakeStore {
    nodes: Mutex<Vec<Node>>,
    broken_listings: HashSet<String>,
    failing_downloads: HashSet<String>,
    vanishing_downloads: HashSet<String>,
    failing_stores: HashSet<String>,
    failing_lookups: bool,
    pub calls: Mutex<Vec<String>>,
    pub stored: Mutex<Vec<(PathBuf, String, BTreeMap<String, String>)>>,
    next_id: Mutex<u32>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1000),
            ..Self::default()
        }
    }

    fn insert(&self, id: &str, name: &str, kind: EntityKind, parent: Option<&str>, content: &[u8]) {
        let type_descriptor = match kind {
            EntityKind::File => "org.sagebionetworks.repo.model.FileEntity",
            EntityKind::Container => "org.sagebionetworks.repo.model.Folder",
            EntityKind::Unknown => "org.sagebionetworks.repo.model.table.TableEntity",
        };
        self.nodes.lock().unwrap().push(Node {
            entity: RemoteEntity {
                id: id.to_string(),
                name: name.to_string(),
                kind,
                type_descriptor: type_descriptor.to_string(),
                description: None,
            },
            parent: parent.map(str::to_string),
            content: content.to_vec(),
            download_name: None,
        });
    }

    pub fn with_folder(self, id: &str, name: &str, parent: Option<&str>) -> Self {
        self.insert(id, name, EntityKind::Container, parent, b"");
        self
    }

    pub fn with_file(self, id: &str, name: &str, parent: Option<&str>, content: &[u8]) -> Self {
        self.insert(id, name, EntityKind::File, parent, content);
        self
    }

    pub fn with_unknown(self, id: &str, name: &str, parent: Option<&str>) -> Self {
        self.insert(id, name, EntityKind::Unknown, parent, b"");
        self
    }

    /// Makes `download` write under a different file name than the entity name.
    pub fn with_download_name(self, id: &str, name: &str) -> Self {
        for node in self.nodes.lock().unwrap().iter_mut() {
            if node.entity.id == id {
                node.download_name = Some(name.to_string());
            }
        }
        self
    }

    pub fn with_broken_listing(mut self, id: &str) -> Self {
        self.broken_listings.insert(id.to_string());
        self
    }

    pub fn with_failing_download(mut self, id: &str) -> Self {
        self.failing_downloads.insert(id.to_string());
        self
    }

    pub fn with_vanishing_download(mut self, id: &str) -> Self {
        self.vanishing_downloads.insert(id.to_string());
        self
    }

    pub fn with_failing_store(mut self, file_name: &str) -> Self {
        self.failing_stores.insert(file_name.to_string());
        self
    }

    pub fn with_failing_lookup(mut self) -> Self {
        self.failing_lookups = true;
        self
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn node(&self, id: &str) -> Option<Node> {
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.entity.id == id)
            .cloned()
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn get(&self, id: &str) -> Result<RemoteEntity, StoreError> {
        self.log(format!("get:{id}"));
        self.node(id)
            .map(|n| n.entity)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_children(&self, id: &str) -> Result<Vec<RemoteEntity>, StoreError> {
        self.log(format!("list:{id}"));
        if self.broken_listings.contains(id) {
            return Err(StoreError::Io(std::io::Error::other("listing unavailable")));
        }
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.parent.as_deref() == Some(id))
            .map(|n| n.entity.clone())
            .collect())
    }

    async fn find_by_name(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<String>, StoreError> {
        self.log(format!("find:{name}"));
        if self.failing_lookups {
            return Err(StoreError::Io(std::io::Error::other("lookup unavailable")));
        }
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.parent.as_deref() == Some(parent_id) && n.entity.name == name)
            .map(|n| n.entity.id.clone()))
    }

    async fn download(&self, id: &str, dest_dir: &Path) -> Result<PathBuf, StoreError> {
        self.log(format!("download:{id}"));
        if self.failing_downloads.contains(id) {
            return Err(StoreError::NoFileHandle(id.to_string()));
        }
        let node = self
            .node(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let name = node.download_name.unwrap_or(node.entity.name);
        let output = keep_both_path(dest_dir, &name).await;
        if !self.vanishing_downloads.contains(id) {
            std::fs::write(&output, &node.content)?;
        }
        Ok(output)
    }

    async fn store(
        &self,
        local: &Path,
        parent_id: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<RemoteEntity, StoreError> {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.log(format!("store:{name}"));
        if self.failing_stores.contains(&name) {
            return Err(StoreError::Upload {
                path: local.to_path_buf(),
                reason: "storage quota exceeded".to_string(),
            });
        }
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("syn{}", *next)
        };
        let content = std::fs::read(local)?;
        self.insert(&id, &name, EntityKind::File, Some(parent_id), &content);
        self.stored.lock().unwrap().push((
            local.to_path_buf(),
            parent_id.to_string(),
            annotations.clone(),
        ));
        self.node(&id)
            .map(|n| n.entity)
            .ok_or_else(|| StoreError::NotFound(id))
    }
}
