use serde::{Deserialize, Serialize};

pub const FILE_ENTITY_TYPE: &str = "org.sagebionetworks.repo.model.FileEntity";
pub const FOLDER_TYPE: &str = "org.sagebionetworks.repo.model.Folder";
pub const PROJECT_TYPE: &str = "org.sagebionetworks.repo.model.Project";

/// Coarse shape of a remote entity as far as transfers are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    File,
    Container,
    Unknown,
}

impl EntityKind {
    /// Maps a type descriptor (a full `concreteType` or a short tag such as
    /// `"file"`) onto a kind. File descriptors win over container ones.
    pub fn classify(descriptor: &str) -> Self {
        let descriptor = descriptor.trim();
        if descriptor == FILE_ENTITY_TYPE
            || descriptor.eq_ignore_ascii_case("file")
            || descriptor.contains("FileEntity")
        {
            EntityKind::File
        } else if descriptor == FOLDER_TYPE
            || descriptor == PROJECT_TYPE
            || descriptor.eq_ignore_ascii_case("folder")
            || descriptor.eq_ignore_ascii_case("project")
            || descriptor.contains("Folder")
            || descriptor.contains("Project")
        {
            EntityKind::Container
        } else {
            EntityKind::Unknown
        }
    }

    pub fn is_container(self) -> bool {
        self == EntityKind::Container
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub concrete_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub data_file_handle_id: Option<String>,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        EntityKind::classify(&self.concrete_type)
    }
}

/// Lightweight child record returned by the children listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntityHeader {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub entity_type: String,
}

impl EntityHeader {
    pub fn kind(&self) -> EntityKind {
        EntityKind::classify(&self.entity_type)
    }
}
