use std::collections::HashSet;
use std::path::PathBuf;

use synapse_core::EntityKind;

use super::paths::checked_name;
use super::remote::RemoteStore;

/// A file discovered under a container, with the local path it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub remote_id: String,
    pub save_path: PathBuf,
}

/// Lists every file below `container_id`, mirroring the remote folder layout
/// under `base_path`. Uses an explicit worklist, so depth is unbounded.
///
/// A container whose children cannot be listed is logged and contributes
/// nothing; the walk continues with the rest of the tree.
pub async fn walk<S>(store: &S, container_id: &str, base_path: PathBuf) -> Vec<PlannedFile>
where
    S: RemoteStore + ?Sized,
{
    let mut files = Vec::new();
    let mut visited = HashSet::new();
    let mut pending = vec![(container_id.to_string(), base_path)];

    while let Some((id, dir)) = pending.pop() {
        if !visited.insert(id.clone()) {
            tracing::warn!(id = %id, "container already visited, skipping");
            continue;
        }
        let children = match store.list_children(&id).await {
            Ok(children) => children,
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "could not list children");
                continue;
            }
        };
        for child in children {
            let name = match checked_name(&child.name) {
                Ok(name) => name,
                Err(err) => {
                    tracing::warn!(id = %child.id, error = %err, "skipping child with unusable name");
                    continue;
                }
            };
            match child.kind {
                EntityKind::File => files.push(PlannedFile {
                    save_path: dir.join(name),
                    remote_id: child.id,
                }),
                EntityKind::Container => pending.push((child.id.clone(), dir.join(name))),
                EntityKind::Unknown => {
                    tracing::debug!(id = %child.id, kind = %child.type_descriptor, "ignoring child");
                }
            }
        }
    }
    files
}
