use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::sync::paths::expand_tilde;

pub const ID_COLUMN: &str = "synapse_id";
pub const SAVE_PATH_COLUMN: &str = "save_path";
pub const FILES_COLUMN: &str = "files";

/// Annotation columns copied onto uploaded entities; anything else in the row is ignored.
pub const ANNOTATION_KEYS: [&str; 4] = ["resourceType", "dataType", "specimenID", "assay"];

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("unable to read CSV file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("CSV file '{0}' has no header row")]
    NoHeader(PathBuf),
    #[error("CSV file '{path}' must contain a '{column}' column")]
    MissingColumn { path: PathBuf, column: &'static str },
}

/// One download work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub remote_id: String,
    pub declared_save_path: String,
    pub extra_fields: BTreeMap<String, String>,
}

/// One upload work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    pub local_path: PathBuf,
    pub extra_fields: BTreeMap<String, String>,
}

impl UploadEntry {
    pub fn annotations(&self) -> BTreeMap<String, String> {
        ANNOTATION_KEYS
            .iter()
            .filter_map(|key| {
                self.extra_fields
                    .get(*key)
                    .filter(|value| !value.is_empty())
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect()
    }
}

pub fn load_download_manifest(path: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let table = read_table(path, &[ID_COLUMN, SAVE_PATH_COLUMN])?;
    Ok(table
        .into_iter()
        .filter_map(|mut row| {
            let remote_id = row.remove(ID_COLUMN).unwrap_or_default();
            if remote_id.is_empty() {
                return None;
            }
            let declared_save_path = row.remove(SAVE_PATH_COLUMN).unwrap_or_default();
            Some(ManifestEntry {
                remote_id,
                declared_save_path,
                extra_fields: row,
            })
        })
        .collect())
}

pub fn load_upload_manifest(path: &Path) -> Result<Vec<UploadEntry>, ManifestError> {
    let table = read_table(path, &[FILES_COLUMN])?;
    Ok(table
        .into_iter()
        .filter_map(|mut row| {
            let file = row.remove(FILES_COLUMN).unwrap_or_default();
            if file.is_empty() {
                return None;
            }
            Some(UploadEntry {
                local_path: expand_tilde(&file),
                extra_fields: row,
            })
        })
        .collect())
}

type Row = BTreeMap<String, String>;

fn read_table(path: &Path, required: &[&'static str]) -> Result<Vec<Row>, ManifestError> {
    let path = expand_tilde(&path.to_string_lossy());
    let read_err = |source| ManifestError::Read {
        path: path.clone(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(&path)
        .map_err(read_err)?;

    let headers = reader.headers().map_err(read_err)?.clone();
    if headers.is_empty() {
        return Err(ManifestError::NoHeader(path));
    }
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(ManifestError::MissingColumn {
                path: path.clone(),
                column,
            });
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(read_err)?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}
