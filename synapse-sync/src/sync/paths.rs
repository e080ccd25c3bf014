use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("save path is empty")]
    Empty,
    #[error("entity name '{0}' is not a single path component")]
    InvalidName(String),
    #[error("unable to resolve '{path}': {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Expands a leading `~` or `~/` to the home directory.
pub fn expand_tilde(value: &str) -> PathBuf {
    let Some(home) = dirs::home_dir() else {
        return PathBuf::from(value);
    };
    expand_with_home(value, &home)
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

/// Absolute, symlink-free form of `path`. The longest existing prefix is
/// canonicalised; the components after it are applied lexically.
pub fn resolve(path: &Path) -> Result<PathBuf, PathError> {
    let absolute = absolute(path)?;
    let components: Vec<Component> = absolute.components().collect();
    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        match dunce::canonicalize(&prefix) {
            Ok(canonical) => return Ok(push_lexically(canonical, &components[split..])),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(PathError::Resolve { path: prefix, source }),
        }
    }
    Ok(push_lexically(PathBuf::new(), &components))
}

fn absolute(path: &Path) -> Result<PathBuf, PathError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| PathError::Resolve {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(cwd.join(path))
}

fn push_lexically(mut out: PathBuf, rest: &[Component]) -> PathBuf {
    for component in rest {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves a manifest save path: relative paths hang off `output_root`,
/// absolute ones are used as given.
pub fn resolve_declared(declared: &str, output_root: &Path) -> Result<PathBuf, PathError> {
    let declared = declared.trim();
    if declared.is_empty() {
        return Err(PathError::Empty);
    }
    let expanded = expand_tilde(declared);
    if expanded.is_absolute() {
        resolve(&expanded)
    } else {
        resolve(&output_root.join(expanded))
    }
}

/// Target for a single file. The declared path names the directory the file
/// lands in, unless its last component already is the entity's name, in which
/// case it is taken as the final file path.
pub fn file_target(declared: &str, output_root: &Path, name: &str) -> Result<PathBuf, PathError> {
    let name = checked_name(name)?;
    let dir = resolve_declared(declared, output_root)?;
    if dir.file_name().is_some_and(|last| last == name) {
        return Ok(dir);
    }
    Ok(dir.join(name))
}

/// Root for a container: a folder named after the container inside the declared directory.
pub fn container_root(
    declared: &str,
    output_root: &Path,
    name: &str,
) -> Result<PathBuf, PathError> {
    let parent = resolve_declared(declared, output_root)?;
    Ok(parent.join(checked_name(name)?))
}

/// Upload sources are made absolute and folded lexically. Symlinks are kept,
/// so the manifest's file name is the one published.
pub fn upload_source(local: &Path) -> Result<PathBuf, PathError> {
    if local.as_os_str().is_empty() {
        return Err(PathError::Empty);
    }
    let absolute = absolute(&expand_tilde(&local.to_string_lossy()))?;
    let components: Vec<Component> = absolute.components().collect();
    Ok(push_lexically(PathBuf::new(), &components))
}

/// Remote names are joined under local directories, so they must not climb out.
pub fn checked_name(name: &str) -> Result<&str, PathError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(PathError::InvalidName(name.to_string())),
    }
}
