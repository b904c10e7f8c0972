//! Local file tools: CSV, JSON and directory listing.
//!
//! All three resolve user-supplied paths through a [`FileRoot`]. Without a
//! configured root any path is accepted; with one, relative paths are taken
//! relative to it and anything resolving outside it is refused.

pub mod csv_file;
pub mod file_list;
pub mod json_file;

pub use csv_file::CsvFileTool;
pub use file_list::FileListTool;
pub use json_file::JsonFileTool;

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Path '{path}' is outside the allowed root")]
    OutsideRoot { path: String },

    #[error("Path traversal detected in '{path}'")]
    Traversal { path: String },

    #[error("Failed to resolve path '{path}': {reason}")]
    Unresolvable { path: String, reason: String },
}

/// Optional directory the file tools are confined to.
#[derive(Debug, Clone, Default)]
pub struct FileRoot {
    root: Option<PathBuf>,
}

impl FileRoot {
    /// No confinement.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn confined(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn from_option(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Resolve `path` to the location a tool may touch.
    ///
    /// The target does not have to exist; when it doesn't, its nearest
    /// existing ancestor is canonicalized instead so writes into new
    /// subdirectories still resolve.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PathError> {
        let Some(root) = &self.root else {
            return Ok(PathBuf::from(path));
        };

        let requested = Path::new(path);
        if requested
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(PathError::Traversal { path: path.into() });
        }

        let canonical_root = root.canonicalize().map_err(|e| PathError::Unresolvable {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            canonical_root.join(requested)
        };
        let resolved = canonicalize_existing_prefix(&joined).map_err(|e| {
            PathError::Unresolvable {
                path: path.into(),
                reason: e.to_string(),
            }
        })?;

        if !resolved.starts_with(&canonical_root) {
            return Err(PathError::OutsideRoot { path: path.into() });
        }
        Ok(resolved)
    }
}

/// Canonicalize the longest existing ancestor and re-append the rest.
fn canonicalize_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(path.to_path_buf()),
        }
    }
    let mut resolved = existing.canonicalize()?;
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
