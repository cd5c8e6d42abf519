use crate::domain::pattern::{PatternError, Variables};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid glob {pattern:?}: {message}")]
    Glob { pattern: String, message: String },
    #[error("storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Files found by [`StoragePort::search_files`], in discovery order.
///
/// `paths[i]` was matched with the placeholder values `vars[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovered {
    pub paths: Vec<String>,
    pub vars: Vec<Variables>,
}

impl Discovered {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Variables)> {
        self.paths.iter().zip(self.vars.iter())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoragePort: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Writes `data`, creating parent directories as needed
    async fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), StorageError>;

    async fn delete_file(&self, path: &Path) -> Result<(), StorageError>;

    /// Returns the files matching a glob pattern
    async fn list_files(&self, pattern: &str) -> Result<Vec<PathBuf>, StorageError>;

    async fn file_size(&self, path: &Path) -> Result<u64, StorageError>;

    /// Searches for files matching a placeholder pattern and an optional
    /// extension allow-list, extracting the placeholder values of each match.
    ///
    /// Pattern rules:
    /// - Placeholders are written `{like_this}` and span a whole path segment
    /// - Patterns must not contain empty segments or path traversal attempts
    async fn search_files(
        &self,
        pattern: &str,
        extensions: &[String],
    ) -> Result<Discovered, StorageError>;
}
