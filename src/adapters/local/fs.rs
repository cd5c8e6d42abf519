use crate::domain::pattern::{base_name, CompiledPattern, Variables};
use crate::ports::storage::{Discovered, StorageError, StoragePort};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Local filesystem storage.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsAdapter;

impl FsAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StoragePort for FsAdapter {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        tokio::fs::write(path, data)
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn delete_file(&self, path: &Path) -> Result<(), StorageError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn list_files(&self, pattern: &str) -> Result<Vec<PathBuf>, StorageError> {
        let pattern = pattern.to_string();
        tokio::task::spawn_blocking(move || {
            let entries = glob::glob(&pattern).map_err(|e| StorageError::Glob {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            entries
                .map(|entry| {
                    entry.map_err(|e| {
                        let path = e.path().to_path_buf();
                        StorageError::io(path, e.into_error())
                    })
                })
                .collect()
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    async fn file_size(&self, path: &Path) -> Result<u64, StorageError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        Ok(meta.len())
    }

    async fn search_files(
        &self,
        pattern: &str,
        extensions: &[String],
    ) -> Result<Discovered, StorageError> {
        // Fail fast on a bad pattern without touching the filesystem.
        let compiled = CompiledPattern::compile(pattern)?;
        let extensions: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();

        tokio::task::spawn_blocking(move || {
            let result = search(&compiled, &extensions);
            if let Err(e) = &result {
                warn!(pattern = compiled.as_str(), error = %e, "Error searching files");
            }
            result
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

/// Depth-first walk from the pattern's literal root, in file name order.
///
/// Directories holding more separators than the pattern are pruned. Any
/// traversal error aborts the whole search.
pub fn search(pattern: &CompiledPattern, extensions: &[String]) -> Result<Discovered, StorageError> {
    let root = pattern.walk_root();
    std::fs::metadata(root).map_err(|e| StorageError::io(root, e))?;

    let max_depth = pattern.max_depth();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !entry.file_type().is_dir() || depth(&normalize(root, entry.path())) <= max_depth);

    let mut found = Discovered::default();
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let path = normalize(root, entry.path());
        if let Some(vars) = select(pattern, extensions, &path) {
            found.paths.push(path);
            found.vars.push(vars);
        }
    }
    Ok(found)
}

fn select(pattern: &CompiledPattern, extensions: &[String], path: &str) -> Option<Variables> {
    debug!(path = %path, depth = depth(path), "Walking");

    let vars = pattern.matches(path)?;
    if pattern.has_filename() && base_name(path) != pattern.file_name() {
        return None;
    }
    if !extensions.is_empty() {
        let ext = extension(path).to_lowercase();
        if !extensions.iter().any(|allowed| *allowed == ext) {
            return None;
        }
    }
    Some(vars)
}

// Forward slashes, without the `./` a walk from `.` prefixes entries with.
fn normalize(root: &str, path: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/");
    if root == "." {
        if let Some(relative) = path.strip_prefix("./") {
            return relative.to_string();
        }
    }
    path
}

fn walk_error(root: &str, err: walkdir::Error) -> StorageError {
    let path = err
        .path()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop detected"));
    StorageError::io(path, source)
}

fn depth(path: &str) -> usize {
    path.matches('/').count()
}

/// Extension of the base name, dot included (`.mp4`), or an empty string.
fn extension(path: &str) -> &str {
    let name = base_name(path);
    match name.rfind('.') {
        Some(idx) => &name[idx..],
        None => "",
    }
}
