//! Capability seams between the orchestrator and its collaborators.
//!
//! Agents produce text, test runners execute tests, and file managers
//! persist generated files. Concrete LLM clients and sandboxes live
//! outside this crate.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

use super::extraction::CodeFiles;
use super::testing::TestRunReport;
use crate::trace::FileOperationKind;
use crate::{zlog_debug, Error, Result};

/// Anything that turns a prompt into text.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Name used in traces and error messages.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Stream the response in chunks. Defaults to one chunk from `generate`.
    async fn stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let text = self.generate(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

/// Runs generated tests against generated code.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run_tests(&self, tests: &CodeFiles, implementation: &CodeFiles) -> Result<TestRunReport>;
}

/// Narrow read/write/list access to the generated project.
#[async_trait]
pub trait FileManager: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<String>>;

    /// Write a file, reporting whether it was created or modified.
    async fn write(&self, path: &str, content: &str) -> Result<FileOperationKind>;

    /// All known paths, sorted.
    async fn list(&self) -> Result<Vec<String>>;
}

/// In-memory file manager.
#[derive(Debug, Default)]
pub struct MemoryFileManager {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryFileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> CodeFiles {
        self.files.read().await.clone()
    }
}

#[async_trait]
impl FileManager for MemoryFileManager {
    async fn read(&self, path: &str) -> Result<Option<String>> {
        Ok(self.files.read().await.get(path).cloned())
    }

    async fn write(&self, path: &str, content: &str) -> Result<FileOperationKind> {
        let previous = self
            .files
            .write()
            .await
            .insert(path.to_string(), content.to_string());
        Ok(match previous {
            Some(_) => FileOperationKind::Modify,
            None => FileOperationKind::Create,
        })
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.files.read().await.keys().cloned().collect())
    }
}

/// File manager rooted at a directory on disk.
///
/// Paths are relative to the root; absolute paths and `..` are rejected.
#[derive(Debug, Clone)]
pub struct DiskFileManager {
    root: PathBuf,
}

impl DiskFileManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(Error::Validation(format!("path escapes project root: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileManager for DiskFileManager {
    async fn read(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, content: &str) -> Result<FileOperationKind> {
        let full = self.resolve(path)?;
        let kind = if tokio::fs::try_exists(&full).await? {
            FileOperationKind::Modify
        } else {
            FileOperationKind::Create
        };
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        zlog_debug!("Wrote {} ({} bytes, {})", full.display(), content.len(), kind);
        Ok(kind)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        if !tokio::fs::try_exists(&self.root).await? {
            return Ok(paths);
        }

        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let parts: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    paths.push(parts.join("/"));
                }
            }
        }
        paths.sort();
        Ok(paths)
    }
}
