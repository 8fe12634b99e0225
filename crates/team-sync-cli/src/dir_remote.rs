//! Document store backed by a directory of JSON files.
//!
//! Every device pointed at the same directory (a shared or synced folder)
//! sees the same documents. Layout mirrors document paths:
//!
//! ```text
//! {root}/teams/ABC234.json
//! {root}/teams/ABC234/data/roster.json
//! {root}/users/{uid}.json
//! ```

use crate::watcher::{DocumentWatcher, read_document};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use team_sync::remote::{
    self, BatchOp, CollectionPath, DocumentPath, DocumentWatch, RemoteError, RemoteStore,
    WriteBatch, merge_fields,
};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

const EXTENSION: &str = "json";

pub struct DirectoryRemote {
    root: PathBuf,
    debounce: Duration,
    /// Held across the read and write of a merge.
    merge_lock: Mutex<()>,
}

impl DirectoryRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            debounce: Duration::from_millis(200),
            merge_lock: Mutex::new(()),
        }
    }

    /// Debounce period for document watches.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn doc_file(&self, path: &DocumentPath) -> PathBuf {
        self.root.join(format!("{}.{}", path.as_str(), EXTENSION))
    }

    fn collection_dir(&self, collection: &CollectionPath) -> PathBuf {
        self.root.join(collection.as_str())
    }

    async fn read(&self, file: &Path) -> remote::Result<Option<Value>> {
        match fs::read_to_string(file).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| RemoteError::InvalidDocument {
                    path: file.display().to_string(),
                    reason: e.to_string(),
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(file, e)),
        }
    }

    /// Write through a temp file and rename, so readers and watchers never
    /// see a partial document.
    async fn write(&self, file: &Path, doc: &Value) -> remote::Result<()> {
        let parent = file.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp = parent.join(format!(".{}.tmp", name));
        let content = serde_json::to_string_pretty(doc).map_err(|e| RemoteError::InvalidDocument {
            path: file.display().to_string(),
            reason: e.to_string(),
        })?;

        fs::write(&temp, content)
            .await
            .map_err(|e| io_error(&temp, e))?;
        fs::rename(&temp, file)
            .await
            .map_err(|e| io_error(file, e))
    }

    async fn remove(&self, file: &Path) -> remote::Result<()> {
        match fs::remove_file(file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(file, e)),
        }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> RemoteError {
    let message = format!("{}: {}", path.display(), e);
    match e.kind() {
        ErrorKind::PermissionDenied => RemoteError::PermissionDenied(message),
        _ => RemoteError::Unavailable(message),
    }
}

#[async_trait]
impl RemoteStore for DirectoryRemote {
    async fn get(&self, path: &DocumentPath) -> remote::Result<Option<Value>> {
        self.read(&self.doc_file(path)).await
    }

    async fn set(&self, path: &DocumentPath, doc: Value) -> remote::Result<()> {
        self.write(&self.doc_file(path), &doc).await
    }

    async fn merge(&self, path: &DocumentPath, fields: Value) -> remote::Result<()> {
        let file = self.doc_file(path);
        let _guard = self.merge_lock.lock().await;
        let mut doc = self
            .read(&file)
            .await?
            .unwrap_or_else(|| Value::Object(Default::default()));
        merge_fields(&mut doc, fields);
        self.write(&file, &doc).await
    }

    async fn delete(&self, path: &DocumentPath) -> remote::Result<()> {
        self.remove(&self.doc_file(path)).await
    }

    async fn list(&self, collection: &CollectionPath) -> remote::Result<Vec<(String, Value)>> {
        let dir = self.collection_dir(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut docs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            // Skip hidden and temp files
            if name.starts_with('.') {
                continue;
            }
            let Some(id) = name.strip_suffix(&format!(".{}", EXTENSION)) else {
                continue;
            };
            if let Some(doc) = self.read(&path).await? {
                docs.push((id.to_string(), doc));
            }
        }
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(docs)
    }

    async fn commit(&self, batch: WriteBatch) -> remote::Result<()> {
        for op in batch.into_ops() {
            match op {
                BatchOp::Set(path, doc) => self.set(&path, doc).await?,
                BatchOp::Delete(path) => self.delete(&path).await?,
            }
        }
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, doc: Value) -> remote::Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.set(&collection.doc(&id), doc).await?;
        Ok(id)
    }

    async fn watch(&self, path: &DocumentPath) -> remote::Result<DocumentWatch> {
        let file = self.doc_file(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let initial = read_document(&file)?;
        let watcher = DocumentWatcher::new(file, initial, self.debounce)
            .map_err(|e| RemoteError::Unavailable(format!("Failed to watch {}: {}", path, e)))?;
        debug!("Watching {}", path);
        Ok(watcher.boxed())
    }
}
