//! RemoteStore trait for the shared cloud document store.
//!
//! The store is document-oriented: documents are JSON objects addressed by
//! slash-separated paths that alternate collection and document ids
//! (`teams/ABC234/data/roster`).
//!
//! Implementations:
//! - `InMemoryRemote` - For testing, with failure injection
//! - `DirectoryRemote` (in team-sync-cli) - JSON files under a shared directory

use async_trait::async_trait;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid document at {path}: {reason}")]
    InvalidDocument { path: String, reason: String },

    #[error("Remote store error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Path to a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath(String);

/// Path to a collection of documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into().trim_matches('/').to_string())
    }

    /// Path of the document `id` inside this collection.
    pub fn doc(&self, id: &str) -> DocumentPath {
        DocumentPath(format!("{}/{}", self.0, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DocumentPath {
    /// Path of the sub-collection `name` under this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}", self.0, name))
    }

    /// The last path segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The collection holding this document.
    pub fn parent(&self) -> CollectionPath {
        match self.0.rfind('/') {
            Some(pos) => CollectionPath(self.0[..pos].to_string()),
            None => CollectionPath(String::new()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DocumentPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single operation inside a `WriteBatch`.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Set(DocumentPath, Value),
    Delete(DocumentPath),
}

/// Multi-document write committed in one call.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocumentPath, doc: Value) -> &mut Self {
        self.ops.push(BatchOp::Set(path, doc));
        self
    }

    pub fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.ops.push(BatchOp::Delete(path));
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Live view of one document.
///
/// Yields the current value immediately, then every later value, until the
/// stream is dropped. `None` means the document does not exist.
pub type DocumentWatch = BoxStream<'static, Result<Option<Value>>>;

/// Document store shared by every device on a team.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read a document, `None` if it does not exist.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Value>>;

    /// Create or fully replace a document.
    async fn set(&self, path: &DocumentPath, doc: Value) -> Result<()>;

    /// Shallow-merge top-level fields into a document, creating it if needed.
    async fn merge(&self, path: &DocumentPath, fields: Value) -> Result<()>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete(&self, path: &DocumentPath) -> Result<()>;

    /// List the documents directly inside a collection as `(id, document)`.
    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Value)>>;

    /// Apply every operation of a batch.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Append a document with a generated id, returning the id.
    async fn add(&self, collection: &CollectionPath, doc: Value) -> Result<String>;

    /// Watch a document for changes.
    async fn watch(&self, path: &DocumentPath) -> Result<DocumentWatch>;
}

/// Shallow merge of `fields` into `target`. Non-object inputs replace.
pub fn merge_fields(target: &mut Value, fields: Value) {
    match (target.as_object_mut(), fields) {
        (Some(existing), Value::Object(incoming)) => {
            for (k, v) in incoming {
                existing.insert(k, v);
            }
        }
        (_, fields) => *target = fields,
    }
}

type Watcher = UnboundedSender<Result<Option<Value>>>;

/// In-memory document store for testing
#[derive(Default)]
pub struct InMemoryRemote {
    docs: RwLock<BTreeMap<String, Value>>,
    watchers: Mutex<HashMap<String, Vec<Watcher>>>,
    offline: AtomicBool,
    next_id: AtomicUsize,
    /// Number of mutating calls that succeeded (set/merge/delete/commit/add).
    writes: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) connectivity. While offline every call fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful mutating calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Read a document without going through the async API.
    pub fn snapshot(&self, path: &str) -> Option<Value> {
        self.docs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    /// Write a document as if another device had, bypassing offline mode.
    pub fn seed(&self, path: &str, doc: Value) {
        self.put(path, Some(doc));
    }

    /// Deliver a transport error to every watcher of `path`.
    pub fn inject_watch_error(&self, path: &str, error: RemoteError) {
        self.notify(path, Err(error));
    }

    /// Number of live watchers on `path`.
    pub fn watcher_count(&self, path: &str) -> usize {
        let mut watchers = self.watchers.lock().unwrap_or_else(|e| e.into_inner());
        match watchers.get_mut(path) {
            Some(list) => {
                list.retain(|tx| !tx.is_closed());
                list.len()
            }
            None => 0,
        }
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable("offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn put(&self, path: &str, doc: Option<Value>) {
        {
            let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
            match &doc {
                Some(value) => docs.insert(path.to_string(), value.clone()),
                None => docs.remove(path),
            };
        }
        self.notify(path, Ok(doc));
    }

    fn notify(&self, path: &str, event: Result<Option<Value>>) {
        let mut watchers = self.watchers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = watchers.get_mut(path) {
            // Dropped receivers fail to send and are pruned here
            list.retain(|tx| tx.unbounded_send(event.clone()).is_ok());
        }
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Value>> {
        self.check_online()?;
        Ok(self.snapshot(path.as_str()))
    }

    async fn set(&self, path: &DocumentPath, doc: Value) -> Result<()> {
        self.check_online()?;
        self.put(path.as_str(), Some(doc));
        self.record_write();
        Ok(())
    }

    async fn merge(&self, path: &DocumentPath, fields: Value) -> Result<()> {
        self.check_online()?;
        let doc = {
            let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
            let doc = docs
                .entry(path.as_str().to_string())
                .or_insert_with(|| Value::Object(Default::default()));
            merge_fields(doc, fields);
            doc.clone()
        };
        self.notify(path.as_str(), Ok(Some(doc)));
        self.record_write();
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        self.check_online()?;
        self.put(path.as_str(), None);
        self.record_write();
        Ok(())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Value)>> {
        self.check_online()?;
        let prefix = format!("{}/", collection.as_str());
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        Ok(docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, doc)| {
                let id = &path[prefix.len()..];
                (!id.contains('/')).then(|| (id.to_string(), doc.clone()))
            })
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.check_online()?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Set(path, doc) => self.put(path.as_str(), Some(doc)),
                BatchOp::Delete(path) => self.put(path.as_str(), None),
            }
        }
        self.record_write();
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, doc: Value) -> Result<String> {
        self.check_online()?;
        let id = format!("evt-{:06}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.put(collection.doc(&id).as_str(), Some(doc));
        self.record_write();
        Ok(id)
    }

    async fn watch(&self, path: &DocumentPath) -> Result<DocumentWatch> {
        self.check_online()?;
        let (tx, rx) = unbounded();
        // Current value first, like a snapshot listener
        let current = self.snapshot(path.as_str());
        let _ = tx.unbounded_send(Ok(current));
        self.watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(path.as_str().to_string())
            .or_default()
            .push(tx);
        Ok(rx.boxed())
    }
}

// Implement RemoteStore for Arc<T> where T: RemoteStore
// This allows several engines (devices) to share one remote in tests
#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<T> {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Value>> {
        (**self).get(path).await
    }

    async fn set(&self, path: &DocumentPath, doc: Value) -> Result<()> {
        (**self).set(path, doc).await
    }

    async fn merge(&self, path: &DocumentPath, fields: Value) -> Result<()> {
        (**self).merge(path, fields).await
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        (**self).delete(path).await
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Value)>> {
        (**self).list(collection).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        (**self).commit(batch).await
    }

    async fn add(&self, collection: &CollectionPath, doc: Value) -> Result<String> {
        (**self).add(collection, doc).await
    }

    async fn watch(&self, path: &DocumentPath) -> Result<DocumentWatch> {
        (**self).watch(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> DocumentPath {
        let (collection, id) = p.rsplit_once('/').unwrap();
        CollectionPath::new(collection).doc(id)
    }

    #[test]
    fn test_path_helpers() {
        let team = CollectionPath::new("teams").doc("ABC234");
        let roster = team.collection("data").doc("roster");
        assert_eq!(roster.as_str(), "teams/ABC234/data/roster");
        assert_eq!(roster.id(), "roster");
        assert_eq!(roster.parent().as_str(), "teams/ABC234/data");
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let remote = InMemoryRemote::new();
        let p = path("teams/ABC234");

        assert!(remote.get(&p).await.unwrap().is_none());
        remote.set(&p, json!({"teamName": "Hawks"})).await.unwrap();
        assert_eq!(remote.get(&p).await.unwrap().unwrap()["teamName"], "Hawks");

        remote.delete(&p).await.unwrap();
        assert!(remote.get(&p).await.unwrap().is_none());
        assert_eq!(remote.write_count(), 2);
    }

    #[tokio::test]
    async fn test_list_only_direct_children() {
        let remote = InMemoryRemote::new();
        remote.seed("teams/ABC234", json!({}));
        remote.seed("teams/ABC234/data/roster", json!({"items": []}));
        remote.seed("teams/ABC234/data/games", json!({"items": []}));
        remote.seed("teams/ABC235/data/roster", json!({"items": []}));

        let data = remote
            .list(&CollectionPath::new("teams/ABC234/data"))
            .await
            .unwrap();
        let ids: Vec<_> = data.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["games", "roster"]);
    }

    #[tokio::test]
    async fn test_merge_keeps_other_fields() {
        let remote = InMemoryRemote::new();
        let p = path("users/u1");
        remote.merge(&p, json!({"email": "a@b.c"})).await.unwrap();
        remote.merge(&p, json!({"teams": []})).await.unwrap();

        let doc = remote.snapshot("users/u1").unwrap();
        assert_eq!(doc["email"], "a@b.c");
        assert!(doc["teams"].is_array());
    }

    #[tokio::test]
    async fn test_watch_delivers_current_then_changes() {
        let remote = InMemoryRemote::new();
        let p = path("teams/ABC234/data/roster");
        remote.seed(p.as_str(), json!({"items": [1]}));

        let mut watch = remote.watch(&p).await.unwrap();
        let first = watch.next().await.unwrap().unwrap().unwrap();
        assert_eq!(first["items"], json!([1]));

        remote.set(&p, json!({"items": [2]})).await.unwrap();
        let second = watch.next().await.unwrap().unwrap().unwrap();
        assert_eq!(second["items"], json!([2]));

        remote.delete(&p).await.unwrap();
        assert!(watch.next().await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_watch_is_pruned() {
        let remote = InMemoryRemote::new();
        let p = path("teams/ABC234/data/games");
        let watch = remote.watch(&p).await.unwrap();
        assert_eq!(remote.watcher_count(p.as_str()), 1);

        drop(watch);
        assert_eq!(remote.watcher_count(p.as_str()), 0);
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let remote = InMemoryRemote::new();
        remote.set_offline(true);
        let p = path("teams/ABC234");
        assert!(matches!(
            remote.get(&p).await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(remote.set(&p, json!({})).await.is_err());
        assert!(remote.watch(&p).await.is_err());
        assert_eq!(remote.write_count(), 0);
    }
}
