//! Debounced watcher for a single document file.
//!
//! Uses notify-debouncer-mini on the document's directory and re-reads the
//! file whenever an event names it. The resulting stream owns the debouncer,
//! so dropping the stream stops watching.

use futures::channel::mpsc::{UnboundedReceiver, unbounded};
use futures::stream::Stream;
use futures::StreamExt;
use notify::RecursiveMode;
use notify_debouncer_mini::{DebouncedEvent, Debouncer, new_debouncer};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use team_sync::remote::{self, RemoteError};
use tracing::{debug, error};

type Delivery = remote::Result<Option<Value>>;

/// Stream of a document's values.
pub struct DocumentWatcher {
    /// Debouncer handle (must keep alive)
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    rx: UnboundedReceiver<Delivery>,
}

impl DocumentWatcher {
    /// Watch `file`, delivering `initial` first.
    ///
    /// The parent directory must exist.
    pub fn new(file: PathBuf, initial: Option<Value>, debounce: Duration) -> notify::Result<Self> {
        let dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        // Canonicalize so event paths (which are resolved) compare equal
        let dir = dir.canonicalize().unwrap_or(dir);
        let file = match file.file_name() {
            Some(name) => dir.join(name),
            None => file,
        };

        let (tx, rx) = unbounded();
        let _ = tx.unbounded_send(Ok(initial.clone()));

        let watched = file.clone();
        let mut last = initial;
        let mut debouncer = new_debouncer(
            debounce,
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    if !events.iter().any(|e| e.path == watched) {
                        return;
                    }
                    let delivery = read_document(&watched);
                    if let Ok(value) = &delivery {
                        // Unchanged content: spurious event
                        if *value == last {
                            return;
                        }
                        last = value.clone();
                    }
                    debug!("Document changed: {}", watched.display());
                    // Receiver dropped means nobody is listening anymore
                    let _ = tx.unbounded_send(delivery);
                }
                Err(e) => {
                    error!("Document watcher error: {}", e);
                    let _ = tx.unbounded_send(Err(RemoteError::Unavailable(e.to_string())));
                }
            },
        )?;

        debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _debouncer: debouncer,
            rx,
        })
    }
}

impl Stream for DocumentWatcher {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_next_unpin(cx)
    }
}

/// Read a document file. A missing file is an absent document.
pub fn read_document(file: &Path) -> Delivery {
    match fs::read_to_string(file) {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| RemoteError::InvalidDocument {
                path: file.display().to_string(),
                reason: e.to_string(),
            }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RemoteError::Unavailable(format!("{}: {}", file.display(), e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[test]
    fn test_read_document() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("roster.json");
        assert!(read_document(&file).unwrap().is_none());

        fs::write(&file, r#"{"items": [1]}"#).unwrap();
        assert_eq!(read_document(&file).unwrap(), Some(json!({"items": [1]})));

        fs::write(&file, "{").unwrap();
        assert!(matches!(
            read_document(&file),
            Err(RemoteError::InvalidDocument { .. })
        ));
    }

    #[tokio::test]
    async fn test_watcher_delivers_initial_then_change() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("games.json");
        let mut watcher =
            DocumentWatcher::new(file.clone(), None, Duration::from_millis(50)).unwrap();

        let first = watcher.next().await.unwrap().unwrap();
        assert!(first.is_none());

        // Give the OS watcher time to initialize
        tokio::time::sleep(Duration::from_millis(300)).await;
        fs::write(&file, r#"{"items": [2]}"#).unwrap();

        let next = timeout(Duration::from_secs(10), watcher.next())
            .await
            .expect("Timeout waiting for document event")
            .unwrap()
            .unwrap();
        assert_eq!(next, Some(json!({"items": [2]})));
    }
}
