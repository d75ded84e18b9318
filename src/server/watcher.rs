//! Document change monitoring
//!
//! Polls modification times of the store documents and logs what changed.
//! Viewers do not depend on it; they poll `/api/state` themselves.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::store::{ContextStore, DocumentKind};

/// A detected change to one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentChange {
    Created(DocumentKind),
    Modified(DocumentKind),
    Deleted(DocumentKind),
}

impl DocumentChange {
    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentChange::Created(k) | DocumentChange::Modified(k) | DocumentChange::Deleted(k) => *k,
        }
    }
}

impl std::fmt::Display for DocumentChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentChange::Created(k) => write!(f, "Created {}", k),
            DocumentChange::Modified(k) => write!(f, "Modified {}", k),
            DocumentChange::Deleted(k) => write!(f, "Deleted {}", k),
        }
    }
}

/// mtime poller over the store documents
pub struct DocumentWatcher {
    store: Arc<ContextStore>,
    interval: Duration,
    file_times: HashMap<DocumentKind, SystemTime>,
}

impl DocumentWatcher {
    /// Create a watcher, recording the current modification times
    pub fn new(store: Arc<ContextStore>, interval: Duration) -> Self {
        let mut watcher = Self {
            store,
            interval: interval.max(Duration::from_millis(1)),
            file_times: HashMap::new(),
        };
        watcher.check_for_changes();
        watcher
    }

    /// Compare modification times with the last check
    pub fn check_for_changes(&mut self) -> Vec<DocumentChange> {
        let mut changes = Vec::new();

        for kind in DocumentKind::ALL {
            let current = self.store.modified(kind);
            let previous = self.file_times.get(&kind).copied();

            match (previous, current) {
                (None, Some(time)) => {
                    self.file_times.insert(kind, time);
                    changes.push(DocumentChange::Created(kind));
                }
                (Some(prev), Some(time)) if prev != time => {
                    self.file_times.insert(kind, time);
                    changes.push(DocumentChange::Modified(kind));
                }
                (Some(_), None) => {
                    self.file_times.remove(&kind);
                    changes.push(DocumentChange::Deleted(kind));
                }
                _ => {}
            }
        }

        changes
    }

    /// Number of documents currently present
    pub fn tracked(&self) -> usize {
        self.file_times.len()
    }

    /// Poll until the shutdown signal fires
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Watching {} (every {}ms)", self.store.base_dir().display(), self.interval.as_millis());

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    for change in self.check_for_changes() {
                        info!("{}", change);
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("Document watcher shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SessionContext;

    #[test]
    fn test_initial_state_is_not_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ContextStore::open(dir.path()).unwrap());
        store.init().unwrap();

        let mut watcher = DocumentWatcher::new(store, Duration::from_millis(10));
        assert_eq!(watcher.tracked(), DocumentKind::ALL.len());
        assert!(watcher.check_for_changes().is_empty());
    }

    #[test]
    fn test_detects_create_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ContextStore::open(dir.path()).unwrap());
        let mut watcher = DocumentWatcher::new(store.clone(), Duration::from_millis(10));
        assert_eq!(watcher.tracked(), 0);

        store.save(&SessionContext::default()).unwrap();
        assert_eq!(watcher.check_for_changes(), vec![DocumentChange::Created(DocumentKind::Context)]);

        std::fs::remove_file(store.path(DocumentKind::Context)).unwrap();
        let changes = watcher.check_for_changes();
        assert_eq!(changes, vec![DocumentChange::Deleted(DocumentKind::Context)]);
        assert_eq!(changes[0].kind(), DocumentKind::Context);
    }

    #[test]
    fn test_change_display() {
        assert_eq!(DocumentChange::Modified(DocumentKind::UxConfig).to_string(), "Modified ux_config.json");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ContextStore::open(dir.path()).unwrap());
        let watcher = DocumentWatcher::new(store, Duration::from_millis(10));

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(watcher.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
