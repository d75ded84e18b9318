//! Current-state snapshots served to the viewer
//!
//! The snapshot version is a SHA-256 over the raw bytes and modification
//! time of every document, so any committed write changes it (even one that
//! rewrites identical bytes) and two polls with no write in between get the
//! same payload. Unparseable documents never replace the last good snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::store::{
    ContextStore, Document, DocumentKind, FeedbackDocument, IdentityQueue, SessionContext,
    StoreError, UxConfig, DEFAULT_MEMORY,
};

/// Parsed documents in one snapshot
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SnapshotDocuments {
    pub context: SessionContext,
    pub feedback: FeedbackDocument,
    pub ux_config: UxConfig,
    pub identity_queries: IdentityQueue,
    pub memory: String,
}

/// Everything the viewer needs for one render
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Snapshot {
    pub version: String,
    pub pending_queries: usize,
    pub documents: SnapshotDocuments,
    /// Last-modified time per file, `None` when the file does not exist
    pub modified: BTreeMap<&'static str, Option<DateTime<Utc>>>,
}

/// One document as read from disk
pub struct RawDocument {
    pub kind: DocumentKind,
    pub bytes: Option<Vec<u8>>,
    pub modified: Option<SystemTime>,
}

type RawDocuments = Vec<RawDocument>;

fn read_all(store: &ContextStore) -> Result<RawDocuments, StoreError> {
    DocumentKind::ALL
        .iter()
        .map(|kind| {
            Ok(RawDocument {
                kind: *kind,
                modified: store.modified(*kind),
                bytes: store.read_raw(*kind)?,
            })
        })
        .collect()
}

/// Digest of the raw document set and its modification times
pub fn version_of(raw: &[RawDocument]) -> String {
    let mut hasher = Sha256::new();
    for doc in raw {
        hasher.update(doc.kind.file_name().as_bytes());
        match &doc.bytes {
            Some(bytes) => {
                hasher.update((bytes.len() as u64).to_le_bytes());
                hasher.update(bytes);
            }
            None => hasher.update([0xff]),
        }
        let nanos = doc.modified
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        hasher.update(nanos.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

fn raw_for(raw: &[RawDocument], kind: DocumentKind) -> Option<&[u8]> {
    raw.iter()
        .find(|doc| doc.kind == kind)
        .and_then(|doc| doc.bytes.as_deref())
}

fn parse<D: Document>(store: &ContextStore, raw: &[RawDocument]) -> Result<D, StoreError> {
    match raw_for(raw, D::KIND) {
        Some(bytes) => serde_json::from_slice(bytes).map_err(|source| StoreError::Parse {
            path: store.path(D::KIND),
            source,
        }),
        None => Ok(D::default()),
    }
}

fn build(store: &ContextStore, raw: &[RawDocument], version: String) -> Result<Snapshot, StoreError> {
    let identity_queries: IdentityQueue = parse(store, raw)?;
    let documents = SnapshotDocuments {
        context: parse(store, raw)?,
        feedback: parse(store, raw)?,
        ux_config: parse(store, raw)?,
        memory: raw_for(raw, DocumentKind::Memory)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_else(|| DEFAULT_MEMORY.to_string()),
        identity_queries,
    };

    let modified = raw
        .iter()
        .map(|doc| (doc.kind.file_name(), doc.modified.map(DateTime::<Utc>::from)))
        .collect();

    Ok(Snapshot {
        version,
        pending_queries: documents.identity_queries.pending_count(),
        documents,
        modified,
    })
}

/// Last snapshot served, reused while the documents are unchanged
#[derive(Default)]
pub struct SnapshotCache {
    last: Mutex<Option<Arc<Snapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the current snapshot.
    ///
    /// Unchanged documents return the cached snapshot itself. When a document
    /// cannot be parsed the last good snapshot is returned instead; an error
    /// only surfaces if there is nothing cached yet.
    pub fn current(&self, store: &ContextStore) -> Result<Arc<Snapshot>, StoreError> {
        let cached = self.last.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let raw = match read_all(store) {
            Ok(raw) => raw,
            Err(e) => return fallback(cached, e),
        };
        let version = version_of(&raw);

        if let Some(snapshot) = cached.as_ref() {
            if snapshot.version == version {
                return Ok(snapshot.clone());
            }
        }

        match build(store, &raw, version) {
            Ok(snapshot) => {
                debug!("New snapshot {}", &snapshot.version[..12]);
                let snapshot = Arc::new(snapshot);
                *self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => fallback(cached, e),
        }
    }
}

fn fallback(cached: Option<Arc<Snapshot>>, error: StoreError) -> Result<Arc<Snapshot>, StoreError> {
    match cached {
        Some(snapshot) => {
            warn!("Serving last good snapshot: {}", error);
            Ok(snapshot)
        }
        None => Err(error),
    }
}
