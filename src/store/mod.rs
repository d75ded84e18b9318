//! Context Store - the documents shared by the CLI, the agent and the viewer
//!
//! Every write replaces the whole file atomically (see [`atomic`]), so a
//! poller reading mid-write sees either the previous or the next committed
//! version. Inside one process a per-document lock serializes
//! read-modify-write cycles; across processes the rename is the only
//! discipline.

pub mod atomic;
pub mod documents;

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::config::StoreConfig;

pub use documents::{
    Completion, CurrentContext, Decision, Document, DocumentKind, FeatureFlags,
    FeedbackDocument, FeedbackEntry, IdentityQuery, IdentityQueue, PatternKind,
    SessionContext, UxConfig, DEFAULT_MEMORY,
};

/// Store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not a valid document: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize {kind}: {source}")]
    Serialize {
        kind: DocumentKind,
        source: serde_json::Error,
    },

    #[error("Failed to replace {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True when the document exists but could not be parsed
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Parse { .. })
    }
}

/// Retention limits applied when documents grow
#[derive(Debug, Clone, Copy)]
pub struct StoreLimits {
    pub max_feedback_entries: usize,
    pub max_insights: usize,
    pub max_recent_completions: usize,
    pub max_processed_queries: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        StoreLimits::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for StoreLimits {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_feedback_entries: config.max_feedback_entries,
            max_insights: config.max_insights,
            max_recent_completions: config.max_recent_completions,
            max_processed_queries: config.max_processed_queries,
        }
    }
}

/// File-backed document store
pub struct ContextStore {
    base_dir: PathBuf,
    limits: StoreLimits,
    locks: [Mutex<()>; DocumentKind::ALL.len()],
}

impl ContextStore {
    /// Open (and create if needed) a store rooted at `base_dir`
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)
            .map_err(|e| StoreError::io(&base_dir, e))?;

        Ok(Self {
            base_dir,
            limits: StoreLimits::default(),
            locks: std::array::from_fn(|_| Mutex::new(())),
        })
    }

    /// Open the store described by the configuration
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self::open(&config.base_dir)?.with_limits(StoreLimits::from(config)))
    }

    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn limits(&self) -> &StoreLimits {
        &self.limits
    }

    /// Path of a document inside the store
    pub fn path(&self, kind: DocumentKind) -> PathBuf {
        self.base_dir.join(kind.file_name())
    }

    pub fn exists(&self, kind: DocumentKind) -> bool {
        self.path(kind).exists()
    }

    fn lock(&self, kind: DocumentKind) -> MutexGuard<'_, ()> {
        // A panic in another writer leaves no partial file behind, so a
        // poisoned lock is still safe to take.
        self.locks[kind as usize]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write default documents for any that are missing. Returns what was created.
    pub fn init(&self) -> Result<Vec<DocumentKind>, StoreError> {
        let mut created = Vec::new();

        for kind in DocumentKind::ALL {
            let _guard = self.lock(kind);
            if self.exists(kind) {
                continue;
            }

            let bytes = match kind {
                DocumentKind::Context => to_json_bytes(&SessionContext::default())?,
                DocumentKind::Feedback => {
                    let mut doc = FeedbackDocument::default();
                    doc.project_meta.name = self.project_name();
                    doc.project_meta.last_updated = Some(Utc::now());
                    to_json_bytes(&doc)?
                }
                DocumentKind::Memory => DEFAULT_MEMORY.as_bytes().to_vec(),
                DocumentKind::UxConfig => to_json_bytes(&UxConfig::default())?,
                DocumentKind::IdentityQueries => to_json_bytes(&IdentityQueue::default())?,
            };

            atomic::write_atomic(&self.path(kind), &bytes)?;
            created.push(kind);
        }

        if !created.is_empty() {
            info!("Initialized {} document(s) in {}", created.len(), self.base_dir.display());
        }
        Ok(created)
    }

    fn project_name(&self) -> String {
        std::fs::canonicalize(&self.base_dir)
            .ok()
            .and_then(|p| p.parent().and_then(|parent| parent.file_name()).map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default()
    }

    /// Load a document. A missing file yields the default document.
    pub fn load<D: Document>(&self) -> Result<D, StoreError> {
        let path = self.path(D::KIND);
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| StoreError::Parse { path, source }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(D::default()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Atomically replace a document
    pub fn save<D: Document>(&self, doc: &D) -> Result<(), StoreError> {
        let _guard = self.lock(D::KIND);
        self.save_unlocked(doc)
    }

    fn save_unlocked<D: Document>(&self, doc: &D) -> Result<(), StoreError> {
        let bytes = to_json_bytes(doc)?;
        atomic::write_atomic(&self.path(D::KIND), &bytes)?;
        debug!("Wrote {}", D::KIND);
        Ok(())
    }

    /// Load, mutate and atomically save a document while holding its lock
    pub fn update<D, R, F>(&self, f: F) -> Result<R, StoreError>
    where
        D: Document,
        F: FnOnce(&mut D) -> R,
    {
        let _guard = self.lock(D::KIND);
        let mut doc: D = self.load()?;
        let result = f(&mut doc);
        self.save_unlocked(&doc)?;
        Ok(result)
    }

    /// Read memory.md, or the default text when it does not exist yet
    pub fn read_memory(&self) -> Result<String, StoreError> {
        let path = self.path(DocumentKind::Memory);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DEFAULT_MEMORY.to_string()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Atomically replace memory.md
    pub fn write_memory(&self, text: &str) -> Result<(), StoreError> {
        let _guard = self.lock(DocumentKind::Memory);
        atomic::write_atomic(&self.path(DocumentKind::Memory), text.as_bytes())
    }

    /// Append a timestamped section to memory.md
    pub fn append_memory(&self, note: &str) -> Result<(), StoreError> {
        let _guard = self.lock(DocumentKind::Memory);
        let existing = self.read_memory()?;
        let updated = format!(
            "{}\n\n## [{}]\n\n{}\n",
            existing.trim_end(),
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            note.trim(),
        );
        atomic::write_atomic(&self.path(DocumentKind::Memory), updated.as_bytes())?;
        debug!("Appended memory note");
        Ok(())
    }

    /// Exact bytes on disk, `None` when the document does not exist
    pub fn read_raw(&self, kind: DocumentKind) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path(kind);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Last-modified time of a document, if it exists
    pub fn modified(&self, kind: DocumentKind) -> Option<SystemTime> {
        std::fs::metadata(self.path(kind))
            .and_then(|m| m.modified())
            .ok()
    }
}

fn to_json_bytes<D: Document>(doc: &D) -> Result<Vec<u8>, StoreError> {
    let mut bytes = serde_json::to_vec_pretty(doc)
        .map_err(|source| StoreError::Serialize { kind: D::KIND, source })?;
    bytes.push(b'\n');
    Ok(bytes)
}
