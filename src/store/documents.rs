//! Document schemas
//!
//! One type per file in the store. JSON documents keep unknown top-level
//! fields (`extra`) so hand edits survive a rewrite. `UxConfig` is the
//! exception: it is regenerated wholesale and carries nothing over.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::{FeedbackKind, FeedbackSource, QueryStatus, Theme};

/// The documents that make up the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    Context,
    Feedback,
    Memory,
    UxConfig,
    IdentityQueries,
}

impl DocumentKind {
    /// Every document, in snapshot order
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::Context,
        DocumentKind::Feedback,
        DocumentKind::Memory,
        DocumentKind::UxConfig,
        DocumentKind::IdentityQueries,
    ];

    /// File name inside the base directory
    pub fn file_name(self) -> &'static str {
        match self {
            DocumentKind::Context => "context.json",
            DocumentKind::Feedback => "feedback.json",
            DocumentKind::Memory => "memory.md",
            DocumentKind::UxConfig => "ux_config.json",
            DocumentKind::IdentityQueries => "identity_queries.json",
        }
    }

    /// Key used in API payloads
    pub fn key(self) -> &'static str {
        match self {
            DocumentKind::Context => "context",
            DocumentKind::Feedback => "feedback",
            DocumentKind::Memory => "memory",
            DocumentKind::UxConfig => "ux_config",
            DocumentKind::IdentityQueries => "identity_queries",
        }
    }

    /// Whether the document is JSON (memory notes are markdown)
    pub fn is_json(self) -> bool {
        !matches!(self, DocumentKind::Memory)
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// A JSON document persisted by the store
pub trait Document: Serialize + DeserializeOwned + Default {
    const KIND: DocumentKind;
}

/// Push `item` unless already present, keeping only the newest `max` items
fn push_bounded(list: &mut Vec<String>, item: &str, max: usize) -> bool {
    if list.iter().any(|existing| existing == item) {
        return false;
    }
    list.push(item.to_string());
    if list.len() > max {
        let excess = list.len() - max;
        list.drain(..excess);
    }
    true
}

// ---------------------------------------------------------------------------
// feedback.json
// ---------------------------------------------------------------------------

/// A single feedback note. Never edited after it is appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    pub category: String,
    pub note: String,
    pub source: FeedbackSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Which performance list a pattern belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Fast,
    Slow,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PerformanceNotes {
    #[serde(default)]
    pub fast_patterns: Vec<String>,
    #[serde(default)]
    pub slow_patterns: Vec<String>,
    #[serde(default)]
    pub user_preferences: BTreeMap<String, String>,
}

/// Feedback log plus what the agent has learned from it
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FeedbackDocument {
    #[serde(default)]
    pub project_meta: ProjectMeta,
    #[serde(default)]
    pub feedback_log: Vec<FeedbackEntry>,
    #[serde(default)]
    pub performance_notes: PerformanceNotes,
    #[serde(default)]
    pub insights: BTreeMap<String, Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document for FeedbackDocument {
    const KIND: DocumentKind = DocumentKind::Feedback;
}

impl FeedbackDocument {
    /// Append an entry, dropping the oldest ones beyond `max`
    pub fn append(&mut self, entry: FeedbackEntry, max: usize) {
        self.project_meta.last_updated = Some(entry.timestamp);
        self.feedback_log.push(entry);
        if self.feedback_log.len() > max {
            let excess = self.feedback_log.len() - max;
            self.feedback_log.drain(..excess);
        }
    }

    /// Record an insight under a category. Returns false for duplicates.
    pub fn add_insight(&mut self, category: &str, insight: &str, max: usize, now: DateTime<Utc>) -> bool {
        let list = self.insights.entry(category.to_string()).or_default();
        let added = push_bounded(list, insight, max);
        if added {
            self.project_meta.last_updated = Some(now);
        }
        added
    }

    /// Record a fast or slow performance pattern. Returns false for duplicates.
    pub fn add_performance_pattern(&mut self, kind: PatternKind, pattern: &str, max: usize, now: DateTime<Utc>) -> bool {
        let list = match kind {
            PatternKind::Fast => &mut self.performance_notes.fast_patterns,
            PatternKind::Slow => &mut self.performance_notes.slow_patterns,
        };
        let added = push_bounded(list, pattern, max);
        if added {
            self.project_meta.last_updated = Some(now);
        }
        added
    }

    /// Set a user preference for a category, replacing the previous one
    pub fn set_preference(&mut self, category: &str, preference: &str, now: DateTime<Utc>) {
        self.performance_notes
            .user_preferences
            .insert(category.to_string(), preference.to_string());
        self.project_meta.last_updated = Some(now);
    }
}

// ---------------------------------------------------------------------------
// context.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CurrentContext {
    #[serde(default)]
    pub active_focus: String,
    #[serde(default)]
    pub progress_status: String,
    #[serde(default)]
    pub next_priority: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub decision: String,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WorkingMemory {
    #[serde(default)]
    pub key_files: Vec<String>,
    #[serde(default)]
    pub patterns_learned: Vec<String>,
    #[serde(default)]
    pub workflow_preferences: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    pub task: String,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

/// What the assistant is working on right now
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionContext {
    #[serde(default)]
    pub current_context: CurrentContext,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub working_memory: WorkingMemory,
    #[serde(default)]
    pub recent_completions: Vec<Completion>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document for SessionContext {
    const KIND: DocumentKind = DocumentKind::Context;
}

impl SessionContext {
    /// Replace the focus; status and priority only change when given
    pub fn set_focus(&mut self, focus: &str, status: Option<&str>, priority: Option<&str>, now: DateTime<Utc>) {
        self.current_context.active_focus = focus.to_string();
        if let Some(status) = status {
            self.current_context.progress_status = status.to_string();
        }
        if let Some(priority) = priority {
            self.current_context.next_priority = priority.to_string();
        }
        self.current_context.updated_at = Some(now);
    }

    pub fn record_decision(&mut self, decision: &str, rationale: &str, now: DateTime<Utc>) -> Decision {
        let decision = Decision {
            decision: decision.to_string(),
            rationale: rationale.to_string(),
            timestamp: now,
        };
        self.decisions.push(decision.clone());
        decision
    }

    /// Newest first, keeping at most `max`
    pub fn push_completion(&mut self, completion: Completion, max: usize) {
        self.recent_completions.insert(0, completion);
        self.recent_completions.truncate(max);
    }
}

// ---------------------------------------------------------------------------
// ux_config.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColorSet {
    pub background: String,
    pub panel: String,
    pub text: String,
    pub accent: String,
    pub border: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    #[serde(default)]
    pub settings_button: bool,
    #[serde(default)]
    pub enter_to_submit: bool,
    #[serde(default)]
    pub show_tti: bool,
}

/// Visual parameters derived from a theme
struct ThemeStyle {
    theme: Theme,
    border_radius: &'static str,
    background: &'static str,
    panel: &'static str,
    text: &'static str,
    accent: &'static str,
    border: &'static str,
}

const THEME_STYLES: &[ThemeStyle] = &[
    ThemeStyle {
        theme: Theme::Default,
        border_radius: "8px",
        background: "#0d1117",
        panel: "#161b22",
        text: "#c9d1d9",
        accent: "#58a6ff",
        border: "#30363d",
    },
    ThemeStyle {
        theme: Theme::Zen,
        border_radius: "14px",
        background: "#0a0f0a",
        panel: "#1a251a",
        text: "#d0e0d0",
        accent: "#6b9a6b",
        border: "#2a4a2a",
    },
    ThemeStyle {
        theme: Theme::PaperWhite,
        border_radius: "4px",
        background: "#fefefe",
        panel: "#f8f8f8",
        text: "#2a2a2a",
        accent: "#4a9eff",
        border: "#e0e0e0",
    },
    ThemeStyle {
        theme: Theme::Dark,
        border_radius: "6px",
        background: "#000000",
        panel: "#111111",
        text: "#ffffff",
        accent: "#4a9eff",
        border: "#222222",
    },
];

/// Presentation settings the viewer applies. Produced only by the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UxConfig {
    pub theme: Theme,
    pub border_radius: String,
    pub colors: ColorSet,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_query: Option<String>,
}

impl Default for UxConfig {
    fn default() -> Self {
        Self::for_theme(Theme::Default, FeatureFlags::default())
    }
}

impl Document for UxConfig {
    const KIND: DocumentKind = DocumentKind::UxConfig;
}

impl UxConfig {
    /// Build a config whose colors and radius come from the theme table
    pub fn for_theme(theme: Theme, features: FeatureFlags) -> Self {
        let style = THEME_STYLES
            .iter()
            .find(|s| s.theme == theme)
            .unwrap_or(&THEME_STYLES[0]);

        Self {
            theme,
            border_radius: style.border_radius.to_string(),
            colors: ColorSet {
                background: style.background.to_string(),
                panel: style.panel.to_string(),
                text: style.text.to_string(),
                accent: style.accent.to_string(),
                border: style.border.to_string(),
            },
            features,
            generated_at: None,
            source_query: None,
        }
    }
}

// ---------------------------------------------------------------------------
// identity_queries.json
// ---------------------------------------------------------------------------

/// Feedback waiting for the agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityQuery {
    pub id: String,
    pub raw_text: String,
    #[serde(default)]
    pub trigger: String,
    pub status: QueryStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl IdentityQuery {
    pub fn new(raw_text: &str, trigger: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            raw_text: raw_text.to_string(),
            trigger: trigger.to_string(),
            status: QueryStatus::Pending,
            created_at: now,
            processed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == QueryStatus::Pending
    }

    /// Move pending -> processed. A processed query is never touched again.
    pub fn mark_processed(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = QueryStatus::Processed;
        self.processed_at = Some(now);
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct IdentityQueue {
    #[serde(default)]
    pub queries: Vec<IdentityQuery>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document for IdentityQueue {
    const KIND: DocumentKind = DocumentKind::IdentityQueries;
}

impl IdentityQueue {
    pub fn enqueue(&mut self, query: IdentityQuery) {
        self.queries.push(query);
    }

    /// Pending queries, oldest first
    pub fn pending(&self) -> Vec<IdentityQuery> {
        let mut pending: Vec<IdentityQuery> = self.queries.iter()
            .filter(|q| q.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|q| q.created_at);
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.queries.iter().filter(|q| q.is_pending()).count()
    }

    /// Mark one query processed by id. False if unknown or already processed.
    pub fn mark_processed(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        self.queries.iter_mut()
            .find(|q| q.id == id)
            .map(|q| q.mark_processed(now))
            .unwrap_or(false)
    }

    /// Drop the oldest processed queries beyond `keep`. Pending ones always stay.
    pub fn prune_processed(&mut self, keep: usize) -> usize {
        let processed = self.queries.iter().filter(|q| !q.is_pending()).count();
        if processed <= keep {
            return 0;
        }

        let mut to_drop = processed - keep;
        let mut by_age: Vec<(usize, DateTime<Utc>)> = self.queries.iter()
            .enumerate()
            .filter(|(_, q)| !q.is_pending())
            .map(|(i, q)| (i, q.processed_at.unwrap_or(q.created_at)))
            .collect();
        by_age.sort_by_key(|(_, t)| *t);

        let mut drop_idx: Vec<usize> = Vec::with_capacity(to_drop);
        for (i, _) in by_age {
            if to_drop == 0 {
                break;
            }
            drop_idx.push(i);
            to_drop -= 1;
        }

        let dropped = drop_idx.len();
        let mut idx = 0;
        self.queries.retain(|_| {
            let keep_it = !drop_idx.contains(&idx);
            idx += 1;
            keep_it
        });
        dropped
    }
}

/// Default contents of memory.md
pub const DEFAULT_MEMORY: &str = "# Memory\n\nLong-term notes kept across sessions.\n";
