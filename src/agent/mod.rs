//! Feedback agent - turns queued feedback into UX configuration
//!
//! Polls the identity-query queue on a fixed interval. Each pending query is
//! classified, the UX configuration is regenerated when the text matched,
//! insights are recorded, and the query is marked processed. A store that
//! cannot be read skips the cycle; the queries stay pending for the next one.

pub mod classifier;
pub mod insights;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::store::{ContextStore, IdentityQuery, IdentityQueue, StoreError, UxConfig};

pub use classifier::{classify, regenerate, FeatureFlag, UxPatch};
pub use insights::InsightAction;

/// Result of one agent cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing pending
    Idle,
    /// Pending queries were handled
    Processed { processed: usize, ux_regenerated: usize },
    /// The store could not be read; nothing was consumed
    Skipped(String),
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleOutcome::Idle => write!(f, "Idle"),
            CycleOutcome::Processed { processed, ux_regenerated } => {
                write!(f, "Processed {} quer{} ({} UX regeneration{})",
                    processed,
                    if *processed == 1 { "y" } else { "ies" },
                    ux_regenerated,
                    if *ux_regenerated == 1 { "" } else { "s" })
            }
            CycleOutcome::Skipped(reason) => write!(f, "Skipped: {}", reason),
        }
    }
}

/// The polling feedback agent
pub struct FeedbackAgent {
    store: Arc<ContextStore>,
    poll_interval: Duration,
}

impl FeedbackAgent {
    pub fn new(store: Arc<ContextStore>, config: &AgentConfig) -> Self {
        Self {
            store,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run one cycle over every pending query, oldest first
    pub fn tick(&self) -> CycleOutcome {
        let queue: IdentityQueue = match self.store.load() {
            Ok(queue) => queue,
            Err(e) => {
                warn!("Agent cycle skipped, queue unreadable: {}", e);
                return CycleOutcome::Skipped(e.to_string());
            }
        };

        let pending = queue.pending();
        if pending.is_empty() {
            return CycleOutcome::Idle;
        }

        let mut processed = 0;
        let mut ux_regenerated = 0;

        for query in &pending {
            match self.process(query) {
                Ok(regenerated) => {
                    processed += 1;
                    if regenerated {
                        ux_regenerated += 1;
                    }
                }
                Err(e) => {
                    warn!("Agent cycle stopped at query {}: {}", query.id, e);
                    if processed == 0 {
                        return CycleOutcome::Skipped(e.to_string());
                    }
                    break;
                }
            }
        }

        CycleOutcome::Processed { processed, ux_regenerated }
    }

    /// Handle one query. Returns whether the UX configuration was regenerated.
    fn process(&self, query: &IdentityQuery) -> Result<bool, StoreError> {
        let now = Utc::now();
        let patch = classify(&query.raw_text);

        let regenerated = if patch.is_empty() {
            debug!("Query {} matched no UX keywords", query.id);
            false
        } else {
            let prior: UxConfig = match self.store.load() {
                Ok(prior) => prior,
                // The config is a derived cache; a damaged one is rebuilt from defaults
                Err(e) if e.is_corrupt() => {
                    warn!("Rebuilding unreadable UX config: {}", e);
                    UxConfig::default()
                }
                Err(e) => return Err(e),
            };
            let next = regenerate(&prior, &patch, Some(&query.id), now);
            self.store.save(&next)?;
            info!("UX config regenerated from query {}: {}", query.id, patch.describe());
            true
        };

        let actions = insights::analyze(&query.raw_text, !patch.is_empty());
        if let Err(e) = insights::apply(&self.store, &actions, now) {
            warn!("Could not record insights for query {}: {}", query.id, e);
        }

        let keep = self.store.limits().max_processed_queries;
        let marked = self.store.update(|queue: &mut IdentityQueue| {
            let marked = queue.mark_processed(&query.id, now);
            queue.prune_processed(keep);
            marked
        })?;

        if marked {
            info!("Processed query {}: '{}'", query.id, truncate(&query.raw_text, 50));
        } else {
            debug!("Query {} was already processed", query.id);
        }
        Ok(regenerated)
    }

    /// Poll until the shutdown signal fires
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Feedback agent started (poll: {}ms, store: {})",
            self.poll_interval.as_millis(),
            self.store.base_dir().display());

        loop {
            match self.tick() {
                CycleOutcome::Idle => {}
                outcome @ CycleOutcome::Processed { .. } => info!("Agent: {}", outcome),
                outcome @ CycleOutcome::Skipped(_) => debug!("Agent: {}", outcome),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown_rx.recv() => {
                    info!("Feedback agent shutting down");
                    break;
                }
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeedbackKind, FeedbackSource, Theme};
    use crate::updater;

    fn agent() -> (tempfile::TempDir, Arc<ContextStore>, FeedbackAgent) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ContextStore::open(dir.path()).unwrap());
        store.init().unwrap();
        let agent = FeedbackAgent::new(store.clone(), &AgentConfig::default());
        (dir, store, agent)
    }

    #[test]
    fn test_idle_when_nothing_pending() {
        let (_dir, _store, agent) = agent();
        assert_eq!(agent.tick(), CycleOutcome::Idle);
    }

    #[test]
    fn test_processes_in_order_and_marks() {
        let (_dir, store, agent) = agent();
        updater::add_feedback(&store, "zen please", FeedbackKind::Preference, None, FeedbackSource::Auto).unwrap();
        updater::add_feedback(&store, "actually dark", FeedbackKind::Preference, None, FeedbackSource::Auto).unwrap();

        let outcome = agent.tick();
        assert_eq!(outcome, CycleOutcome::Processed { processed: 2, ux_regenerated: 2 });

        // Later query wins
        let ux: UxConfig = store.load().unwrap();
        assert_eq!(ux.theme, Theme::Dark);

        let queue: IdentityQueue = store.load().unwrap();
        assert_eq!(queue.pending_count(), 0);
        assert!(queue.queries.iter().all(|q| q.processed_at.is_some()));

        assert_eq!(agent.tick(), CycleOutcome::Idle);
    }

    #[test]
    fn test_corrupt_queue_skips_cycle() {
        let (_dir, store, agent) = agent();
        std::fs::write(store.path(crate::store::DocumentKind::IdentityQueries), "{oops").unwrap();
        assert!(matches!(agent.tick(), CycleOutcome::Skipped(_)));
    }

    #[test]
    fn test_corrupt_ux_config_is_rebuilt() {
        let (_dir, store, agent) = agent();
        std::fs::write(store.path(crate::store::DocumentKind::UxConfig), "garbage").unwrap();
        updater::add_feedback(&store, "paper white", FeedbackKind::Preference, None, FeedbackSource::Auto).unwrap();

        assert_eq!(agent.tick(), CycleOutcome::Processed { processed: 1, ux_regenerated: 1 });
        let ux: UxConfig = store.load().unwrap();
        assert_eq!(ux.theme, Theme::PaperWhite);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(CycleOutcome::Idle.to_string(), "Idle");
        assert_eq!(
            CycleOutcome::Processed { processed: 1, ux_regenerated: 0 }.to_string(),
            "Processed 1 query (0 UX regenerations)"
        );
        assert_eq!(CycleOutcome::Skipped("x".into()).to_string(), "Skipped: x");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_dir, store, _agent) = agent();
        let agent = FeedbackAgent::new(store.clone(), &AgentConfig { poll_interval_ms: 20 });
        updater::add_feedback(&store, "settings button", FeedbackKind::Preference, None, FeedbackSource::Auto).unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { agent.run(rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        let ux: UxConfig = store.load().unwrap();
        assert!(ux.features.settings_button);
    }
}
