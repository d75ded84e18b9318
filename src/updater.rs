//! Manual context updates
//!
//! The mutations a person makes: adding feedback, moving the focus,
//! recording decisions and memory notes. Both the CLI and the viewer's HTTP
//! endpoints go through these functions.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::store::{ContextStore, Decision, FeedbackDocument, FeedbackEntry, IdentityQuery, IdentityQueue, SessionContext};
use crate::types::{FeedbackKind, FeedbackSource};

/// Trigger recorded on queries created from submitted feedback
pub const FEEDBACK_TRIGGER: &str = "feedback_submitted";

/// Category used when the caller gives none
pub const DEFAULT_CATEGORY: &str = "user_input";

/// Result of a feedback submission
#[derive(Debug, Clone)]
pub struct SubmittedFeedback {
    pub entry: FeedbackEntry,
    pub query: IdentityQuery,
}

/// Append a feedback entry and queue it for the agent.
///
/// When the query cannot be queued the entry is taken back out of the log,
/// so a failed call can be retried without duplicating it.
pub fn add_feedback(
    store: &ContextStore,
    note: &str,
    kind: FeedbackKind,
    category: Option<&str>,
    source: FeedbackSource,
) -> Result<SubmittedFeedback> {
    let note = note.trim();
    if note.is_empty() {
        anyhow::bail!("Feedback note is empty");
    }

    let now = Utc::now();
    let entry = FeedbackEntry {
        timestamp: now,
        kind,
        category: category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string(),
        note: note.to_string(),
        source,
    };

    let max = store.limits().max_feedback_entries;
    store.update(|doc: &mut FeedbackDocument| doc.append(entry.clone(), max))
        .context("Failed to append feedback entry")?;

    // The queue write is the commit point: without a query the entry is removed again
    let query = IdentityQuery::new(note, FEEDBACK_TRIGGER, now);
    if let Err(e) = store.update(|queue: &mut IdentityQueue| queue.enqueue(query.clone())) {
        if let Err(undo) = store.update(|doc: &mut FeedbackDocument| doc.feedback_log.retain(|logged| logged != &entry)) {
            warn!("Could not remove unqueued feedback entry: {}", undo);
        }
        return Err(anyhow::Error::new(e).context("Failed to queue feedback for the agent"));
    }

    info!("Queued feedback {} ({} / {})", query.id, entry.kind, entry.category);
    Ok(SubmittedFeedback { entry, query })
}

/// Update the focus fields of the session context
pub fn update_focus(
    store: &ContextStore,
    focus: &str,
    status: Option<&str>,
    priority: Option<&str>,
) -> Result<SessionContext> {
    let focus = focus.trim();
    if focus.is_empty() {
        anyhow::bail!("Focus is empty");
    }

    let now = Utc::now();
    let context = store
        .update(|ctx: &mut SessionContext| {
            ctx.set_focus(focus, status.map(str::trim), priority.map(str::trim), now);
            ctx.clone()
        })
        .context("Failed to update session context")?;

    info!("Focus set to '{}'", focus);
    Ok(context)
}

/// Append a decision with its rationale
pub fn record_decision(store: &ContextStore, decision: &str, rationale: &str) -> Result<Decision> {
    if decision.trim().is_empty() {
        anyhow::bail!("Decision is empty");
    }

    let now = Utc::now();
    let recorded = store
        .update(|ctx: &mut SessionContext| ctx.record_decision(decision.trim(), rationale.trim(), now))
        .context("Failed to record decision")?;

    info!("Recorded decision '{}'", recorded.decision);
    Ok(recorded)
}

/// Append a note to the long-term memory file
pub fn remember(store: &ContextStore, note: &str) -> Result<()> {
    if note.trim().is_empty() {
        anyhow::bail!("Memory note is empty");
    }
    store.append_memory(note).context("Failed to append memory note")?;
    Ok(())
}
