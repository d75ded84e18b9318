//! Insight extraction from feedback text
//!
//! Besides the UX patch, feedback feeds the preference, performance, and
//! insight sections of feedback.json and the recent completions in
//! context.json. Same matching rules as the classifier.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::classifier::matches_any;
use crate::store::{Completion, ContextStore, FeedbackDocument, PatternKind, SessionContext, StoreError};

/// Something the agent records about a piece of feedback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsightAction {
    Preference { category: &'static str, preference: String },
    Performance { kind: PatternKind, pattern: String },
    Insight { category: &'static str, insight: String },
    FocusUpdate { content: String },
}

const UI_KEYWORDS: &[&str] = &["ui", "design", "look", "appearance", "visual"];
const PERFORMANCE_KEYWORDS: &[&str] = &["slow", "fast", "performance", "speed", "lag"];
const SLOW_KEYWORDS: &[&str] = &["slow", "lag", "stuck"];
const ISSUE_KEYWORDS: &[&str] = &["bug", "issue", "problem", "broken", "not working"];
const POSITIVE_KEYWORDS: &[&str] = &["good", "great", "works", "like", "love", "perfect"];
const FOCUS_KEYWORDS: &[&str] = &["focus", "working on", "next", "priority"];

/// Work out what to record for `text`. `ux_matched` says whether the
/// classifier already produced a UX patch for it.
pub fn analyze(text: &str, ux_matched: bool) -> Vec<InsightAction> {
    let lower = text.to_lowercase();
    let mut actions = Vec::new();

    // General UI wording is only a preference when it was not a concrete UX request
    if !ux_matched && matches_any(&lower, UI_KEYWORDS) {
        actions.push(InsightAction::Preference {
            category: "ui_design",
            preference: text.to_string(),
        });
    }

    if matches_any(&lower, PERFORMANCE_KEYWORDS) || matches_any(&lower, SLOW_KEYWORDS) {
        let kind = if matches_any(&lower, SLOW_KEYWORDS) { PatternKind::Slow } else { PatternKind::Fast };
        actions.push(InsightAction::Performance { kind, pattern: text.to_string() });
    }

    if matches_any(&lower, ISSUE_KEYWORDS) {
        actions.push(InsightAction::Insight {
            category: "areas_for_improvement",
            insight: text.to_string(),
        });
    }

    if matches_any(&lower, POSITIVE_KEYWORDS) {
        actions.push(InsightAction::Insight {
            category: "successful_patterns",
            insight: text.to_string(),
        });
    }

    if matches_any(&lower, FOCUS_KEYWORDS) {
        actions.push(InsightAction::FocusUpdate { content: text.to_string() });
    }

    if actions.is_empty() && !ux_matched {
        actions.push(InsightAction::Insight {
            category: "general_feedback",
            insight: text.to_string(),
        });
    }

    actions
}

/// Write the actions to the store. Returns how many changed a document.
pub fn apply(store: &ContextStore, actions: &[InsightAction], now: DateTime<Utc>) -> Result<usize, StoreError> {
    let limits = *store.limits();
    let mut changed = 0;

    let has_feedback_actions = actions.iter().any(|a| !matches!(a, InsightAction::FocusUpdate { .. }));
    if has_feedback_actions {
        changed += store.update(|doc: &mut FeedbackDocument| {
            let mut n = 0;
            for action in actions {
                let applied = match action {
                    InsightAction::Preference { category, preference } => {
                        doc.set_preference(category, preference, now);
                        true
                    }
                    InsightAction::Performance { kind, pattern } => {
                        doc.add_performance_pattern(*kind, pattern, limits.max_insights, now)
                    }
                    InsightAction::Insight { category, insight } => {
                        doc.add_insight(category, insight, limits.max_insights, now)
                    }
                    InsightAction::FocusUpdate { .. } => false,
                };
                if applied {
                    n += 1;
                }
            }
            n
        })?;
    }

    for action in actions {
        if let InsightAction::FocusUpdate { content } = action {
            store.update(|ctx: &mut SessionContext| {
                ctx.push_completion(Completion {
                    task: format!("User feedback: {}", content),
                    completed_at: now,
                    notes: "Feedback processed by agent".to_string(),
                }, limits.max_recent_completions);
            })?;
            changed += 1;
        }
    }

    debug!("Applied {} insight action(s)", changed);
    Ok(changed)
}
