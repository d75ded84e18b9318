//! Shared types used across modules
//!
//! Small enums that show up in several documents and in the CLI, kept here
//! to avoid circular dependencies between `store`, `agent` and `server`.

use serde::{Deserialize, Serialize};

/// What kind of observation a feedback entry records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Preference,
    Performance,
    #[default]
    Insight,
}

impl FeedbackKind {
    /// Parse from the lowercase wire name
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "preference" => Some(FeedbackKind::Preference),
            "performance" => Some(FeedbackKind::Performance),
            "insight" => Some(FeedbackKind::Insight),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackKind::Preference => write!(f, "preference"),
            FeedbackKind::Performance => write!(f, "performance"),
            FeedbackKind::Insight => write!(f, "insight"),
        }
    }
}

impl std::str::FromStr for FeedbackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            format!("unknown feedback kind '{}' (expected preference, performance or insight)", s)
        })
    }
}

/// Where a feedback entry came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    /// Typed on the command line
    #[default]
    Manual,
    /// Submitted through the viewer and queued for the agent
    Auto,
    /// Derived by the agent while classifying other feedback
    PatternAnalysis,
}

impl std::fmt::Display for FeedbackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackSource::Manual => write!(f, "manual"),
            FeedbackSource::Auto => write!(f, "auto"),
            FeedbackSource::PatternAnalysis => write!(f, "pattern_analysis"),
        }
    }
}

/// Lifecycle of an identity query. The only transition is pending -> processed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    #[default]
    Pending,
    Processed,
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryStatus::Pending => write!(f, "pending"),
            QueryStatus::Processed => write!(f, "processed"),
        }
    }
}

/// Viewer theme
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Default,
    Zen,
    PaperWhite,
    Dark,
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Default => write!(f, "default"),
            Theme::Zen => write!(f, "zen"),
            Theme::PaperWhite => write!(f, "paper_white"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}
