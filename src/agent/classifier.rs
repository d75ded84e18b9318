//! Keyword classifier: feedback text -> UX configuration patch
//!
//! Matching contract: the text is lowercased and a keyword matches when it
//! occurs at a word start, i.e. at the beginning of the text or right after a
//! non-alphanumeric character. The keyword may run on into a longer word
//! ("dark" matches "darkest"), and multi-word keywords match as phrases.
//! Occurrences inside a word do not count: "settings" does not match "tti"
//! and "center" does not match "enter".
//!
//! Theme rows are in priority order and the first match wins; feature rows
//! are independent and all apply.

use chrono::{DateTime, Utc};

use crate::store::{FeatureFlags, UxConfig};
use crate::types::Theme;

/// Viewer feature toggled by feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureFlag {
    SettingsButton,
    EnterToSubmit,
    ShowTti,
}

impl std::fmt::Display for FeatureFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureFlag::SettingsButton => write!(f, "settings_button"),
            FeatureFlag::EnterToSubmit => write!(f, "enter_to_submit"),
            FeatureFlag::ShowTti => write!(f, "show_tti"),
        }
    }
}

struct ThemeRule {
    theme: Theme,
    keywords: &'static [&'static str],
}

struct FeatureRule {
    flag: FeatureFlag,
    keywords: &'static [&'static str],
}

const THEME_RULES: &[ThemeRule] = &[
    ThemeRule { theme: Theme::Zen, keywords: &["zen", "calm", "peaceful", "soothing"] },
    ThemeRule { theme: Theme::PaperWhite, keywords: &["paper", "white", "light", "bright"] },
    ThemeRule { theme: Theme::Dark, keywords: &["dark", "darker", "black"] },
];

const FEATURE_RULES: &[FeatureRule] = &[
    FeatureRule { flag: FeatureFlag::SettingsButton, keywords: &["settings", "customize", "config"] },
    FeatureRule { flag: FeatureFlag::EnterToSubmit, keywords: &["enter", "return key"] },
    FeatureRule { flag: FeatureFlag::ShowTti, keywords: &["tti", "uptime", "header"] },
];

/// Partial configuration derived from one piece of feedback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UxPatch {
    pub theme: Option<Theme>,
    pub features: Vec<FeatureFlag>,
}

impl UxPatch {
    /// True when the text matched nothing
    pub fn is_empty(&self) -> bool {
        self.theme.is_none() && self.features.is_empty()
    }

    pub fn enables(&self, flag: FeatureFlag) -> bool {
        self.features.contains(&flag)
    }

    /// Human-readable list of what the patch changes
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(theme) = self.theme {
            parts.push(format!("theme={}", theme));
        }
        parts.extend(self.features.iter().map(|f| format!("{}=true", f)));
        parts.join(", ")
    }
}

/// Does any keyword occur in `lower` at the start of a word? `lower` must already be lowercased.
pub(crate) fn matches_any(lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| {
        lower.match_indices(keyword).any(|(idx, _)| {
            lower[..idx]
                .chars()
                .next_back()
                .map_or(true, |prev| !prev.is_alphanumeric())
        })
    })
}

/// Classify feedback text into a UX patch
pub fn classify(text: &str) -> UxPatch {
    let lower = text.to_lowercase();

    let theme = THEME_RULES
        .iter()
        .find(|rule| matches_any(&lower, rule.keywords))
        .map(|rule| rule.theme);

    let features = FEATURE_RULES
        .iter()
        .filter(|rule| matches_any(&lower, rule.keywords))
        .map(|rule| rule.flag)
        .collect();

    UxPatch { theme, features }
}

/// Build a complete new config from the prior one plus a patch.
///
/// The theme comes from the patch when it names one, otherwise from `prior`.
/// Colors and radius are always re-derived from the theme. Feature flags keep
/// their prior values except the ones the patch turns on.
pub fn regenerate(prior: &UxConfig, patch: &UxPatch, source_query: Option<&str>, now: DateTime<Utc>) -> UxConfig {
    let theme = patch.theme.unwrap_or(prior.theme);

    let features = FeatureFlags {
        settings_button: prior.features.settings_button || patch.enables(FeatureFlag::SettingsButton),
        enter_to_submit: prior.features.enter_to_submit || patch.enables(FeatureFlag::EnterToSubmit),
        show_tti: prior.features.show_tti || patch.enables(FeatureFlag::ShowTti),
    };

    let mut config = UxConfig::for_theme(theme, features);
    config.generated_at = Some(now);
    config.source_query = source_query.map(|s| s.to_string());
    config
}
