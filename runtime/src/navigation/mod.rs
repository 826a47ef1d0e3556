//! Navigation with anti-bot detection and recovery.
//!
//! After every navigation the page is classified into a [`PageState`] by
//! reading whichever of three competing selectors resolves first. The
//! [`BrowserContextManager`] drives the recovery state machine on top of it.

pub mod manager;

pub use manager::{BrowserContextManager, RecoveryPolicy, StablePage};

use crate::profile::DetectionProfile;
use crate::renderer::SelectorHit;
use serde::Serialize;

/// Outcome of one navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PageState {
    /// The content marker resolved.
    Stable,
    /// The interactive anti-bot check is showing.
    ChallengePresented,
    /// Hard denial; this browsing context is burned.
    Blocked,
    /// Transport failure, timeout, or an unrecognized page.
    Error(String),
}

impl PageState {
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable)
    }
}

/// Classify the first selector hit against the known anti-bot phrases.
///
/// `hit.index` refers to [`DetectionProfile::selectors`] order: challenge,
/// content, denial.
pub fn classify(hit: Option<&SelectorHit>, detection: &DetectionProfile) -> PageState {
    let Some(hit) = hit else {
        return PageState::Error("no detection selector resolved before timeout".to_string());
    };
    let text = hit.text.trim();
    match hit.index {
        1 => PageState::Stable,
        0 if text == detection.challenge_text => PageState::ChallengePresented,
        2 if text == detection.denial_text => PageState::Blocked,
        0 | 2 => {
            let marker = if hit.index == 0 {
                &detection.challenge_selector
            } else {
                &detection.denial_selector
            };
            tracing::warn!(
                selector = %marker,
                text = %text,
                "unrecognized anti-bot page text"
            );
            PageState::Error(format!("unrecognized text under {marker}: {text:?}"))
        }
        other => PageState::Error(format!("selector index {other} out of range")),
    }
}
