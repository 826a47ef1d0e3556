//! Crawl orchestration: work items in, one result per item out.

pub mod driver;
pub mod pool;
pub mod resolve;

use crate::extraction::ExtractedRecord;
use serde::{Deserialize, Serialize};

/// The next target to visit: a page URL or a company name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Position in the input (0-based).
    pub index: usize,
    pub target: String,
}

impl WorkItem {
    pub fn new(index: usize, target: impl Into<String>) -> Self {
        Self {
            index,
            target: target.into(),
        }
    }

    /// Items for a list of targets, numbered from zero.
    pub fn from_targets<I, S>(targets: I) -> Vec<WorkItem>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        targets
            .into_iter()
            .enumerate()
            .map(|(i, t)| WorkItem::new(i, t))
            .collect()
    }
}

/// Why an item produced no record after all local recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("navigation kept failing: {last_error}")]
    NavigationExhausted { last_error: String },

    #[error("access still denied after {rebuilds} context rebuild(s)")]
    BlockExhausted { rebuilds: u32 },

    #[error("browser unavailable: {message}")]
    BrowserUnavailable { message: String },

    #[error("no page found for target")]
    NoLinksResolved,

    #[error("target resolution failed: {message}")]
    ResolutionFailed { message: String },

    #[error("cancelled")]
    Cancelled,
}

/// Terminal per-item outcome once retries are exhausted. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{reason} ({attempts} attempt(s))")]
pub struct ItemFailure {
    pub reason: FailureReason,
    pub attempts: u32,
}

impl ItemFailure {
    pub fn new(reason: FailureReason, attempts: u32) -> Self {
        Self { reason, attempts }
    }

    pub fn cancelled(attempts: u32) -> Self {
        Self::new(FailureReason::Cancelled, attempts)
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason == FailureReason::Cancelled
    }
}

/// The outcome for one work item (or one resolved link of it).
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    /// Index of the originating work item.
    pub index: usize,
    pub target: String,
    /// Page that was visited, when one was resolved.
    pub link: Option<String>,
    pub outcome: Result<ExtractedRecord, ItemFailure>,
}

impl CrawlResult {
    pub fn extracted(item: &WorkItem, link: &str, record: ExtractedRecord) -> Self {
        Self {
            index: item.index,
            target: item.target.clone(),
            link: Some(link.to_string()),
            outcome: Ok(record),
        }
    }

    pub fn failed(item: &WorkItem, link: Option<&str>, failure: ItemFailure) -> Self {
        Self {
            index: item.index,
            target: item.target.clone(),
            link: link.map(str::to_string),
            outcome: Err(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn record(&self) -> Option<&ExtractedRecord> {
        self.outcome.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&ItemFailure> {
        self.outcome.as_ref().err()
    }
}
