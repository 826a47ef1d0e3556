// Copyright 2026 Sitecrawl Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for a crawl run.
//!
//! Only [`CrawlError::Configuration`], [`CrawlError::Authentication`] and
//! [`CrawlError::Input`] abort a run. Navigation trouble is contained per work
//! item and surfaces as an [`ItemFailure`](crate::crawl::ItemFailure) instead.

/// All errors that can escape the crawl core.
#[derive(thiserror::Error, Debug)]
pub enum CrawlError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("invalid input at line {line}: {reason}")]
    Input { line: u64, reason: String },

    #[error("navigation failed: {0}")]
    TransientNavigation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Whether this error must stop the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Authentication(_) | Self::Input { .. }
        )
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientNavigation(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CrawlError::Configuration("no credentials".into()).is_fatal());
        assert!(CrawlError::Authentication("rejected".into()).is_fatal());
        assert!(CrawlError::Input {
            line: 3,
            reason: "two fields".into()
        }
        .is_fatal());
        assert!(!CrawlError::TransientNavigation("timeout".into()).is_fatal());
    }

    #[test]
    fn test_input_error_message_names_line() {
        let e = CrawlError::Input {
            line: 7,
            reason: "expected one field, found 2".into(),
        };
        assert_eq!(
            e.to_string(),
            "invalid input at line 7: expected one field, found 2"
        );
    }
}
