// Copyright 2026 Sitecrawl Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run configuration.
//!
//! Layering, lowest priority first: built-in defaults, an optional JSON file,
//! `SITECRAWL_*` environment variables, then CLI flags (applied by the caller).

use crate::error::{CrawlError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Chrome user agent shared by the HTTP client and the browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/131.0.0.0 Safari/537.36";

/// Tunables for one crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Lower bound of the pause between work items.
    pub min_delay_ms: u64,
    /// Upper bound (inclusive) of the pause between work items.
    pub max_delay_ms: u64,
    /// Budget for a single page navigation.
    pub navigation_timeout_ms: u64,
    /// Budget for a selector to appear after navigation.
    pub selector_timeout_ms: u64,
    /// Budget for launching a browser engine.
    pub launch_timeout_ms: u64,
    /// Re-navigations on the same context after a transport/timeout error.
    pub max_navigation_retries: u32,
    /// Full engine rebuilds after an access-denied page.
    pub max_context_rebuilds: u32,
    /// First backoff step between navigation retries; doubles each time.
    pub retry_backoff_ms: u64,
    /// Attempts at fetching the login form.
    pub login_attempts: u32,
    /// Fixed pause between login form attempts.
    pub login_retry_delay_ms: u64,
    /// Timeout for every request of the HTTP session.
    pub http_timeout_ms: u64,
    /// Independent sessions crawling in parallel.
    pub workers: usize,
    pub chromium_path: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 2_000,
            max_delay_ms: 6_000,
            navigation_timeout_ms: 30_000,
            selector_timeout_ms: 10_000,
            launch_timeout_ms: 30_000,
            max_navigation_retries: 3,
            max_context_rebuilds: 3,
            retry_backoff_ms: 1_000,
            login_attempts: 5,
            login_retry_delay_ms: 5_000,
            http_timeout_ms: 30_000,
            workers: 1,
            chromium_path: None,
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlConfig {
    /// Load a JSON config file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CrawlError::Configuration(format!("cannot read config {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            CrawlError::Configuration(format!("invalid config {}: {e}", path.display()))
        })
    }

    /// Overlay `SITECRAWL_*` environment variables.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(mut self, get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("SITECRAWL_MIN_DELAY") {
            self.min_delay_ms = parse_seconds("SITECRAWL_MIN_DELAY", &v)?;
        }
        if let Some(v) = get("SITECRAWL_MAX_DELAY") {
            self.max_delay_ms = parse_seconds("SITECRAWL_MAX_DELAY", &v)?;
        }
        if let Some(v) = get("SITECRAWL_NAVIGATION_TIMEOUT") {
            self.navigation_timeout_ms = parse_seconds("SITECRAWL_NAVIGATION_TIMEOUT", &v)?;
        }
        if let Some(v) = get("SITECRAWL_MAX_RETRIES") {
            self.max_navigation_retries = parse_number("SITECRAWL_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("SITECRAWL_MAX_REBUILDS") {
            self.max_context_rebuilds = parse_number("SITECRAWL_MAX_REBUILDS", &v)?;
        }
        if let Some(v) = get("SITECRAWL_WORKERS") {
            self.workers = parse_number("SITECRAWL_WORKERS", &v)?;
        }
        if let Some(v) = get("SITECRAWL_CHROMIUM_PATH") {
            self.chromium_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SITECRAWL_USER_AGENT") {
            self.user_agent = v;
        }
        Ok(self)
    }

    /// Reject combinations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(CrawlError::Configuration(format!(
                "minimum delay ({} ms) exceeds maximum delay ({} ms)",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        if self.workers == 0 {
            return Err(CrawlError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.login_attempts == 0 {
            return Err(CrawlError::Configuration(
                "login attempts must be at least 1".to_string(),
            ));
        }
        if self.navigation_timeout_ms == 0 || self.selector_timeout_ms == 0 {
            return Err(CrawlError::Configuration(
                "navigation and selector timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }
}

/// Parse a (possibly fractional) number of seconds into milliseconds.
pub fn parse_seconds(name: &str, raw: &str) -> Result<u64> {
    let secs: f64 = raw.trim().parse().map_err(|_| {
        CrawlError::Configuration(format!("{name} must be a number of seconds, got '{raw}'"))
    })?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(CrawlError::Configuration(format!(
            "{name} must be a non-negative number of seconds, got '{raw}'"
        )));
    }
    Ok((secs * 1000.0).round() as u64)
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| CrawlError::Configuration(format!("{name} must be an integer, got '{raw}'")))
}
