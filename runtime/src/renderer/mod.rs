//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `RendererLauncher`, `Renderer` and `RenderContext` traits that
//! abstract over the browser engine (currently Chromium via chromiumoxide).
//! A launcher creates engine instances, an engine creates page contexts, and
//! a context navigates and answers read-only DOM queries.

pub mod chromium;
#[cfg(test)]
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A cookie in the shape the browser engine expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

/// The first of several competing selectors that resolved on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorHit {
    /// Position of the selector in the list that was polled.
    pub index: usize,
    /// Rendered text of the matched element.
    pub text: String,
}

/// Creates fresh browser engine instances.
#[async_trait]
pub trait RendererLauncher: Send + Sync {
    /// Launch a new engine with no state shared with earlier instances.
    async fn launch(&self) -> Result<Box<dyn Renderer>>;
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine, releasing the process.
    async fn shutdown(self: Box<Self>) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Identity of this context, unique within its launcher.
    fn id(&self) -> u64;
    /// Install cookies before navigating.
    async fn set_cookies(&mut self, cookies: &[BrowserCookie]) -> Result<()>;
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult>;
    /// Poll until one of `selectors` matches, trying them in order on each
    /// pass. `None` once `timeout` elapses without a match.
    async fn first_match(&self, selectors: &[&str], timeout: Duration)
        -> Result<Option<SelectorHit>>;
    /// Click `target` inside the frame matched by `frame`.
    async fn click_in_frame(&self, frame: &str, target: &str, timeout: Duration) -> Result<()>;
    /// Rendered text of the first element matching `selector`.
    async fn query_text(&self, selector: &str) -> Result<Option<String>>;
    /// Inner HTML of the first element matching `selector`.
    async fn query_html(&self, selector: &str) -> Result<Option<String>>;
    /// Attribute value of the first element matching `selector`.
    async fn query_attribute(&self, selector: &str, attribute: &str) -> Result<Option<String>>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}
