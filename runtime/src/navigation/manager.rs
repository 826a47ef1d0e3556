//! Browser context lifecycle and the navigate-and-stabilize state machine.
//!
//! ```text
//! Requesting ──► Stable ─────────────────────────────► done
//!     │  ├─► ChallengePresented ─click─► Stable | Error
//!     │  ├─► Blocked ─► recreate engine + reseed cookies ─► Requesting
//!     │  └─► Error ─► backoff ─► Requesting (same context)
//! ```
//!
//! Both loops are bounded by [`RecoveryPolicy`]. Only the `Blocked` path
//! tears down the engine.

use super::{classify, PageState};
use crate::config::CrawlConfig;
use crate::crawl::{FailureReason, ItemFailure};
use crate::profile::DetectionProfile;
use crate::progress::{Interruption, ProgressEmitter, ProgressEventKind};
use crate::renderer::{RenderContext, Renderer, RendererLauncher};
use crate::session::Session;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounds and timeouts for recovery.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    pub max_navigation_retries: u32,
    pub max_context_rebuilds: u32,
    pub retry_backoff: Duration,
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    pub launch_timeout: Duration,
}

impl RecoveryPolicy {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            max_navigation_retries: config.max_navigation_retries,
            max_context_rebuilds: config.max_context_rebuilds,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            navigation_timeout: config.navigation_timeout(),
            selector_timeout: config.selector_timeout(),
            launch_timeout: config.launch_timeout(),
        }
    }

    /// Backoff before the `n`th retry (1-based), doubling each time.
    fn backoff(&self, n: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(n.saturating_sub(1)))
    }
}

/// A navigation that reached the content marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StablePage {
    pub final_url: String,
    /// Navigations issued, including the successful one.
    pub attempts: u32,
    /// Engine rebuilds needed along the way.
    pub rebuilds: u32,
    /// Whether a challenge was solved along the way.
    pub solved_challenge: bool,
}

/// Owns the browser engine and its single page for one crawl worker.
pub struct BrowserContextManager {
    launcher: Arc<dyn RendererLauncher>,
    engine: Option<Box<dyn Renderer>>,
    page: Option<Box<dyn RenderContext>>,
    detection: DetectionProfile,
    policy: RecoveryPolicy,
    cancel: CancellationToken,
    progress: ProgressEmitter,
    launches: u32,
}

impl BrowserContextManager {
    pub fn new(
        launcher: Arc<dyn RendererLauncher>,
        detection: DetectionProfile,
        policy: RecoveryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            launcher,
            engine: None,
            page: None,
            detection,
            policy,
            cancel,
            progress: ProgressEmitter::default(),
            launches: 0,
        }
    }

    pub fn with_progress(mut self, progress: ProgressEmitter) -> Self {
        self.progress = progress;
        self
    }

    /// The live page, if one has been created and not invalidated.
    pub fn current_page(&self) -> Option<&dyn RenderContext> {
        self.page.as_deref()
    }

    /// Identity of the live page context.
    pub fn context_id(&self) -> Option<u64> {
        self.page.as_ref().map(|p| p.id())
    }

    /// Number of engines launched so far.
    pub fn launches(&self) -> u32 {
        self.launches
    }

    /// Create the engine and page on first use, seeding session cookies.
    async fn ensure_page(&mut self, session: &Session) -> Result<()> {
        if self.page.is_some() {
            return Ok(());
        }

        if self.engine.is_none() {
            info!("launching browser engine");
            let engine = tokio::time::timeout(self.policy.launch_timeout, self.launcher.launch())
                .await
                .map_err(|_| {
                    anyhow::anyhow!(
                        "browser launch timed out after {}ms",
                        self.policy.launch_timeout.as_millis()
                    )
                })??;
            self.launches += 1;
            self.engine = Some(engine);
        }

        let engine = self.engine.as_ref().context("browser engine missing")?;
        let mut page = engine.new_context().await?;

        let cookies = session.export_cookies_for_browser();
        if !cookies.is_empty() {
            if let Err(e) = page.set_cookies(&cookies).await {
                let _ = page.close().await;
                return Err(e);
            }
            debug!("seeded {} cookies into context {}", cookies.len(), page.id());
        }
        self.page = Some(page);
        Ok(())
    }

    /// Release the page and then the engine. Safe to call repeatedly.
    pub async fn invalidate(&mut self) {
        if let Some(page) = self.page.take() {
            let id = page.id();
            if let Err(e) = page.close().await {
                warn!("failed to close context {id}: {e:#}");
            }
        }
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.shutdown().await {
                warn!("failed to shut down browser engine: {e:#}");
            }
        }
    }

    /// Tear everything down and build a fresh engine and page.
    pub async fn recreate(&mut self, session: &Session) -> Result<()> {
        self.invalidate().await;
        self.ensure_page(session).await
    }

    /// Release all browser resources at run end.
    pub async fn shutdown(&mut self) {
        if self.engine.is_some() || self.page.is_some() {
            info!("destroying the browser");
        }
        self.invalidate().await;
    }

    /// Navigate to `url` and recover until the content marker resolves or the
    /// recovery budget is spent.
    pub async fn navigate_and_stabilize(
        &mut self,
        session: &Session,
        url: &str,
    ) -> std::result::Result<StablePage, ItemFailure> {
        let mut attempts = 0u32;
        let mut errors = 0u32;
        let mut rebuilds = 0u32;
        let mut solved_challenge = false;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ItemFailure::cancelled(attempts));
            }
            attempts += 1;

            let Some((mut state, final_url)) = self.attempt(session, url).await else {
                info!("navigation to {url} cancelled");
                return Err(ItemFailure::cancelled(attempts));
            };
            debug!(url, attempt = attempts, state = ?state, "navigation attempt classified");

            if state == PageState::ChallengePresented {
                warn!("challenge detected on {url}; clicking through");
                self.progress.emit(ProgressEventKind::Interrupted {
                    url: url.to_string(),
                    interruption: Interruption::Challenge,
                });
                state = self.solve_challenge().await;
                if state.is_stable() {
                    info!("challenge passed on {url}");
                    solved_challenge = true;
                }
            }

            // Cancelled after classification, e.g. during the challenge click.
            if !state.is_stable() && self.cancel.is_cancelled() {
                return Err(ItemFailure::cancelled(attempts));
            }

            match state {
                PageState::Stable => {
                    return Ok(StablePage {
                        final_url: final_url.unwrap_or_else(|| url.to_string()),
                        attempts,
                        rebuilds,
                        solved_challenge,
                    });
                }
                PageState::Blocked => {
                    self.progress.emit(ProgressEventKind::Interrupted {
                        url: url.to_string(),
                        interruption: Interruption::Blocked,
                    });
                    if rebuilds >= self.policy.max_context_rebuilds {
                        warn!("still denied on {url} after {rebuilds} rebuild(s); giving up");
                        return Err(ItemFailure::new(
                            FailureReason::BlockExhausted { rebuilds },
                            attempts,
                        ));
                    }
                    rebuilds += 1;
                    warn!(
                        "browser denied on {url}; creating another ({rebuilds}/{})",
                        self.policy.max_context_rebuilds
                    );
                    if let Err(e) = self.recreate(session).await {
                        warn!("browser rebuild failed: {e:#}");
                        self.invalidate().await;
                        return Err(ItemFailure::new(
                            FailureReason::BrowserUnavailable {
                                message: format!("{e:#}"),
                            },
                            attempts,
                        ));
                    }
                    self.progress.emit(ProgressEventKind::ContextRebuilt {
                        url: url.to_string(),
                        rebuilds,
                    });
                }
                PageState::Error(reason) => {
                    if errors >= self.policy.max_navigation_retries {
                        warn!("giving up on {url} after {attempts} attempt(s): {reason}");
                        return Err(ItemFailure::new(
                            FailureReason::NavigationExhausted { last_error: reason },
                            attempts,
                        ));
                    }
                    errors += 1;
                    let delay = self.policy.backoff(errors);
                    info!(
                        "navigation to {url} failed ({reason}); retry {errors}/{} in {:?}",
                        self.policy.max_navigation_retries, delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(ItemFailure::cancelled(attempts)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                PageState::ChallengePresented => unreachable!("challenge is remediated above"),
            }
        }
    }

    /// One navigation plus classification. Problems become
    /// [`PageState::Error`]; `None` means the token fired mid-attempt.
    async fn attempt(
        &mut self,
        session: &Session,
        url: &str,
    ) -> Option<(PageState, Option<String>)> {
        if let Err(e) = self.ensure_page(session).await {
            // Drop a half-built engine so the next attempt starts clean.
            self.invalidate().await;
            return Some((PageState::Error(format!("browser unavailable: {e:#}")), None));
        }
        let Some(page) = self.page.as_deref_mut() else {
            return Some((PageState::Error("browser page missing".to_string()), None));
        };

        let nav = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            nav = page.navigate(url, self.policy.navigation_timeout) => nav,
        };
        let final_url = match nav {
            Ok(nav) => nav.final_url,
            Err(e) => return Some((PageState::Error(format!("{e:#}")), None)),
        };

        let selectors = self.detection.selectors();
        let hit = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            hit = page.first_match(&selectors, self.policy.selector_timeout) => hit,
        };
        let state = match hit {
            Ok(hit) => {
                let state = classify(hit.as_ref(), &self.detection);
                if hit.is_some() && matches!(state, PageState::Error(_)) {
                    self.progress.emit(ProgressEventKind::Interrupted {
                        url: url.to_string(),
                        interruption: Interruption::Unrecognized,
                    });
                }
                state
            }
            Err(e) => PageState::Error(format!("{e:#}")),
        };
        Some((state, Some(final_url)))
    }

    /// Click the challenge widget once and wait for the content marker.
    ///
    /// Handles the single observed challenge type only; anything else ends in
    /// [`PageState::Error`].
    async fn solve_challenge(&self) -> PageState {
        let Some(page) = self.page.as_deref() else {
            return PageState::Error("browser page missing".to_string());
        };
        let d = &self.detection;

        if let Err(e) = page
            .click_in_frame(
                &d.challenge_frame_selector,
                &d.challenge_click_selector,
                self.policy.selector_timeout,
            )
            .await
        {
            return PageState::Error(format!("challenge click failed: {e:#}"));
        }

        match page
            .first_match(&[d.content_selector.as_str()], self.policy.selector_timeout)
            .await
        {
            Ok(Some(_)) => PageState::Stable,
            Ok(None) => PageState::Error("content did not appear after challenge".to_string()),
            Err(e) => PageState::Error(format!("{e:#}")),
        }
    }
}

impl Drop for BrowserContextManager {
    fn drop(&mut self) {
        if self.engine.is_some() || self.page.is_some() {
            warn!("browser context manager dropped without shutdown");
        }
    }
}
