//! One crawl worker: session, browser, pacing and extraction for a
//! sequence of work items.

use super::{pool, resolve, CrawlResult, FailureReason, ItemFailure, WorkItem};
use crate::config::CrawlConfig;
use crate::error::Result;
use crate::extraction::PageExtractor;
use crate::navigation::{BrowserContextManager, RecoveryPolicy};
use crate::pacing::RateGovernor;
use crate::progress::{ProgressEmitter, ProgressEventKind};
use crate::renderer::RendererLauncher;
use crate::session::Session;
use futures::Stream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Drives items through navigate → stabilize → extract, one at a time.
pub struct CrawlDriver {
    session: Session,
    navigator: BrowserContextManager,
    extractor: PageExtractor,
    governor: RateGovernor,
    cancel: CancellationToken,
    progress: ProgressEmitter,
    worker: usize,
    navigated: bool,
}

impl CrawlDriver {
    pub fn new(
        session: Session,
        launcher: Arc<dyn RendererLauncher>,
        config: &CrawlConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let governor = RateGovernor::new(
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )?;
        let navigator = BrowserContextManager::new(
            launcher,
            session.profile().detection.clone(),
            RecoveryPolicy::from_config(config),
            cancel.clone(),
        );
        let extractor = PageExtractor::from_profile(session.profile());
        Ok(Self {
            session,
            navigator,
            extractor,
            governor,
            cancel,
            progress: ProgressEmitter::default(),
            worker: 0,
            navigated: false,
        })
    }

    /// Report progress on `progress` as worker number `worker`.
    pub fn with_progress(mut self, progress: ProgressEmitter, worker: usize) -> Self {
        self.worker = worker;
        self.navigator = self.navigator.with_progress(progress.clone());
        self.progress = progress;
        self
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Crawl a single item.
    ///
    /// Returns `None` when cancelled before the item completed; no partial
    /// results are produced for it. Otherwise one result per visited link,
    /// or a single failure result when the target resolved to nothing.
    pub async fn crawl_item(&mut self, item: &WorkItem) -> Option<Vec<CrawlResult>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let started = Instant::now();
        self.progress.emit(ProgressEventKind::ItemStarted {
            index: item.index,
            target: item.target.clone(),
        });

        let results = match self.links_for(item).await {
            Ok(links) => {
                let mut results = Vec::with_capacity(links.len());
                for link in &links {
                    results.push(self.crawl_link(item, link).await?);
                }
                results
            }
            Err(failure) if failure.is_cancelled() => return None,
            Err(failure) => {
                warn!("could not resolve '{}': {failure}", item.target);
                self.progress.emit(ProgressEventKind::Warning {
                    message: format!("could not resolve '{}': {failure}", item.target),
                });
                vec![CrawlResult::failed(item, None, failure)]
            }
        };

        self.progress.emit(ProgressEventKind::ItemFinished {
            index: item.index,
            succeeded: results.iter().any(CrawlResult::is_success),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        Some(results)
    }

    /// Page URLs to visit for an item: the item itself, or the search hits
    /// for a company name.
    async fn links_for(&mut self, item: &WorkItem) -> std::result::Result<Vec<String>, ItemFailure> {
        if self.session.profile().search.is_none() {
            return Ok(vec![item.target.clone()]);
        }

        let resolved = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ItemFailure::cancelled(0)),
            r = resolve::resolve_company_links(&self.session, &item.target) => r,
        };
        let links = resolved.map_err(|e| {
            ItemFailure::new(
                FailureReason::ResolutionFailed {
                    message: e.to_string(),
                },
                1,
            )
        })?;

        self.progress.emit(ProgressEventKind::TargetResolved {
            index: item.index,
            links: links.len(),
        });
        if links.is_empty() {
            return Err(ItemFailure::new(FailureReason::NoLinksResolved, 1));
        }
        Ok(links)
    }

    /// Pace, navigate and extract one page. `None` if cancelled.
    async fn crawl_link(&mut self, item: &WorkItem, link: &str) -> Option<CrawlResult> {
        if self.navigated && !self.governor.pace(&self.cancel).await {
            return None;
        }
        self.navigated = true;

        info!("crawling {link}");
        match self.navigator.navigate_and_stabilize(&self.session, link).await {
            Ok(stable) => {
                let Some(page) = self.navigator.current_page() else {
                    let failure = ItemFailure::new(
                        FailureReason::BrowserUnavailable {
                            message: "page lost after stabilizing".to_string(),
                        },
                        stable.attempts,
                    );
                    return Some(CrawlResult::failed(item, Some(link), failure));
                };
                let record = self.extractor.extract(page).await;
                Some(CrawlResult::extracted(item, link, record))
            }
            Err(failure) if failure.is_cancelled() => None,
            Err(failure) => {
                warn!("giving up on {link}: {failure}");
                self.progress.emit(ProgressEventKind::Warning {
                    message: format!("giving up on {link}: {failure}"),
                });
                Some(CrawlResult::failed(item, Some(link), failure))
            }
        }
    }

    /// Crawl assigned items in order, sending each item's results tagged with
    /// its position. Stops on cancellation or once the receiver is gone, and
    /// always releases the browser before returning.
    pub async fn run_assigned(
        mut self,
        assigned: Vec<(usize, WorkItem)>,
        tx: mpsc::Sender<(usize, Vec<CrawlResult>)>,
    ) {
        for (position, item) in assigned {
            let Some(results) = self.crawl_item(&item).await else {
                info!(worker = self.worker, "cancelled; stopping before item {}", item.index);
                break;
            };
            if tx.send((position, results)).await.is_err() {
                break;
            }
        }
        self.shutdown().await;
    }

    /// Release the browser, then the session.
    pub async fn shutdown(self) {
        let CrawlDriver {
            session,
            mut navigator,
            ..
        } = self;
        navigator.shutdown().await;
        session.close();
    }

    /// Crawl `items` on this driver alone, yielding results in input order.
    pub fn run(self, items: Vec<WorkItem>) -> impl Stream<Item = CrawlResult> {
        pool::run(vec![self], items)
    }
}
