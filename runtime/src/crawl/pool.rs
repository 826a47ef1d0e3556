//! Parallel crawling over independent sessions.
//!
//! Items are dealt round-robin to workers, each running on its own task with
//! its own forked session and browser. Every worker hands its results over a
//! channel of capacity one and the consumer reads the workers in turn, so
//! results are released strictly in input order and no worker gets more than
//! two items ahead of the slowest one. A cancelled run always yields a
//! contiguous prefix of the input.

use super::driver::CrawlDriver;
use super::{CrawlResult, WorkItem};
use crate::config::CrawlConfig;
use crate::error::Result;
use crate::progress::{ProgressEmitter, ProgressSender};
use crate::renderer::RendererLauncher;
use crate::session::Session;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One driver per configured worker. Worker 0 keeps `session`; the others
/// get forks of it.
pub fn build_drivers(
    session: Session,
    launcher: Arc<dyn RendererLauncher>,
    config: &CrawlConfig,
    cancel: &CancellationToken,
    progress: Option<ProgressSender>,
) -> Result<Vec<CrawlDriver>> {
    let degree = config.workers.max(1);
    let mut sessions = Vec::with_capacity(degree);
    for _ in 1..degree {
        sessions.push(session.fork()?);
    }
    sessions.insert(0, session);

    sessions
        .into_iter()
        .enumerate()
        .map(|(worker, session)| {
            let driver = CrawlDriver::new(session, Arc::clone(&launcher), config, cancel.clone())?;
            Ok(driver.with_progress(ProgressEmitter::new(progress.clone(), worker), worker))
        })
        .collect()
}

/// Crawl `items` across `drivers`, yielding results in input order.
///
/// Workers start on first poll. Dropping the stream stops each worker after
/// its current item; every worker releases its browser before exiting.
pub fn run(drivers: Vec<CrawlDriver>, items: Vec<WorkItem>) -> impl Stream<Item = CrawlResult> {
    async_stream::stream! {
        if drivers.is_empty() {
            warn!("no crawl workers; {} item(s) skipped", items.len());
            return;
        }

        let workers = drivers.len();
        let total = items.len();
        let mut assignments: Vec<Vec<(usize, WorkItem)>> = vec![Vec::new(); workers];
        for (position, item) in items.into_iter().enumerate() {
            assignments[position % workers].push((position, item));
        }

        let mut receivers = Vec::with_capacity(workers);
        for (driver, assigned) in drivers.into_iter().zip(assignments) {
            debug!(worker = driver.worker(), items = assigned.len(), "starting crawl worker");
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(driver.run_assigned(assigned, tx));
            receivers.push(rx);
        }

        // Position `next` always belongs to worker `next % workers`.
        for next in 0..total {
            let Some((position, results)) = receivers[next % workers].recv().await else {
                debug!(
                    worker = next % workers,
                    "worker stopped before item {next}; ending the run"
                );
                break;
            };
            debug_assert_eq!(position, next);
            for result in results {
                yield result;
            }
        }
    }
}
