//! `sitecrawl crawl`: read targets, crawl them, write results.

use crate::config::{parse_seconds, CrawlConfig};
use crate::crawl::{pool, CrawlResult};
use crate::io::{read_work_file, CsvSink, JsonlSink, ResultSink};
use crate::profile::SiteProfile;
use crate::progress::{self, ProgressEventKind, ProgressReceiver};
use crate::renderer::chromium::{ChromiumLauncher, LaunchOptions};
use crate::session::credentials::Credentials;
use crate::session::SessionProvider;
use anyhow::{Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

/// Arguments of the `crawl` subcommand.
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    /// Site profile (directory, network)
    #[arg(long, default_value = "directory")]
    pub profile: String,
    /// Headerless CSV with one target per row
    #[arg(long, short)]
    pub input: PathBuf,
    /// CSV file to write results to
    #[arg(long, short)]
    pub output: PathBuf,
    /// Also write one JSON object per result to this file
    #[arg(long)]
    pub jsonl: Option<PathBuf>,
    /// JSON config file (overridden by environment and flags)
    #[arg(long, env = "SITECRAWL_CONFIG")]
    pub config: Option<PathBuf>,
    /// Parallel workers, each with its own session and browser
    #[arg(long)]
    pub workers: Option<usize>,
    /// Minimum pause between targets, in seconds
    #[arg(long)]
    pub min_delay: Option<String>,
    /// Maximum pause between targets, in seconds
    #[arg(long)]
    pub max_delay: Option<String>,
    /// Cookie file (JSON object or name=value lines) of a logged-in browser
    #[arg(long, env = "SITECRAWL_COOKIES_FILE")]
    pub cookies: Option<PathBuf>,
    /// Chromium executable
    #[arg(long)]
    pub chromium: Option<PathBuf>,
    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
    /// Override the profile's base URL
    #[arg(long)]
    pub base_url: Option<Url>,
}

impl CrawlArgs {
    /// Defaults, then the config file, then `SITECRAWL_*`, then flags.
    pub fn resolve_config(&self) -> Result<CrawlConfig> {
        let base = match &self.config {
            Some(path) => CrawlConfig::from_file(path)?,
            None => CrawlConfig::default(),
        };
        let mut config = base.apply_env()?;

        if let Some(raw) = &self.min_delay {
            config.min_delay_ms = parse_seconds("--min-delay", raw)?;
        }
        if let Some(raw) = &self.max_delay {
            config.max_delay_ms = parse_seconds("--max-delay", raw)?;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(path) = &self.chromium {
            config.chromium_path = Some(path.clone());
        }
        if self.headful {
            config.headless = false;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn resolve_profile(&self) -> Result<SiteProfile> {
        let profile = SiteProfile::by_name(&self.profile)?;
        Ok(match &self.base_url {
            Some(url) => profile.with_base_url(url.clone()),
            None => profile,
        })
    }
}

/// Run a crawl to completion or until Ctrl-C.
pub async fn run(args: CrawlArgs, quiet: bool) -> Result<()> {
    let config = args.resolve_config()?;
    let profile = Arc::new(args.resolve_profile()?);
    let items = read_work_file(&args.input)?;
    let credentials = Credentials::from_env(args.cookies.as_deref())?;
    info!(
        profile = %profile.name,
        items = items.len(),
        workers = config.workers,
        "starting crawl"
    );

    // Opened before any network traffic so a bad path fails fast.
    let mut csv = CsvSink::create(&args.output, &profile)
        .with_context(|| format!("cannot create output {}", args.output.display()))?;
    let mut jsonl = match &args.jsonl {
        Some(path) => Some(
            JsonlSink::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?,
        ),
        None => None,
    };

    let session = SessionProvider::new(Arc::clone(&profile), &config)
        .establish_or_anonymous(&credentials)
        .await
        .context("could not establish a session")?;
    info!("session established ({:?})", session.kind());

    let launcher = Arc::new(ChromiumLauncher::new(LaunchOptions {
        chromium_path: config.chromium_path.clone(),
        headless: config.headless,
        user_agent: config.user_agent.clone(),
        query_timeout: config.selector_timeout(),
        teardown_timeout: config.launch_timeout(),
    }));

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing the current item");
            signal.cancel();
        }
    });

    let (tx, rx) = progress::channel();
    let total = items.len();
    let bar = progress_bar(total as u64, quiet);
    let reporter = tokio::spawn(report_progress(rx, bar.clone()));

    let drivers = pool::build_drivers(session, launcher, &config, &cancel, Some(tx))?;
    let mut results = Box::pin(pool::run(drivers, items));

    let mut written = 0usize;
    let mut failed = 0usize;
    let mut last_index: Option<usize> = None;
    while let Some(result) = results.next().await {
        write_result(&mut csv, jsonl.as_mut(), &result)?;
        written += 1;
        if !result.is_success() {
            failed += 1;
        }
        if last_index != Some(result.index) {
            last_index = Some(result.index);
            bar.inc(1);
        }
    }
    drop(results);

    csv.finish()?;
    if let Some(sink) = jsonl.as_mut() {
        sink.finish()?;
    }
    // Workers drop their emitters on exit, which ends the reporter.
    let _ = reporter.await;
    bar.finish_and_clear();

    let completed = last_index.map_or(0, |i| i + 1);
    info!(
        "wrote {written} row(s) for {completed}/{total} target(s), {failed} failed, to {}",
        args.output.display()
    );
    if cancel.is_cancelled() && completed < total {
        warn!(
            "run interrupted; rerun with the last {} target(s) of {} to finish",
            total - completed,
            args.input.display()
        );
    }
    Ok(())
}

fn write_result(
    csv: &mut CsvSink<std::fs::File>,
    jsonl: Option<&mut JsonlSink<std::io::BufWriter<std::fs::File>>>,
    result: &CrawlResult,
) -> Result<()> {
    csv.write(result)?;
    if let Some(sink) = jsonl {
        sink.write(result)?;
    }
    Ok(())
}

fn progress_bar(total: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb
}

/// Mirror worker events onto the progress bar message.
async fn report_progress(mut rx: ProgressReceiver, bar: ProgressBar) {
    use tokio::sync::broadcast::error::RecvError;
    loop {
        match rx.recv().await {
            Ok(event) => match event.event {
                ProgressEventKind::ItemStarted { target, .. } => {
                    bar.set_message(format!("[w{}] {target}", event.worker));
                }
                ProgressEventKind::Interrupted { url, interruption } => {
                    bar.set_message(format!("[w{}] {interruption} on {url}", event.worker));
                }
                ProgressEventKind::ContextRebuilt { rebuilds, .. } => {
                    bar.set_message(format!("[w{}] browser rebuilt ({rebuilds})", event.worker));
                }
                _ => {}
            },
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}
