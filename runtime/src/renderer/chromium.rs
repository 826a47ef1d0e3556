//! Chromium-based renderer using chromiumoxide.

use super::{BrowserCookie, NavigationResult, RenderContext, Renderer, RendererLauncher, SelectorHit};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Pause between two selector polls.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Await `fut` for at most `limit`, naming `what` in the timeout error.
async fn bounded<T>(
    limit: Duration,
    what: &str,
    fut: impl std::future::Future<Output = T>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| anyhow::anyhow!("{what} timed out after {}ms", limit.as_millis()))
}

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Configured path
    if let Some(p) = explicit {
        if p.exists() {
            return Some(p.to_path_buf());
        }
    }

    // 2. ~/.sitecrawl/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = [
            home.join(".sitecrawl/chromium/chrome-linux64/chrome"),
            home.join(".sitecrawl/chromium/chrome"),
        ];
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    ["google-chrome", "chromium", "chromium-browser"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Options for launching Chromium.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub chromium_path: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: String,
    /// Budget for any single DOM query or click.
    pub query_timeout: Duration,
    /// Budget for closing a page or the whole browser.
    pub teardown_timeout: Duration,
}

/// Launches a brand-new Chromium process per call.
pub struct ChromiumLauncher {
    options: LaunchOptions,
    next_context_id: Arc<AtomicU64>,
}

impl ChromiumLauncher {
    pub fn new(options: LaunchOptions) -> Self {
        Self {
            options,
            next_context_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

#[async_trait]
impl RendererLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        let renderer =
            ChromiumRenderer::launch(&self.options, Arc::clone(&self.next_context_id)).await?;
        Ok(Box::new(renderer))
    }
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
    next_context_id: Arc<AtomicU64>,
    query_timeout: Duration,
    teardown_timeout: Duration,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance.
    pub async fn launch(options: &LaunchOptions, next_context_id: Arc<AtomicU64>) -> Result<Self> {
        let chrome_path = find_chromium(options.chromium_path.as_deref())
            .context("Chromium not found. Set SITECRAWL_CHROMIUM_PATH or install Chrome.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg(format!("--user-agent={}", options.user_agent));
        builder = if options.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
            next_context_id,
            query_timeout: options.query_timeout,
            teardown_timeout: options.teardown_timeout,
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            id: self.next_context_id.fetch_add(1, Ordering::Relaxed),
            page,
            active_count: Arc::clone(&self.active_count),
            query_timeout: self.query_timeout,
            teardown_timeout: self.teardown_timeout,
        }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        let Self {
            mut browser,
            handler,
            teardown_timeout,
            ..
        } = *self;
        let closed = bounded(teardown_timeout, "closing Chromium", browser.close()).await;
        let exited = bounded(teardown_timeout, "waiting for Chromium to exit", browser.wait()).await;
        if let Err(e) = exited {
            tracing::debug!("{e:#}");
            let _ = browser.kill().await;
        }
        handler.abort();
        closed?.context("failed to close Chromium")?;
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    id: u64,
    page: Page,
    active_count: Arc<AtomicUsize>,
    query_timeout: Duration,
    teardown_timeout: Duration,
}

#[derive(Deserialize)]
struct QueryReply {
    found: bool,
    value: Option<String>,
}

impl ChromiumContext {
    /// Evaluate a script that returns a JSON-encoded string.
    async fn eval_json<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = tokio::time::timeout(self.query_timeout, self.page.evaluate(script))
            .await
            .map_err(|_| anyhow::anyhow!("script timed out after {:?}", self.query_timeout))?
            .context("JS execution failed")?;
        let raw: String = result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))?;
        serde_json::from_str(&raw).context("script returned malformed JSON")
    }

    /// Read one property of the first element matching `selector`.
    async fn query(&self, selector: &str, read: &str) -> Result<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             return JSON.stringify(el ? {{ found: true, value: {read} }} : {{ found: false, value: null }}); }})()",
            sel = serde_json::to_string(selector)?,
        );
        let reply: QueryReply = self.eval_json(&script).await?;
        Ok(if reply.found { reply.value } else { None })
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    fn id(&self) -> u64 {
        self.id
    }

    async fn set_cookies(&mut self, cookies: &[BrowserCookie]) -> Result<()> {
        let params = cookies
            .iter()
            .map(|c| {
                CookieParam::builder()
                    .name(c.name.clone())
                    .value(c.value.clone())
                    .domain(c.domain.clone())
                    .path(c.path.clone())
                    .build()
                    .map_err(|e| anyhow::anyhow!("invalid cookie {}: {e}", c.name))
            })
            .collect::<Result<Vec<_>>>()?;
        self.page
            .set_cookies(params)
            .await
            .context("failed to install cookies")?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(timeout, async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {}ms", timeout.as_millis()),
        }
    }

    async fn first_match(
        &self,
        selectors: &[&str],
        timeout: Duration,
    ) -> Result<Option<SelectorHit>> {
        let script = format!(
            "(() => {{ const sels = {list}; \
             for (let i = 0; i < sels.length; i++) {{ \
               const el = document.querySelector(sels[i]); \
               if (el) return JSON.stringify({{ index: i, text: el.innerText }}); \
             }} \
             return JSON.stringify(null); }})()",
            list = serde_json::to_string(selectors)?,
        );

        let deadline = Instant::now() + timeout;
        loop {
            // The document may be replaced mid-poll; a failed pass just polls again.
            match self.eval_json::<Option<SelectorHit>>(&script).await {
                Ok(Some(hit)) => return Ok(Some(hit)),
                Ok(None) => {}
                Err(e) => tracing::debug!("selector poll failed: {e:#}"),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click_in_frame(&self, frame: &str, target: &str, timeout: Duration) -> Result<()> {
        let script = format!(
            "(() => {{ const f = document.querySelector({frame}); \
             if (!f) return JSON.stringify('missing'); \
             let doc = null; try {{ doc = f.contentDocument; }} catch (e) {{}} \
             if (!doc) return JSON.stringify('cross-origin'); \
             const el = doc.querySelector({target}); \
             if (!el) return JSON.stringify('missing'); \
             el.click(); return JSON.stringify('clicked'); }})()",
            frame = serde_json::to_string(frame)?,
            target = serde_json::to_string(target)?,
        );

        tokio::time::timeout(timeout, async {
            let outcome: String = self.eval_json(&script).await?;
            match outcome.as_str() {
                "clicked" => Ok(()),
                // The widget lives in another origin; click the frame where it renders.
                "cross-origin" => {
                    let element = self
                        .page
                        .find_element(frame)
                        .await
                        .context("challenge frame disappeared")?;
                    element.click().await.context("failed to click challenge frame")?;
                    Ok(())
                }
                _ => bail!("challenge element {target} not found in {frame}"),
            }
        })
        .await
        .map_err(|_| anyhow::anyhow!("challenge click timed out after {}ms", timeout.as_millis()))?
    }

    async fn query_text(&self, selector: &str) -> Result<Option<String>> {
        self.query(selector, "el.innerText").await
    }

    async fn query_html(&self, selector: &str) -> Result<Option<String>> {
        self.query(selector, "el.innerHTML").await
    }

    async fn query_attribute(&self, selector: &str, attribute: &str) -> Result<Option<String>> {
        let read = format!("el.getAttribute({})", serde_json::to_string(attribute)?);
        self.query(selector, &read).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let Self {
            id,
            page,
            teardown_timeout,
            ..
        } = *self;
        match bounded(teardown_timeout, "closing page", page.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("page {id} did not close cleanly: {e}"),
            Err(e) => tracing::debug!("page {id}: {e:#}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> LaunchOptions {
        LaunchOptions {
            chromium_path: None,
            headless: true,
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
            query_timeout: Duration::from_secs(5),
            teardown_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_bounded_teardown_gives_up() {
        let err = bounded(
            Duration::from_millis(20),
            "closing Chromium",
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "closing Chromium timed out after 20ms");

        let done = bounded(Duration::from_secs(1), "closing page", async { 7 }).await;
        assert_eq!(done.unwrap(), 7);
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_detection_and_queries() {
        let launcher = ChromiumLauncher::new(options());
        let renderer = launcher.launch().await.expect("failed to launch");
        let mut ctx = renderer.new_context().await.expect("failed to create context");

        ctx.navigate(
            "data:text/html,<h1 class='t'>Acme</h1><img class='logo' src='/logo.png'>\
             <div itemprop='description'>Widgets</div>",
            Duration::from_secs(10),
        )
        .await
        .expect("navigation failed");

        let hit = ctx
            .first_match(
                &["h2[id=challenge-running]", "div[itemprop=description]"],
                Duration::from_secs(2),
            )
            .await
            .unwrap()
            .expect("content marker should resolve");
        assert_eq!(hit, SelectorHit { index: 1, text: "Widgets".to_string() });

        assert_eq!(ctx.query_html("h1.t").await.unwrap().as_deref(), Some("Acme"));
        assert_eq!(
            ctx.query_attribute("img.logo", "src").await.unwrap().as_deref(),
            Some("/logo.png")
        );
        assert_eq!(ctx.query_text("nav").await.unwrap(), None);

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);
        renderer.shutdown().await.expect("shutdown failed");
    }

    #[test]
    fn test_find_chromium_prefers_existing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"").unwrap();
        assert_eq!(find_chromium(Some(&fake)), Some(fake));
    }
}
