//! Scripted in-memory renderer for exercising navigation without Chromium.
//!
//! Each URL is given a queue of [`FakeDom`] snapshots; every navigation to
//! that URL pops the next one (the last snapshot repeats once the queue is
//! down to one). Launches, page closes and engine shutdowns are recorded in a
//! shared [`ScriptLog`] so tests can assert on lifecycle ordering.

use super::{BrowserCookie, NavigationResult, RenderContext, Renderer, RendererLauncher, SelectorHit};
use crate::profile::DetectionProfile;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One element of a fake page.
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub text: String,
    pub html: String,
    pub attributes: HashMap<String, String>,
}

impl FakeElement {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            html: text.to_string(),
            attributes: HashMap::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }
}

/// A page snapshot: selector → element, plus what a challenge click turns it into.
#[derive(Debug, Clone, Default)]
pub struct FakeDom {
    pub elements: HashMap<String, FakeElement>,
    pub after_click: Option<Box<FakeDom>>,
    pub navigation_fails: bool,
    /// Navigation runs until its timeout.
    pub navigation_hangs: bool,
    /// Selector waits run until their timeout.
    pub selectors_hang: bool,
}

impl FakeDom {
    pub fn with(mut self, selector: &str, element: FakeElement) -> Self {
        self.elements.insert(selector.to_string(), element);
        self
    }

    /// A normally rendered page showing the content marker.
    pub fn content(detection: &DetectionProfile) -> Self {
        Self::default().with(&detection.content_selector, FakeElement::text("content"))
    }

    /// The hard denial page.
    pub fn denied(detection: &DetectionProfile) -> Self {
        Self::default().with(
            &detection.denial_selector,
            FakeElement::text(&detection.denial_text),
        )
    }

    /// The challenge interstitial; clicking the widget yields `solved`.
    pub fn challenge(detection: &DetectionProfile, solved: FakeDom) -> Self {
        Self::default()
            .with(
                &detection.challenge_selector,
                FakeElement::text(&detection.challenge_text),
            )
            .with(&detection.challenge_frame_selector, FakeElement::default())
            .with_after_click(solved)
    }

    /// A transport failure.
    pub fn unreachable() -> Self {
        Self {
            navigation_fails: true,
            ..Self::default()
        }
    }

    /// A navigation that never finishes loading.
    pub fn hanging() -> Self {
        Self {
            navigation_hangs: true,
            ..Self::default()
        }
    }

    /// A page that loads but never shows any detection selector.
    pub fn stalled() -> Self {
        Self {
            selectors_hang: true,
            ..Self::default()
        }
    }

    pub fn with_after_click(mut self, dom: FakeDom) -> Self {
        self.after_click = Some(Box::new(dom));
        self
    }
}

/// Lifecycle events recorded by the scripted engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEvent {
    Launched(u64),
    ContextOpened { engine: u64, context: u64 },
    CookiesSet { context: u64, count: usize },
    Navigated { context: u64, url: String },
    Clicked { context: u64 },
    ContextClosed(u64),
    EngineShutdown(u64),
}

#[derive(Default)]
struct ScriptState {
    pages: HashMap<String, VecDeque<FakeDom>>,
    events: Vec<ScriptEvent>,
    cookies: Vec<Vec<BrowserCookie>>,
    next_engine: u64,
    next_context: u64,
    fail_launches: usize,
}

/// Shared handle on the script and its recorded events.
#[derive(Clone, Default)]
pub struct ScriptLog {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptLog {
    pub fn events(&self) -> Vec<ScriptEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn launches(&self) -> usize {
        self.count(|e| matches!(e, ScriptEvent::Launched(_)))
    }

    pub fn shutdowns(&self) -> usize {
        self.count(|e| matches!(e, ScriptEvent::EngineShutdown(_)))
    }

    pub fn clicks(&self) -> usize {
        self.count(|e| matches!(e, ScriptEvent::Clicked { .. }))
    }

    /// URLs navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter_map(|e| match e {
                ScriptEvent::Navigated { url, .. } => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    /// Cookie sets installed into each context, in order.
    pub fn installed_cookies(&self) -> Vec<Vec<BrowserCookie>> {
        self.state.lock().unwrap().cookies.clone()
    }

    fn count(&self, pred: impl Fn(&ScriptEvent) -> bool) -> usize {
        self.state.lock().unwrap().events.iter().filter(|e| pred(e)).count()
    }

    fn record(&self, event: ScriptEvent) {
        self.state.lock().unwrap().events.push(event);
    }
}

/// Launcher over a script of pages.
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    log: ScriptLog,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue snapshots served for successive navigations to `url`.
    pub fn page(self, url: &str, doms: Vec<FakeDom>) -> Self {
        self.log
            .state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), doms.into());
        self
    }

    /// Make the next `n` launches fail.
    pub fn failing_launches(self, n: usize) -> Self {
        self.log.state.lock().unwrap().fail_launches = n;
        self
    }

    pub fn log(&self) -> ScriptLog {
        self.log.clone()
    }
}

#[async_trait]
impl RendererLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        let id = {
            let mut state = self.log.state.lock().unwrap();
            if state.fail_launches > 0 {
                state.fail_launches -= 1;
                bail!("scripted launch failure");
            }
            state.next_engine += 1;
            state.next_engine
        };
        self.log.record(ScriptEvent::Launched(id));
        Ok(Box::new(ScriptedEngine {
            id,
            log: self.log.clone(),
            active: Arc::new(Mutex::new(0)),
        }))
    }
}

struct ScriptedEngine {
    id: u64,
    log: ScriptLog,
    active: Arc<Mutex<usize>>,
}

#[async_trait]
impl Renderer for ScriptedEngine {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let context = {
            let mut state = self.log.state.lock().unwrap();
            state.next_context += 1;
            state.next_context
        };
        *self.active.lock().unwrap() += 1;
        self.log.record(ScriptEvent::ContextOpened {
            engine: self.id,
            context,
        });
        Ok(Box::new(ScriptedContext {
            id: context,
            log: self.log.clone(),
            dom: Mutex::new(FakeDom::default()),
            active: Arc::clone(&self.active),
        }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        self.log.record(ScriptEvent::EngineShutdown(self.id));
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        *self.active.lock().unwrap()
    }
}

struct ScriptedContext {
    id: u64,
    log: ScriptLog,
    dom: Mutex<FakeDom>,
    active: Arc<Mutex<usize>>,
}

impl ScriptedContext {
    fn element(&self, selector: &str) -> Option<FakeElement> {
        self.dom.lock().unwrap().elements.get(selector).cloned()
    }
}

#[async_trait]
impl RenderContext for ScriptedContext {
    fn id(&self) -> u64 {
        self.id
    }

    async fn set_cookies(&mut self, cookies: &[BrowserCookie]) -> Result<()> {
        let mut state = self.log.state.lock().unwrap();
        state.cookies.push(cookies.to_vec());
        state.events.push(ScriptEvent::CookiesSet {
            context: self.id,
            count: cookies.len(),
        });
        Ok(())
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult> {
        let next = {
            let mut state = self.log.state.lock().unwrap();
            state.events.push(ScriptEvent::Navigated {
                context: self.id,
                url: url.to_string(),
            });
            match state.pages.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        let Some(dom) = next else {
            bail!("no scripted page for {url}");
        };
        if dom.navigation_fails {
            bail!("scripted navigation failure for {url}");
        }
        if dom.navigation_hangs {
            tokio::time::sleep(timeout).await;
            bail!("navigation to {url} timed out");
        }
        *self.dom.lock().unwrap() = dom;
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 1,
        })
    }

    async fn first_match(
        &self,
        selectors: &[&str],
        timeout: Duration,
    ) -> Result<Option<SelectorHit>> {
        let hit = {
            let dom = self.dom.lock().unwrap();
            if dom.selectors_hang {
                None
            } else {
                Some(selectors.iter().enumerate().find_map(|(index, sel)| {
                    dom.elements.get(*sel).map(|el| SelectorHit {
                        index,
                        text: el.text.clone(),
                    })
                }))
            }
        };
        match hit {
            Some(hit) => Ok(hit),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    async fn click_in_frame(&self, frame: &str, _target: &str, _timeout: Duration) -> Result<()> {
        let mut dom = self.dom.lock().unwrap();
        if !dom.elements.contains_key(frame) {
            bail!("frame {frame} not present");
        }
        self.log.record(ScriptEvent::Clicked { context: self.id });
        if let Some(next) = dom.after_click.take() {
            *dom = *next;
        }
        Ok(())
    }

    async fn query_text(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.element(selector).map(|e| e.text))
    }

    async fn query_html(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.element(selector).map(|e| e.html))
    }

    async fn query_attribute(&self, selector: &str, attribute: &str) -> Result<Option<String>> {
        Ok(self
            .element(selector)
            .and_then(|e| e.attributes.get(attribute).cloned()))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        *self.active.lock().unwrap() -= 1;
        self.log.record(ScriptEvent::ContextClosed(self.id));
        Ok(())
    }
}
