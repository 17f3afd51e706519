//! In-process surfaces backed by a [`DomTree`].
//!
//! Used when no Chromium binary is available and in tests. Injecting the
//! capture script installs a native [`CaptureListener`]; on relaxed surfaces
//! its actions are published as tagged console lines exactly like a real page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use action_locator::{DomTree, NodeId};
use async_trait::async_trait;
use cdp_adapter::{
    AdapterError, AdapterErrorKind, BrowsingSurface, InteractiveSurface, Isolation, SurfaceEvent,
    SurfaceFactory,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;
use workflow_core_types::{Bounds, CapturedAction, ScrollOffset, SurfaceId};

use crate::listener::{CaptureListener, SCROLL_DEBOUNCE};
use crate::script::is_capture_script;
use crate::transport::{encode_line, ACTION_TAG};

const EVENT_BUFFER: usize = 256;

/// URL of a freshly created surface.
pub const BLANK_URL: &str = "about:blank";

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

#[derive(Clone, Debug)]
pub struct SimulatedOptions {
    pub tag: String,
    pub scroll_debounce: Duration,
}

impl Default for SimulatedOptions {
    fn default() -> Self {
        Self {
            tag: ACTION_TAG.to_string(),
            scroll_debounce: SCROLL_DEBOUNCE,
        }
    }
}

/// Operations forced to fail on a surface.
#[derive(Debug, Default)]
pub struct FailurePlan {
    load: AtomicBool,
    script: AtomicBool,
    current_url: AtomicBool,
}

impl FailurePlan {
    pub fn fail_loads(&self, flag: bool) {
        self.load.store(flag, Ordering::SeqCst);
    }

    pub fn fail_scripts(&self, flag: bool) {
        self.script.store(flag, Ordering::SeqCst);
    }

    pub fn fail_current_url(&self, flag: bool) {
        self.current_url.store(flag, Ordering::SeqCst);
    }

    fn copy(&self) -> FailurePlan {
        FailurePlan {
            load: AtomicBool::new(self.load.load(Ordering::SeqCst)),
            script: AtomicBool::new(self.script.load(Ordering::SeqCst)),
            current_url: AtomicBool::new(self.current_url.load(Ordering::SeqCst)),
        }
    }
}

struct PageState {
    url: String,
    tree: DomTree,
    listener: Option<CaptureListener>,
    scroll: ScrollOffset,
    bounds: Bounds,
    scripts: Vec<String>,
}

impl PageState {
    fn blank() -> Self {
        Self {
            url: BLANK_URL.to_string(),
            tree: DomTree::new(),
            listener: None,
            scroll: ScrollOffset::ORIGIN,
            bounds: Bounds::default(),
            scripts: Vec::new(),
        }
    }

    /// Replaces the document; injected state does not survive.
    fn replace_document(&mut self, url: &str) {
        self.url = url.to_string();
        self.tree = match Url::parse(url) {
            Ok(parsed) => DomTree::new().with_base_url(parsed),
            Err(_) => DomTree::new(),
        };
        self.listener = None;
        self.scroll = ScrollOffset::ORIGIN;
    }
}

pub struct SimulatedSurface {
    id: SurfaceId,
    isolation: Isolation,
    options: SimulatedOptions,
    state: Mutex<PageState>,
    events: broadcast::Sender<SurfaceEvent>,
    closed: AtomicBool,
    failures: FailurePlan,
}

impl SimulatedSurface {
    pub fn new(isolation: Isolation, options: SimulatedOptions) -> Arc<Self> {
        Self::with_failures(isolation, options, FailurePlan::default())
    }

    fn with_failures(
        isolation: Isolation,
        options: SimulatedOptions,
        failures: FailurePlan,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            id: SurfaceId::new(),
            isolation,
            options,
            state: Mutex::new(PageState::blank()),
            events,
            closed: AtomicBool::new(false),
            failures,
        })
    }

    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    pub fn failures(&self) -> &FailurePlan {
        &self.failures
    }

    pub fn url(&self) -> String {
        self.state.lock().url.clone()
    }

    pub fn bounds(&self) -> Bounds {
        self.state.lock().bounds
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Every script evaluated on this surface, in order.
    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().scripts.clone()
    }

    pub fn listener_attached(&self) -> bool {
        self.state
            .lock()
            .listener
            .as_ref()
            .is_some_and(CaptureListener::is_attached)
    }

    /// Mutable access to the current document.
    pub fn with_dom<R>(&self, f: impl FnOnce(&mut DomTree) -> R) -> R {
        f(&mut self.state.lock().tree)
    }

    /// User click on `node` at the current scroll position.
    pub fn click(&self, node: NodeId) {
        let emitted = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let scroll = state.scroll;
            match state.listener.as_mut() {
                Some(listener) => listener.on_click(&state.tree, node, scroll, now_ms()),
                None => Vec::new(),
            }
        };
        self.publish(emitted);
    }

    /// User typing into `node`, leaving `value` in the field.
    pub fn input(&self, node: NodeId, value: &str) -> Result<(), AdapterError> {
        let emitted = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.tree.set_value(node, value).map_err(|err| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string())
            })?;
            match state.listener.as_mut() {
                Some(listener) => listener.on_input(&state.tree, node, now_ms()),
                None => None,
            }
        };
        self.publish(emitted.into_iter().collect());
        Ok(())
    }

    /// User scroll; the listener settles after its debounce window.
    pub fn scroll_to(self: &Arc<Self>, offset: ScrollOffset) {
        let deadline = {
            let mut state = self.state.lock();
            state.scroll = offset;
            let Some(listener) = state.listener.as_mut() else {
                return;
            };
            listener.on_scroll(offset, Instant::now());
            listener.scroll_deadline()
        };
        let Some(deadline) = deadline else {
            return;
        };
        let surface = Arc::downgrade(self);
        let wait = self.options.scroll_debounce;
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(surface) = surface.upgrade() {
                surface.settle_scroll(Some(deadline));
            }
        });
    }

    /// Emits a pending scroll immediately.
    pub fn flush_scroll(&self) {
        self.settle_scroll(None);
    }

    fn settle_scroll(&self, scheduled: Option<Instant>) {
        let emitted = {
            let mut state = self.state.lock();
            let Some(listener) = state.listener.as_mut() else {
                return;
            };
            let Some(deadline) = listener.scroll_deadline() else {
                return;
            };
            // A later scroll rescheduled the window.
            if scheduled.is_some_and(|at| at != deadline) {
                return;
            }
            listener.poll(deadline, now_ms())
        };
        self.publish(emitted.into_iter().collect());
    }

    /// Navigation initiated by the page, e.g. following a link.
    pub fn follow_link(&self, url: &str) {
        self.state.lock().replace_document(url);
        self.send(SurfaceEvent::Navigated {
            url: url.to_string(),
        });
        self.send(SurfaceEvent::LoadFinished);
    }

    /// Same-document navigation through the history API.
    pub fn push_history(&self, url: &str) {
        self.state.lock().url = url.to_string();
        self.send(SurfaceEvent::NavigatedInPage {
            url: url.to_string(),
        });
    }

    /// Emits a raw console line from page script.
    pub fn console_log(&self, text: &str) {
        if matches!(self.isolation, Isolation::Relaxed) {
            self.send(SurfaceEvent::ConsoleMessage {
                level: "log".into(),
                text: text.to_string(),
            });
        }
    }

    fn publish(&self, actions: Vec<CapturedAction>) {
        for action in actions {
            self.console_log(&encode_line(&self.options.tag, &action));
        }
    }

    fn send(&self, event: SurfaceEvent) {
        let _ = self.events.send(event);
    }

    fn ensure_open(&self) -> Result<(), AdapterError> {
        if self.is_closed() {
            return Err(AdapterError::surface_closed(&self.id));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowsingSurface for SimulatedSurface {
    async fn current_url(&self) -> Result<String, AdapterError> {
        self.ensure_open()?;
        if self.failures.current_url.load(Ordering::SeqCst) {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint("current url unavailable"));
        }
        Ok(self.url())
    }

    async fn load_url(&self, url: &str) -> Result<(), AdapterError> {
        self.ensure_open()?;
        if self.failures.load.load(Ordering::SeqCst) {
            return Err(AdapterError::new(AdapterErrorKind::NavFailed)
                .with_hint(format!("{url}: simulated failure"))
                .retriable(true));
        }
        debug!(target: "action-capture", surface = %self.id, url, "simulated load");
        self.state.lock().replace_document(url);
        self.send(SurfaceEvent::Navigated {
            url: url.to_string(),
        });
        self.send(SurfaceEvent::LoadFinished);
        Ok(())
    }
}

#[async_trait]
impl InteractiveSurface for SimulatedSurface {
    fn id(&self) -> &SurfaceId {
        &self.id
    }

    async fn execute_script(&self, source: &str) -> Result<Value, AdapterError> {
        self.ensure_open()?;
        if self.failures.script.load(Ordering::SeqCst) {
            return Err(AdapterError::new(AdapterErrorKind::ScriptFailed)
                .with_hint("simulated script failure"));
        }
        let mut state = self.state.lock();
        state.scripts.push(source.to_string());
        if !is_capture_script(source) {
            return Ok(Value::Null);
        }
        let debounce = self.options.scroll_debounce;
        let installed = state
            .listener
            .get_or_insert_with(|| CaptureListener::new(debounce))
            .attach();
        Ok(Value::Bool(installed))
    }

    async fn set_bounds(&self, bounds: Bounds) -> Result<(), AdapterError> {
        self.ensure_open()?;
        self.state.lock().bounds = bounds;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<(), AdapterError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.send(SurfaceEvent::Closed);
        Ok(())
    }
}

/// Factory of simulated surfaces; keeps every surface it created.
#[derive(Default)]
pub struct SimulatedBrowser {
    options: SimulatedOptions,
    fail_create: AtomicBool,
    defaults: FailurePlan,
    created: Mutex<Vec<Arc<SimulatedSurface>>>,
}

impl SimulatedBrowser {
    pub fn new(options: SimulatedOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Hidden automation surface; not counted among created surfaces.
    pub fn hidden(&self) -> Arc<SimulatedSurface> {
        SimulatedSurface::new(Isolation::Sandboxed, self.options.clone())
    }

    pub fn fail_create(&self, flag: bool) {
        self.fail_create.store(flag, Ordering::SeqCst);
    }

    /// Failures applied to surfaces created from now on.
    pub fn defaults(&self) -> &FailurePlan {
        &self.defaults
    }

    pub fn open(&self, isolation: Isolation) -> Result<Arc<SimulatedSurface>, AdapterError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint("simulated surface creation failure"));
        }
        let surface =
            SimulatedSurface::with_failures(isolation, self.options.clone(), self.defaults.copy());
        self.created.lock().push(Arc::clone(&surface));
        Ok(surface)
    }

    pub fn created(&self) -> Vec<Arc<SimulatedSurface>> {
        self.created.lock().clone()
    }

    pub fn last_created(&self) -> Option<Arc<SimulatedSurface>> {
        self.created.lock().last().cloned()
    }
}

#[async_trait]
impl SurfaceFactory for SimulatedBrowser {
    async fn create(
        &self,
        isolation: Isolation,
    ) -> Result<Arc<dyn InteractiveSurface>, AdapterError> {
        let surface = self.open(isolation)?;
        Ok(surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{capture_script, ScriptOptions};
    use crate::transport::decode_line;
    use action_locator::ElementSpec;
    use workflow_core_types::ActionKind;

    async fn recording_surface() -> (Arc<SimulatedSurface>, broadcast::Receiver<SurfaceEvent>) {
        let surface = SimulatedSurface::new(Isolation::Relaxed, SimulatedOptions::default());
        surface.load_url("https://example.com/").await.unwrap();
        let rx = surface.subscribe();
        let installed = surface
            .execute_script(&capture_script(&ScriptOptions::default()))
            .await
            .unwrap();
        assert_eq!(installed, Value::Bool(true));
        (surface, rx)
    }

    fn next_action(rx: &mut broadcast::Receiver<SurfaceEvent>) -> CapturedAction {
        match rx.try_recv().unwrap() {
            SurfaceEvent::ConsoleMessage { text, .. } => {
                decode_line(ACTION_TAG, &text).unwrap().unwrap()
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn injected_listener_reports_over_console() {
        let (surface, mut rx) = recording_surface().await;
        let button = surface.with_dom(|tree| {
            tree.append(tree.body(), ElementSpec::new("button").id("submit"))
                .unwrap()
        });
        surface.click(button);
        assert_eq!(next_action(&mut rx).selector(), Some("#submit"));

        let again = surface
            .execute_script(&capture_script(&ScriptOptions::default()))
            .await
            .unwrap();
        assert_eq!(again, Value::Bool(false));
    }

    #[tokio::test]
    async fn navigation_drops_injected_listener() {
        let (surface, mut rx) = recording_surface().await;
        surface.follow_link("https://example.com/next");
        assert!(matches!(rx.try_recv().unwrap(), SurfaceEvent::Navigated { .. }));
        assert_eq!(rx.try_recv().unwrap(), SurfaceEvent::LoadFinished);
        assert!(!surface.listener_attached());
    }

    #[tokio::test]
    async fn flushed_scroll_is_emitted_once() {
        let (surface, mut rx) = recording_surface().await;
        surface.scroll_to(ScrollOffset::new(0, 400));
        surface.flush_scroll();
        let action = next_action(&mut rx);
        assert_eq!(action.kind(), ActionKind::Scroll);
        assert_eq!(action.scroll_offset(), Some(ScrollOffset::new(0, 400)));
        surface.flush_scroll();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn sandboxed_surface_keeps_console_private() {
        let surface = SimulatedSurface::new(Isolation::Sandboxed, SimulatedOptions::default());
        let mut rx = surface.subscribe();
        surface.console_log("[WORKFLOW_ACTION] {}");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_surface_rejects_operations() {
        let browser = SimulatedBrowser::default();
        let surface = browser.open(Isolation::Sandboxed).unwrap();
        surface.close().await.unwrap();
        surface.close().await.unwrap();
        let err = surface.load_url("https://example.com").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::SurfaceClosed);
        assert_eq!(browser.created().len(), 1);
    }
}
