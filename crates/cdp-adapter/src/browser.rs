//! Chromium-backed surfaces.
//!
//! Every surface is a page target in its own window, attached with a
//! flattened session. A single event loop routes session events into the
//! owning page's broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use workflow_core_types::{Bounds, SurfaceId};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::metrics;
use crate::registry::{Registry, SurfaceRoute};
use crate::surface::{BrowsingSurface, InteractiveSurface, Isolation, SurfaceEvent, SurfaceFactory};
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

const EVENT_BUFFER: usize = 256;

async fn send_with_metrics(
    transport: &dyn CdpTransport,
    target: CommandTarget,
    method: &str,
    params: Value,
) -> Result<Value, AdapterError> {
    let start = Instant::now();
    metrics::record_command(method);
    match transport.send_command(target, method, params).await {
        Ok(value) => {
            metrics::record_command_success(method, start.elapsed());
            Ok(value)
        }
        Err(err) => {
            metrics::record_command_failure(method);
            Err(err)
        }
    }
}

fn str_field(value: &Value, field: &str, method: &str) -> Result<String, AdapterError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("{method} response missing {field}"))
                .with_data(value.clone())
        })
}

/// Browser connection owning the event loop and surface registry.
pub struct CdpBrowser {
    cfg: CdpConfig,
    transport: Arc<dyn CdpTransport>,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CdpBrowser {
    pub fn new(cfg: CdpConfig) -> Self {
        let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cfg.clone()));
        Self::with_transport(cfg, transport)
    }

    pub fn with_transport(cfg: CdpConfig, transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            cfg,
            transport,
            registry: Arc::new(Registry::new()),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &CdpConfig {
        &self.cfg
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Connects the transport and spawns the event loop. Idempotent.
    pub async fn start(self: Arc<Self>) -> Result<(), AdapterError> {
        let mut guard = self.tasks.lock().await;
        if !guard.is_empty() {
            return Ok(());
        }
        self.transport.start().await?;
        guard.push(spawn(Self::event_loop(Arc::clone(&self))));
        info!(target: "cdp-adapter", "event loop started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut handles = self.tasks.lock().await;
        while let Some(handle) = handles.pop() {
            let _ = handle.await;
        }
        for route in self.registry.drain() {
            let _ = route.events.send(SurfaceEvent::Closed);
        }
    }

    /// Opens a page target in a new window and attaches to it.
    pub async fn open_page(&self, isolation: Isolation) -> Result<Arc<CdpPage>, AdapterError> {
        let created = self
            .send_browser(
                "Target.createTarget",
                json!({ "url": "about:blank", "newWindow": true }),
            )
            .await?;
        let target_id = str_field(&created, "targetId", "Target.createTarget")?;

        let attached = self
            .send_browser(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session = str_field(&attached, "sessionId", "Target.attachToTarget")?;

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let page = Arc::new(CdpPage {
            id: SurfaceId::new(),
            target_id: target_id.clone(),
            session: session.clone(),
            isolation,
            transport: Arc::clone(&self.transport),
            registry: Arc::clone(&self.registry),
            events: events.clone(),
            load_deadline: Duration::from_millis(self.cfg.default_deadline_ms),
            closed: AtomicBool::new(false),
        });
        self.registry.insert(SurfaceRoute {
            surface: page.id.clone(),
            target_id,
            cdp_session: session,
            events,
        });

        if let Err(err) = page.enable_domains().await {
            if let Err(close_err) = page.close().await {
                debug!(target: "cdp-adapter", ?close_err, "close after failed attach");
            }
            return Err(err);
        }

        info!(
            target: "cdp-adapter",
            surface = %page.id,
            target_id = %page.target_id,
            ?isolation,
            "surface attached"
        );
        Ok(page)
    }

    /// Opens the automation page and minimises its window.
    pub async fn open_hidden(&self) -> Result<Arc<CdpPage>, AdapterError> {
        let page = self.open_page(Isolation::Sandboxed).await?;
        if let Err(err) = page.set_window_state("minimized").await {
            warn!(target: "cdp-adapter", ?err, "could not minimise hidden surface window");
        }
        Ok(page)
    }

    async fn send_browser(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        send_with_metrics(self.transport.as_ref(), CommandTarget::Browser, method, params).await
    }

    async fn event_loop(self: Arc<Self>) {
        debug!(target: "cdp-adapter", "event loop entered");
        const MIN_BACKOFF: Duration = Duration::from_millis(100);
        const MAX_BACKOFF: Duration = Duration::from_secs(5);
        let mut backoff = MIN_BACKOFF;

        loop {
            select! {
                _ = self.shutdown.cancelled() => {
                    break;
                }
                event = self.transport.next_event() => {
                    match event {
                        Some(ev) => {
                            backoff = MIN_BACKOFF;
                            self.process_event(ev);
                        }
                        None => {
                            if self.shutdown.is_cancelled() {
                                break;
                            }
                            self.handle_transport_disconnect();
                            warn!(target: "cdp-adapter", "transport stream ended; attempting restart");
                            if let Err(err) = self.transport.start().await {
                                warn!(target: "cdp-adapter", ?err, "transport restart failed");
                            }
                            sleep(backoff).await;
                            backoff = (backoff + MIN_BACKOFF).min(MAX_BACKOFF);
                        }
                    }
                }
            }
        }
        debug!(target: "cdp-adapter", "event loop exiting");
    }

    fn handle_transport_disconnect(&self) {
        let routes = self.registry.drain();
        if !routes.is_empty() {
            warn!(
                target: "cdp-adapter",
                surfaces = routes.len(),
                "cdp transport lost; closing attached surfaces"
            );
        }
        for route in routes {
            Self::deliver(&route, SurfaceEvent::Closed);
        }
    }

    fn process_event(&self, event: TransportEvent) {
        metrics::record_event();
        match event.method.as_str() {
            "Target.targetDestroyed" => {
                let route = event
                    .params
                    .get("targetId")
                    .and_then(Value::as_str)
                    .and_then(|target| self.registry.remove_target(target));
                if let Some(route) = route {
                    Self::deliver(&route, SurfaceEvent::Closed);
                }
            }
            "Target.detachedFromTarget" => {
                let route = event
                    .params
                    .get("sessionId")
                    .and_then(Value::as_str)
                    .and_then(|session| self.registry.remove_session(session));
                if let Some(route) = route {
                    Self::deliver(&route, SurfaceEvent::Closed);
                }
            }
            method => {
                let Some(route) = event
                    .session_id
                    .as_deref()
                    .and_then(|session| self.registry.by_session(session))
                else {
                    debug!(target: "cdp-adapter", %method, "unrouted cdp event");
                    return;
                };
                match surface_event_for(method, &event.params, &route.target_id) {
                    Some(mapped) => Self::deliver(&route, mapped),
                    None => debug!(target: "cdp-adapter", %method, "unhandled cdp event"),
                }
            }
        }
    }

    fn deliver(route: &SurfaceRoute, event: SurfaceEvent) {
        metrics::record_surface_event(event.kind());
        // No subscribers is normal between mode transitions.
        let _ = route.events.send(event);
    }
}

#[async_trait]
impl SurfaceFactory for CdpBrowser {
    async fn create(
        &self,
        isolation: Isolation,
    ) -> Result<Arc<dyn InteractiveSurface>, AdapterError> {
        let page = self.open_page(isolation).await?;
        Ok(page)
    }
}

/// Maps a session event to a surface event. Child-frame navigations are
/// ignored; the main frame id equals the target id.
pub fn surface_event_for(method: &str, params: &Value, target_id: &str) -> Option<SurfaceEvent> {
    match method {
        "Page.frameNavigated" => {
            let frame = params.get("frame")?;
            if frame.get("parentId").is_some_and(|parent| !parent.is_null()) {
                return None;
            }
            let mut url = frame.get("url")?.as_str()?.to_string();
            if let Some(fragment) = frame.get("urlFragment").and_then(Value::as_str) {
                url.push_str(fragment);
            }
            Some(SurfaceEvent::Navigated { url })
        }
        "Page.navigatedWithinDocument" => {
            let frame_id = params.get("frameId").and_then(Value::as_str);
            if frame_id.is_some_and(|id| id != target_id) {
                return None;
            }
            let url = params.get("url")?.as_str()?.to_string();
            Some(SurfaceEvent::NavigatedInPage { url })
        }
        "Page.loadEventFired" => Some(SurfaceEvent::LoadFinished),
        "Runtime.consoleAPICalled" => {
            let level = params
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("log")
                .to_string();
            let text = params
                .get("args")
                .and_then(Value::as_array)
                .map(|args| {
                    args.iter()
                        .filter_map(render_console_arg)
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();
            Some(SurfaceEvent::ConsoleMessage { level, text })
        }
        "Inspector.detached" => Some(SurfaceEvent::Closed),
        _ => None,
    }
}

fn render_console_arg(arg: &Value) -> Option<String> {
    if let Some(value) = arg.get("value") {
        return Some(match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        });
    }
    arg.get("unserializableValue")
        .or_else(|| arg.get("description"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// One attached page target.
pub struct CdpPage {
    id: SurfaceId,
    target_id: String,
    session: String,
    isolation: Isolation,
    transport: Arc<dyn CdpTransport>,
    registry: Arc<Registry>,
    events: broadcast::Sender<SurfaceEvent>,
    load_deadline: Duration,
    closed: AtomicBool,
}

impl CdpPage {
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    fn ensure_open(&self) -> Result<(), AdapterError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AdapterError::surface_closed(&self.id));
        }
        Ok(())
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        self.ensure_open()?;
        send_with_metrics(
            self.transport.as_ref(),
            CommandTarget::Session(self.session.clone()),
            method,
            params,
        )
        .await
    }

    async fn send_browser(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        self.ensure_open()?;
        send_with_metrics(self.transport.as_ref(), CommandTarget::Browser, method, params).await
    }

    async fn enable_domains(&self) -> Result<(), AdapterError> {
        self.send("Page.enable", json!({})).await?;
        if matches!(self.isolation, Isolation::Relaxed) {
            self.send("Runtime.enable", json!({})).await?;
        }
        Ok(())
    }

    async fn window_id(&self) -> Result<Value, AdapterError> {
        let response = self
            .send_browser(
                "Browser.getWindowForTarget",
                json!({ "targetId": self.target_id }),
            )
            .await?;
        response.get("windowId").cloned().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint("Browser.getWindowForTarget response missing windowId")
        })
    }

    async fn set_window_state(&self, state: &str) -> Result<(), AdapterError> {
        let window_id = self.window_id().await?;
        self.send_browser(
            "Browser.setWindowBounds",
            json!({ "windowId": window_id, "bounds": { "windowState": state } }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BrowsingSurface for CdpPage {
    async fn current_url(&self) -> Result<String, AdapterError> {
        let response = self
            .send_browser("Target.getTargetInfo", json!({ "targetId": self.target_id }))
            .await?;
        response
            .get("targetInfo")
            .and_then(|info| info.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("Target.getTargetInfo response missing url")
            })
    }

    async fn load_url(&self, url: &str) -> Result<(), AdapterError> {
        let mut rx = self.events.subscribe();
        let response = self.send("Page.navigate", json!({ "url": url })).await?;

        if let Some(error_text) = response
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            return Err(AdapterError::new(AdapterErrorKind::NavFailed)
                .with_hint(format!("{url}: {error_text}"))
                .retriable(true));
        }

        // Same-document navigations commit without a new loader.
        if response.get("loaderId").is_none() {
            return Ok(());
        }

        let wait = async {
            let mut committed = false;
            loop {
                match rx.recv().await {
                    Ok(SurfaceEvent::Navigated { .. }) => committed = true,
                    Ok(SurfaceEvent::LoadFinished) if committed => return Ok(()),
                    Ok(SurfaceEvent::Closed) | Err(broadcast::error::RecvError::Closed) => {
                        return Err(AdapterError::surface_closed(&self.id));
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                }
            }
        };

        tokio::time::timeout(self.load_deadline, wait)
            .await
            .map_err(|_| {
                AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint(format!("load of {url} did not finish"))
                    .retriable(true)
            })?
    }
}

#[async_trait]
impl InteractiveSurface for CdpPage {
    fn id(&self) -> &SurfaceId {
        &self.id
    }

    async fn execute_script(&self, source: &str) -> Result<Value, AdapterError> {
        let response = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": source,
                    "awaitPromise": true,
                    "returnByValue": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            return Err(AdapterError::new(AdapterErrorKind::ScriptFailed)
                .with_hint("script raised exception")
                .with_data(details.clone()));
        }

        Ok(response
            .get("result")
            .and_then(|res| res.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn set_bounds(&self, bounds: Bounds) -> Result<(), AdapterError> {
        let window_id = self.window_id().await?;
        self.send_browser(
            "Browser.setWindowBounds",
            json!({ "windowId": window_id, "bounds": { "windowState": "normal" } }),
        )
        .await?;
        self.send_browser(
            "Browser.setWindowBounds",
            json!({
                "windowId": window_id,
                "bounds": {
                    "left": bounds.x,
                    "top": bounds.y,
                    "width": bounds.width,
                    "height": bounds.height,
                },
            }),
        )
        .await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<(), AdapterError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.registry.remove_session(&self.session);
        let result = send_with_metrics(
            self.transport.as_ref(),
            CommandTarget::Browser,
            "Target.closeTarget",
            json!({ "targetId": self.target_id }),
        )
        .await;
        let _ = self.events.send(SurfaceEvent::Closed);
        info!(target: "cdp-adapter", surface = %self.id, "surface closed");
        result.map(|_| ())
    }
}
