//! Raw DevTools connection shared by both surfaces.
//!
//! [`ChromiumTransport`] owns one websocket to Chromium. Commands are
//! multiplexed over it with flattened page sessions and every protocol event
//! is forwarded unfiltered; [`crate::browser::CdpBrowser`] routes them to the
//! surface that owns the session.

use std::collections::HashMap;
use std::convert::TryInto;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId};
use futures::io::{AsyncBufReadExt, BufReader};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};

const DEVTOOLS_BANNER_TIMEOUT: Duration = Duration::from_secs(20);

/// Raw CDP event; `session_id` is set for events of attached page sessions.
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    /// Connects (launching Chromium when needed) and enables target discovery.
    /// Calling it again while connected is a no-op; after the connection
    /// dropped it reconnects.
    async fn start(&self) -> Result<(), AdapterError>;
    /// Next protocol event, `None` once the connection is gone.
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

type Reply = oneshot::Sender<Result<Value, AdapterError>>;

struct Outgoing {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: Reply,
}

/// One live websocket plus the Chromium process behind it, if we launched it.
struct Link {
    commands: mpsc::Sender<Outgoing>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    pump: JoinHandle<()>,
    chromium: Option<Child>,
}

impl Link {
    fn is_open(&self) -> bool {
        !self.pump.is_finished() && !self.commands.is_closed()
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(Outgoing {
                target,
                method: method.to_string(),
                params,
                reply,
            })
            .await
            .map_err(|_| connection_closed())?;

        match tokio::time::timeout(deadline, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(connection_closed()),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                .with_hint(format!("{method} timed out"))
                .retriable(true)),
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.pump.abort();
        let Some(mut child) = self.chromium.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "cdp-transport", ?err, "failed to stop chromium");
                    }
                });
            }
            Err(_) => debug!(target: "cdp-transport", "no runtime left to stop chromium"),
        }
    }
}

/// Transport over a real Chromium: either one we launch with the remote
/// debugging port open for the automation server, or an already running
/// browser given by `websocket_url`.
pub struct ChromiumTransport {
    cfg: CdpConfig,
    link: Mutex<Option<Arc<Link>>>,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms)
    }

    async fn current(&self) -> Option<Arc<Link>> {
        self.link.lock().await.clone()
    }

    async fn open(&self) -> Result<Link, AdapterError> {
        let (chromium, ws_url) = match &self.cfg.websocket_url {
            Some(url) => (None, url.clone()),
            None => {
                let mut child = launch_options(&self.cfg)?.launch().map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Internal)
                        .with_hint(format!("failed to launch chromium: {err}"))
                })?;
                let url = devtools_url(&mut child).await.map_err(|err| {
                    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string())
                })?;
                (Some(child), url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;
        let (commands, outgoing) = mpsc::channel(128);
        let (forward, events) = mpsc::channel(512);
        let pump = tokio::spawn(pump(conn, outgoing, forward));
        info!(target: "cdp-transport", url = %ws_url, launched = chromium.is_some(), "connected to chromium");

        Ok(Link {
            commands,
            events: Mutex::new(events),
            pump,
            chromium,
        })
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        let mut slot = self.link.lock().await;
        if slot.as_ref().is_some_and(|link| link.is_open()) {
            return Ok(());
        }
        // Release a dead link and its process before launching again.
        *slot = None;

        let link = Arc::new(self.open().await?);
        // Pages are attached explicitly; discovery only reports destroyed
        // targets so closed windows surface as `Closed`.
        link.call(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
            self.deadline(),
        )
        .await?;
        *slot = Some(link);
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        let link = self.current().await?;
        let mut events = link.events.lock().await;
        events.recv().await
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let link = self.current().await.ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::CdpIo).with_hint("chromium not connected")
        })?;
        link.call(target, method, params, self.deadline()).await
    }
}

fn connection_closed() -> AdapterError {
    AdapterError::new(AdapterErrorKind::CdpIo)
        .with_hint("cdp connection closed")
        .retriable(true)
}

/// Moves commands out and replies and events in until either side closes.
async fn pump(
    mut conn: Connection<CdpEventMessage>,
    mut outgoing: mpsc::Receiver<Outgoing>,
    events: mpsc::Sender<TransportEvent>,
) {
    let mut waiting: HashMap<CallId, Reply> = HashMap::new();
    let reason = loop {
        tokio::select! {
            next = outgoing.recv() => {
                let Some(cmd) = next else { break connection_closed() };
                let session = match cmd.target {
                    CommandTarget::Browser => None,
                    CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
                };
                let method: MethodId = cmd.method.into();
                match conn.submit_command(method, session, cmd.params) {
                    Ok(id) => {
                        waiting.insert(id, cmd.reply);
                    }
                    Err(err) => {
                        let _ = cmd.reply.send(Err(AdapterError::new(AdapterErrorKind::CdpIo)
                            .with_hint(err.to_string())));
                    }
                }
            }
            message = conn.next() => match message {
                Some(Ok(Message::Response(resp))) => {
                    let error = resp.error.map(|err| (err.code, err.message));
                    let result = reply_result(resp.result, error);
                    if let Some(reply) = waiting.remove(&resp.id) {
                        let _ = reply.send(result);
                    }
                }
                Some(Ok(Message::Event(event))) => {
                    let raw: Result<CdpJsonEventMessage, _> = event.try_into();
                    match raw {
                        Ok(raw) => {
                            let forwarded = TransportEvent {
                                method: raw.method.into_owned(),
                                params: raw.params,
                                session_id: raw.session_id,
                            };
                            if events.send(forwarded).await.is_err() {
                                break connection_closed();
                            }
                        }
                        Err(err) => {
                            warn!(target: "cdp-transport", %err, "undecodable cdp event");
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(target: "cdp-transport", %err, "cdp connection failed");
                    break AdapterError::new(AdapterErrorKind::CdpIo)
                        .with_hint(err.to_string())
                        .retriable(true);
                }
                None => {
                    info!(target: "cdp-transport", "chromium closed the connection");
                    break connection_closed();
                }
            },
        }
    };
    for (_, reply) in waiting.drain() {
        let _ = reply.send(Err(reason.clone()));
    }
}

/// Maps a protocol reply; server-side errors (5xx codes) are retriable.
fn reply_result(
    result: Option<Value>,
    error: Option<(i64, String)>,
) -> Result<Value, AdapterError> {
    match (result, error) {
        (Some(value), _) => Ok(value),
        (None, Some((code, message))) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("cdp error {code}: {message}"))
            .retriable(code >= 500)),
        (None, None) => {
            Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("empty cdp response"))
        }
    }
}

/// Chromium flags for a shell window. Headful unless configured otherwise
/// because the interactive surface is shown to the operator.
fn launch_args(cfg: &CdpConfig) -> Vec<String> {
    let mut args: Vec<String> = [
        "--no-first-run",
        "--no-default-browser-check",
        "--disable-default-apps",
        "--disable-extensions",
        "--disable-sync",
        "--disable-dev-shm-usage",
        "--password-store=basic",
        "--use-mock-keychain",
        // The automation server connects from another origin.
        "--remote-allow-origins=*",
    ]
    .iter()
    .map(|flag| flag.to_string())
    .collect();
    if cfg.headless {
        args.push("--headless=new".into());
        args.push("--mute-audio".into());
    }
    args
}

fn profile_dir(cfg: &CdpConfig) -> Result<PathBuf, AdapterError> {
    let dir = if cfg.user_data_dir.is_absolute() {
        cfg.user_data_dir.clone()
    } else {
        std::env::current_dir()
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("cannot resolve profile directory: {err}"))
            })?
            .join(&cfg.user_data_dir)
    };
    fs::create_dir_all(&dir).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("cannot create profile directory {}: {err}", dir.display()))
    })?;
    Ok(dir)
}

fn launch_options(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    if !cfg.executable.as_os_str().is_empty() && !cfg.executable.exists() {
        return Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("chromium not found at {}", cfg.executable.display()))
            .with_data(json!({
                "hint": "Set WORKFLOW_SHELL_CHROME to the full path of chrome/chromium."
            })));
    }

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(DEVTOOLS_BANNER_TIMEOUT)
        .port(cfg.remote_debugging_port)
        .window_size(cfg.window_width, cfg.window_height)
        .user_data_dir(profile_dir(cfg)?)
        .args(launch_args(cfg));
    if !cfg.headless {
        builder = builder.with_head();
    }
    if sandbox_disabled() {
        builder = builder.no_sandbox();
    }
    if !cfg.executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(cfg.executable.clone());
    }
    builder.build().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("browser config: {err}"))
    })
}

fn sandbox_disabled() -> bool {
    std::env::var("WORKFLOW_SHELL_DISABLE_SANDBOX")
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Reads Chromium stderr until the DevTools websocket URL is announced.
async fn devtools_url(child: &mut Child) -> anyhow::Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("chromium started without stderr"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut seen = Vec::new();

    let scan = async {
        while let Some(line) = lines.next().await {
            let line = line?;
            if let Some(url) = parse_devtools_line(&line) {
                return Ok(url);
            }
            seen.push(line);
        }
        Err::<String, anyhow::Error>(anyhow::anyhow!(
            "chromium exited early: {}",
            seen.join(" | ")
        ))
    };

    tokio::time::timeout(DEVTOOLS_BANNER_TIMEOUT, scan)
        .await
        .map_err(|_| anyhow::anyhow!("no devtools url from chromium"))?
}

fn parse_devtools_line(line: &str) -> Option<String> {
    let (_, ws) = line.rsplit_once("listening on ")?;
    let ws = ws.trim();
    (ws.starts_with("ws") && ws.contains("devtools/browser")).then(|| ws.to_string())
}
