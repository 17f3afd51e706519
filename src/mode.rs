//! Mode controller.
//!
//! `Agent` is the resting state; `Manual` and `Recording` are only reachable
//! from it. The controller exclusively owns the interactive surface while it
//! is attached, together with the event pump that follows its navigations
//! and, when recording, feeds its console into the capture transport.
//!
//! A failed create/attach/load leaves the mode untouched and is returned as
//! a failed [`CommandResult`]. Synchronisation failures inside an otherwise
//! successful transition are only logged.

use std::sync::Arc;

use action_capture::{
    capture_script, ActionBuffer, CaptureTransport, FinishedRecording, RecordingSession,
};
use cdp_adapter::{BrowsingSurface, InteractiveSurface, Isolation, SurfaceEvent, SurfaceFactory};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use workflow_core_types::{CapturedAction, ModeState};

use crate::commands::CommandResult;
use crate::config::ShellConfig;
use crate::errors::ShellError;
use crate::host::{interactive_bounds, HostWindow};
use crate::metrics;
use crate::sync::Synchronizer;

/// Settings the controller reads at every transition.
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub fallback_url: String,
    pub blank_url: String,
    pub capture_script: String,
    pub action_tag: String,
    pub collapse_fills: bool,
    pub capture_navigations: bool,
}

impl ControllerSettings {
    pub fn from_config(cfg: &ShellConfig) -> Self {
        Self {
            fallback_url: cfg.recording.fallback_url.clone(),
            blank_url: cfg.interactive.blank_url.clone(),
            capture_script: capture_script(&cfg.recording.script_options()),
            action_tag: cfg.recording.action_tag.clone(),
            collapse_fills: cfg.recording.collapse_fills,
            capture_navigations: cfg.recording.capture_navigations,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&ShellConfig::default())
    }
}

/// Interactive surface plus the tasks bound to its lifetime.
struct Attached {
    surface: Arc<dyn InteractiveSurface>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Attached {
    async fn detach(self) -> Arc<dyn InteractiveSurface> {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(target: "mode-controller", ?err, "surface task ended abnormally");
            }
        }
        self.surface
    }
}

#[derive(Default)]
struct ControllerState {
    mode: ModeState,
    interactive: Option<Attached>,
    session: Option<RecordingSession>,
}

pub struct ModeController {
    settings: ControllerSettings,
    factory: Arc<dyn SurfaceFactory>,
    host: Arc<dyn HostWindow>,
    hidden: RwLock<Option<Arc<dyn BrowsingSurface>>>,
    sync: Synchronizer,
    buffer: ActionBuffer,
    state: Mutex<ControllerState>,
}

impl ModeController {
    pub fn new(
        settings: ControllerSettings,
        factory: Arc<dyn SurfaceFactory>,
        host: Arc<dyn HostWindow>,
    ) -> Self {
        let sync = Synchronizer::new(settings.blank_url.clone());
        Self {
            settings,
            factory,
            host,
            hidden: RwLock::new(None),
            sync,
            buffer: ActionBuffer::new(),
            state: Mutex::new(ControllerState::default()),
        }
    }

    /// Registers the hidden automation surface.
    pub fn attach_hidden(&self, surface: Arc<dyn BrowsingSurface>) {
        *self.hidden.write() = Some(surface);
    }

    pub fn hidden(&self) -> Option<Arc<dyn BrowsingSurface>> {
        self.hidden.read().clone()
    }

    pub async fn mode(&self) -> ModeState {
        self.state.lock().await.mode
    }

    pub async fn has_interactive(&self) -> bool {
        self.state.lock().await.interactive.is_some()
    }

    /// Number of actions waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Agent → Manual.
    pub async fn enable_interactive_mode(&self) -> CommandResult {
        let result = self.try_enable_interactive().await;
        Self::finish_transition("manual", result)
    }

    /// Manual → Agent.
    pub async fn disable_interactive_mode(&self) -> CommandResult {
        let result = self.try_disable_interactive().await;
        Self::finish_transition("agent_from_manual", result)
    }

    /// Agent → Recording.
    pub async fn enable_recording_mode(&self) -> CommandResult {
        let result = self.try_enable_recording().await;
        Self::finish_transition("recording", result)
    }

    /// Recording → Agent. Actions still buffered are returned.
    pub async fn disable_recording_mode(&self) -> CommandResult {
        let result = self.try_disable_recording().await;
        Self::finish_transition("agent_from_recording", result)
    }

    /// Drains the action buffer.
    pub async fn get_captured_actions(&self) -> CommandResult {
        let state = self.state.lock().await;
        let actions = match &state.session {
            Some(session) => session.drain(),
            None => self.buffer.drain(),
        };
        info!(target: "mode-controller", count = actions.len(), "captured actions drained");
        CommandResult::ok().with_actions(actions)
    }

    /// Puts undelivered actions back in front of anything captured since.
    pub async fn restore_captured_actions(&self, actions: Vec<CapturedAction>) {
        let state = self.state.lock().await;
        let buffer = match &state.session {
            Some(session) => session.buffer(),
            None => &self.buffer,
        };
        debug!(target: "mode-controller", count = actions.len(), "restoring captured actions");
        buffer.restore(actions);
    }

    /// Recomputes the interactive bounds after a host resize. No surface is
    /// created when none is attached.
    pub async fn on_host_resized(&self) -> CommandResult {
        let state = self.state.lock().await;
        let Some(attached) = &state.interactive else {
            debug!(target: "mode-controller", "resize without interactive surface");
            return CommandResult::ok();
        };
        let bounds = interactive_bounds(self.host.as_ref());
        if let Err(err) = attached.surface.set_bounds(bounds).await {
            warn!(target: "mode-controller", error = %err, "resizing interactive surface failed");
        }
        CommandResult::ok()
    }

    fn finish_transition(
        transition: &str,
        result: Result<CommandResult, ShellError>,
    ) -> CommandResult {
        match result {
            Ok(done) => {
                metrics::record_transition(transition, true);
                done
            }
            Err(err) => {
                error!(target: "mode-controller", transition, error = %err, "mode transition failed");
                metrics::record_transition(transition, false);
                CommandResult::failed(err)
            }
        }
    }

    fn require_hidden(&self) -> Result<Arc<dyn BrowsingSurface>, ShellError> {
        self.hidden().ok_or(ShellError::Uninitialized("hidden"))
    }

    /// Creates a surface sized to the interactive region. The surface is
    /// closed again when sizing fails.
    async fn create_surface(
        &self,
        isolation: Isolation,
    ) -> Result<Arc<dyn InteractiveSurface>, ShellError> {
        let surface = self.factory.create(isolation).await?;
        if let Err(err) = surface
            .set_bounds(interactive_bounds(self.host.as_ref()))
            .await
        {
            discard(surface.as_ref()).await;
            return Err(err.into());
        }
        Ok(surface)
    }

    async fn try_enable_interactive(&self) -> Result<CommandResult, ShellError> {
        let mut state = self.state.lock().await;
        match state.mode {
            ModeState::Manual => {
                let url = match &state.interactive {
                    Some(attached) => attached.surface.current_url().await.ok(),
                    None => None,
                };
                return Ok(CommandResult::ok().with_url(url));
            }
            ModeState::Recording => {
                return Err(ShellError::ModeConflict {
                    from: ModeState::Recording,
                    to: ModeState::Manual,
                })
            }
            ModeState::Agent => {}
        }

        let hidden = self.require_hidden()?;
        let surface = self.create_surface(Isolation::Sandboxed).await?;

        let synced = self
            .sync
            .mirror(
                hidden.as_ref(),
                surface.as_ref(),
                Some(self.settings.fallback_url.as_str()),
            )
            .await;
        self.host.set_screenshot_visible(false);

        let cancel = CancellationToken::new();
        let (follow, follower) = self
            .sync
            .spawn_follower(Arc::clone(&hidden), cancel.clone());
        let pump = tokio::spawn(manual_pump(surface.subscribe(), follow, cancel.clone()));

        state.interactive = Some(Attached {
            surface,
            cancel,
            tasks: vec![pump, follower],
        });
        state.mode = ModeState::Manual;
        info!(target: "mode-controller", url = ?synced.url(), "manual mode enabled");
        Ok(CommandResult::ok().with_url(synced.url().map(str::to_string)))
    }

    async fn try_disable_interactive(&self) -> Result<CommandResult, ShellError> {
        let mut state = self.state.lock().await;
        match state.mode {
            ModeState::Agent => return Ok(CommandResult::ok()),
            ModeState::Recording => {
                return Err(ShellError::ModeConflict {
                    from: ModeState::Recording,
                    to: ModeState::Agent,
                })
            }
            ModeState::Manual => {}
        }

        let final_url = match state.interactive.take() {
            Some(attached) => {
                let surface = attached.detach().await;
                let final_url = self.sync.meaningful_url(surface.as_ref()).await;
                match (&final_url, self.hidden()) {
                    (Some(url), Some(hidden)) => {
                        self.sync.load(hidden.as_ref(), url).await;
                    }
                    (Some(_), None) => {
                        warn!(target: "mode-controller", "hidden surface gone; final url not synced")
                    }
                    (None, _) => {}
                }
                discard(surface.as_ref()).await;
                final_url
            }
            None => None,
        };

        self.host.set_screenshot_visible(true);
        state.mode = ModeState::Agent;
        info!(target: "mode-controller", final_url = ?final_url, "manual mode disabled");
        Ok(CommandResult::ok().with_final_url(final_url))
    }

    async fn try_enable_recording(&self) -> Result<CommandResult, ShellError> {
        let mut state = self.state.lock().await;
        match state.mode {
            ModeState::Recording => {
                let url = state
                    .session
                    .as_ref()
                    .map(|session| session.start_url().to_string());
                return Ok(CommandResult::ok().with_url(url));
            }
            ModeState::Manual => {
                return Err(ShellError::ModeConflict {
                    from: ModeState::Manual,
                    to: ModeState::Recording,
                })
            }
            ModeState::Agent => {}
        }

        let hidden = self.require_hidden()?;
        let hidden_url = self.sync.meaningful_url(hidden.as_ref()).await;
        let start_url = hidden_url
            .clone()
            .unwrap_or_else(|| self.settings.fallback_url.clone());

        let surface = self.create_surface(Isolation::Relaxed).await?;
        if let Err(err) = surface.load_url(&start_url).await {
            discard(surface.as_ref()).await;
            return Err(err.into());
        }

        let events = surface.subscribe();
        inject(surface.as_ref(), &self.settings.capture_script).await;
        if hidden_url.as_deref() != Some(start_url.as_str()) {
            self.sync.load(hidden.as_ref(), &start_url).await;
        }

        let transport = CaptureTransport::new(self.settings.action_tag.clone(), self.buffer.clone());
        let session = RecordingSession::start(
            start_url.clone(),
            transport.clone(),
            self.settings.collapse_fills,
        );

        let cancel = CancellationToken::new();
        let (follow, follower) = self
            .sync
            .spawn_follower(Arc::clone(&hidden), cancel.clone());
        let pump = tokio::spawn(recording_pump(RecordingPump {
            surface: Arc::clone(&surface),
            events,
            transport,
            follow,
            script: self.settings.capture_script.clone(),
            capture_navigations: self.settings.capture_navigations,
            cancel: cancel.clone(),
        }));

        self.host.set_screenshot_visible(false);
        state.interactive = Some(Attached {
            surface,
            cancel,
            tasks: vec![pump, follower],
        });
        state.session = Some(session);
        state.mode = ModeState::Recording;
        info!(target: "mode-controller", %start_url, "recording mode enabled");
        Ok(CommandResult::ok().with_url(Some(start_url)))
    }

    async fn try_disable_recording(&self) -> Result<CommandResult, ShellError> {
        let mut state = self.state.lock().await;
        match state.mode {
            ModeState::Agent => return Ok(CommandResult::ok().with_actions(Vec::new())),
            ModeState::Manual => {
                return Err(ShellError::ModeConflict {
                    from: ModeState::Manual,
                    to: ModeState::Agent,
                })
            }
            ModeState::Recording => {}
        }

        if let Some(attached) = state.interactive.take() {
            let surface = attached.detach().await;
            discard(surface.as_ref()).await;
        }
        let finished = state.session.take().map(RecordingSession::finish);
        self.host.set_screenshot_visible(true);
        state.mode = ModeState::Agent;

        let (url, actions) = match finished {
            Some(FinishedRecording {
                start_url,
                actions,
                duration,
                ..
            }) => {
                info!(
                    target: "mode-controller",
                    %start_url,
                    remaining = actions.len(),
                    duration,
                    "recording mode disabled"
                );
                (Some(start_url), actions)
            }
            None => (None, self.buffer.drain()),
        };
        Ok(CommandResult::ok().with_url(url).with_actions(actions))
    }
}

/// Closes a surface, logging failures.
async fn discard(surface: &dyn InteractiveSurface) {
    if let Err(err) = surface.close().await {
        warn!(target: "mode-controller", surface = %surface.id(), error = %err, "closing interactive surface failed");
    }
}

async fn inject(surface: &dyn InteractiveSurface, script: &str) {
    match surface.execute_script(script).await {
        Ok(installed) => {
            debug!(target: "mode-controller", surface = %surface.id(), %installed, "capture listener injected")
        }
        Err(err) => {
            warn!(target: "mode-controller", surface = %surface.id(), error = %err, "capture listener injection failed")
        }
    }
}

async fn manual_pump(
    mut events: broadcast::Receiver<SurfaceEvent>,
    follow: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(SurfaceEvent::Navigated { url }) | Ok(SurfaceEvent::NavigatedInPage { url }) => {
                let _ = follow.send(url);
            }
            Ok(SurfaceEvent::Closed) | Err(broadcast::error::RecvError::Closed) => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(target: "mode-controller", skipped, "manual pump lagged");
            }
        }
    }
}

struct RecordingPump {
    surface: Arc<dyn InteractiveSurface>,
    events: broadcast::Receiver<SurfaceEvent>,
    transport: CaptureTransport,
    follow: mpsc::UnboundedSender<String>,
    script: String,
    capture_navigations: bool,
    cancel: CancellationToken,
}

async fn recording_pump(mut pump: RecordingPump) {
    loop {
        let event = tokio::select! {
            _ = pump.cancel.cancelled() => {
                // Console lines already delivered still belong to the session.
                while let Ok(event) = pump.events.try_recv() {
                    pump.transport.handle_event(&event);
                }
                break;
            }
            event = pump.events.recv() => event,
        };
        match event {
            Ok(event @ SurfaceEvent::ConsoleMessage { .. }) => {
                pump.transport.handle_event(&event);
            }
            Ok(SurfaceEvent::Navigated { url }) => {
                if pump.capture_navigations {
                    pump.transport
                        .buffer()
                        .append(CapturedAction::navigate(url.clone(), now_ms()));
                }
                let _ = pump.follow.send(url);
            }
            Ok(SurfaceEvent::NavigatedInPage { url }) => {
                let _ = pump.follow.send(url);
            }
            Ok(SurfaceEvent::LoadFinished) => {
                inject(pump.surface.as_ref(), &pump.script).await;
            }
            Ok(SurfaceEvent::Closed) | Err(broadcast::error::RecvError::Closed) => {
                warn!(target: "mode-controller", "interactive surface closed during recording");
                break;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                pump.transport.record_lag(skipped);
            }
        }
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
