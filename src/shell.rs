//! Shell orchestration: operator console, automation-server events and the
//! mode controller.

use std::str::FromStr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use workflow_core_types::{ModeState, PlaybackReport, WorkflowSummary};

use crate::channel::{ChannelStatus, ChannelUpdate, ClientMessage, ServerChannel, ServerEvent};
use crate::errors::{ShellError, ShellResult};
use crate::host::HostWindowState;
use crate::mode::ModeController;

/// One line typed at the operator console.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperatorCommand {
    Say(String),
    Reset,
    Pause,
    Resume,
    Record,
    Stop(Option<String>),
    List,
    Show(String),
    Play(String),
    Delete(String),
    Resize(u32, u32),
    Status,
    Help,
    Quit,
}

impl FromStr for OperatorCommand {
    type Err = ShellError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        let id = |name: &str| {
            if rest.is_empty() {
                Err(ShellError::InvalidCommand(format!("{name} needs a workflow id")))
            } else {
                Ok(rest.to_string())
            }
        };
        match head.to_ascii_lowercase().as_str() {
            "say" if !rest.is_empty() => Ok(OperatorCommand::Say(rest.to_string())),
            "say" => Err(ShellError::InvalidCommand("say needs a message".into())),
            "reset" => Ok(OperatorCommand::Reset),
            "pause" => Ok(OperatorCommand::Pause),
            "resume" => Ok(OperatorCommand::Resume),
            "record" => Ok(OperatorCommand::Record),
            "stop" => Ok(OperatorCommand::Stop(
                (!rest.is_empty()).then(|| rest.to_string()),
            )),
            "list" => Ok(OperatorCommand::List),
            "show" => id("show").map(OperatorCommand::Show),
            "play" => id("play").map(OperatorCommand::Play),
            "delete" => id("delete").map(OperatorCommand::Delete),
            "resize" => {
                let mut dims = rest.split_whitespace().map(str::parse::<u32>);
                match (dims.next(), dims.next(), dims.next()) {
                    (Some(Ok(width)), Some(Ok(height)), None) if width > 0 && height > 0 => {
                        Ok(OperatorCommand::Resize(width, height))
                    }
                    _ => Err(ShellError::InvalidCommand(
                        "usage: resize <width> <height>".into(),
                    )),
                }
            }
            "status" => Ok(OperatorCommand::Status),
            "help" | "?" => Ok(OperatorCommand::Help),
            "quit" | "exit" => Ok(OperatorCommand::Quit),
            other => Err(ShellError::InvalidCommand(format!("unknown command '{other}'"))),
        }
    }
}

const HELP: &str = "\
commands:
  say <text>        send a chat message to the agent
  reset             reset the automation environment
  pause | resume    take over / hand back the browser
  record | stop [name]
                    record a workflow from the interactive surface
  list | show <id> | play <id> | delete <id>
                    manage stored workflows
  resize <w> <h>    resize the host window
  status | quit";

/// Default name of a workflow saved without one.
pub fn default_workflow_name() -> String {
    format!("Workflow {}", chrono::Utc::now().timestamp_millis())
}

pub struct Shell {
    controller: Arc<ModeController>,
    host: Arc<HostWindowState>,
    channel: Option<ServerChannel>,
    updates: Option<mpsc::UnboundedReceiver<ChannelUpdate>>,
}

impl Shell {
    pub fn new(controller: Arc<ModeController>, host: Arc<HostWindowState>) -> Self {
        Self {
            controller,
            host,
            channel: None,
            updates: None,
        }
    }

    pub fn with_channel(
        mut self,
        channel: ServerChannel,
        updates: mpsc::UnboundedReceiver<ChannelUpdate>,
    ) -> Self {
        self.channel = Some(channel);
        self.updates = Some(updates);
        self
    }

    pub fn controller(&self) -> &Arc<ModeController> {
        &self.controller
    }

    /// Runs until `quit` or end of input.
    pub async fn run<R>(mut self, input: R) -> ShellResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut updates = self.updates.take();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<OperatorCommand>() {
                        Ok(OperatorCommand::Quit) => break,
                        Ok(command) => {
                            if let Err(err) = self.handle_command(command).await {
                                println!("error: {err}");
                            }
                        }
                        Err(err) => println!("{err} (try 'help')"),
                    }
                }
                update = next_update(&mut updates) => match update {
                    ChannelUpdate::Event(event) => self.handle_event(event).await,
                    ChannelUpdate::Status(status) => {
                        info!(target: "shell", ?status, "automation server channel status");
                        if status == ChannelStatus::Disconnected {
                            println!("automation server disconnected");
                        }
                    }
                },
            }
        }
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(self) {
        // Leave no interactive surface behind.
        match self.controller.mode().await {
            ModeState::Recording => {
                self.controller.disable_recording_mode().await;
            }
            ModeState::Manual => {
                self.controller.disable_interactive_mode().await;
            }
            ModeState::Agent => {}
        }
        if let Some(channel) = self.channel {
            channel.close().await;
        }
    }

    fn connected(&self) -> bool {
        self.channel
            .as_ref()
            .map(ServerChannel::is_connected)
            .unwrap_or(false)
    }

    fn send(&self, message: ClientMessage) -> ShellResult<()> {
        match &self.channel {
            Some(channel) => channel.send(message),
            None => Err(ShellError::ChannelClosed),
        }
    }

    pub async fn handle_command(&self, command: OperatorCommand) -> ShellResult<()> {
        debug!(target: "shell", ?command, "operator command");
        match command {
            OperatorCommand::Say(message) => self.send(ClientMessage::UserMessage { message }),
            OperatorCommand::Reset => self.send(ClientMessage::Reset),
            OperatorCommand::Pause => {
                let result = self.controller.enable_interactive_mode().await;
                if !result.success {
                    println!(
                        "pause failed: {}",
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                    return Ok(());
                }
                println!(
                    "manual mode at {}",
                    result.url.as_deref().unwrap_or("(no url)")
                );
                self.send(ClientMessage::PauseAgent)
            }
            OperatorCommand::Resume => {
                let result = self.controller.disable_interactive_mode().await;
                if !result.success {
                    println!(
                        "resume failed: {}",
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                    return Ok(());
                }
                self.send(ClientMessage::ResumeAgent)
            }
            OperatorCommand::Record => self.send(ClientMessage::StartRecording),
            OperatorCommand::Stop(name) => {
                if !self.connected() {
                    return Err(ShellError::ChannelClosed);
                }
                let drained = self.controller.get_captured_actions().await;
                let captured_actions = if drained.success {
                    drained.actions.unwrap_or_default()
                } else {
                    warn!(target: "shell", error = ?drained.error, "draining captured actions failed");
                    Vec::new()
                };
                info!(target: "shell", count = captured_actions.len(), "sending recorded actions");
                let sent = self.send(ClientMessage::StopRecording {
                    workflow_name: name.unwrap_or_else(default_workflow_name),
                    captured_actions: captured_actions.clone(),
                });
                if sent.is_err() {
                    warn!(
                        target: "shell",
                        count = captured_actions.len(),
                        "stop_recording not delivered; actions kept for retry"
                    );
                    self.controller.restore_captured_actions(captured_actions).await;
                }
                sent
            }
            OperatorCommand::List => self.send(ClientMessage::ListWorkflows),
            OperatorCommand::Show(workflow_id) => {
                self.send(ClientMessage::GetWorkflow { workflow_id })
            }
            OperatorCommand::Play(workflow_id) => {
                self.send(ClientMessage::PlayWorkflow { workflow_id })
            }
            OperatorCommand::Delete(workflow_id) => {
                self.send(ClientMessage::DeleteWorkflow { workflow_id })
            }
            OperatorCommand::Resize(width, height) => {
                self.host.resize(width, height);
                self.controller.on_host_resized().await;
                Ok(())
            }
            OperatorCommand::Status => {
                let connected = self.connected();
                println!(
                    "mode: {}  interactive: {}  buffered: {}  server: {}",
                    self.controller.mode().await,
                    self.controller.has_interactive().await,
                    self.controller.buffered(),
                    if connected { "connected" } else { "offline" }
                );
                Ok(())
            }
            OperatorCommand::Help => {
                println!("{HELP}");
                Ok(())
            }
            OperatorCommand::Quit => Ok(()),
        }
    }

    pub async fn handle_event(&self, event: ServerEvent) {
        debug!(target: "shell", kind = event.kind(), "server event");
        match event {
            ServerEvent::RecordingStarted { message } => {
                let result = self.controller.enable_recording_mode().await;
                if result.success {
                    println!(
                        "{message} ({})",
                        result.url.as_deref().unwrap_or("no start url")
                    );
                } else {
                    error!(target: "shell", error = ?result.error, "recording surface unavailable");
                    println!(
                        "recording failed: {}",
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            ServerEvent::RecordingStopped { data } => {
                let result = self.controller.disable_recording_mode().await;
                let late = result.actions.map(|actions| actions.len()).unwrap_or(0);
                if late > 0 {
                    warn!(target: "shell", late, "actions captured after stop were not sent");
                }
                println!(
                    "saved workflow {} '{}' ({} actions, {:.1}s)",
                    data.workflow_id, data.name, data.action_count, data.duration
                );
            }
            ServerEvent::AgentMessage { message } => println!("agent: {message}"),
            ServerEvent::AgentPaused { message } | ServerEvent::AgentResumed { message } => {
                println!("{message}")
            }
            ServerEvent::InitComplete { data } => {
                info!(target: "shell", %data, "automation server ready")
            }
            ServerEvent::Observation { data } | ServerEvent::Status { data } => {
                debug!(target: "shell", %data, "server update")
            }
            ServerEvent::Error { error } => {
                warn!(target: "shell", %error, "automation server error");
                println!("server error: {error}");
            }
            ServerEvent::Screenshot { data } => {
                debug!(target: "shell", bytes = data.len(), "screenshot received")
            }
            ServerEvent::WorkflowsList { data } => print_workflows(&data.workflows),
            ServerEvent::WorkflowData { data } => {
                match serde_json::to_string_pretty(&data.workflow) {
                    Ok(json) => println!("{json}"),
                    Err(err) => warn!(target: "shell", %err, "cannot render workflow"),
                }
            }
            ServerEvent::WorkflowCompleted { data } => print_playback(&data),
            ServerEvent::WorkflowDeleted { data } => println!(
                "workflow {} {}",
                data.workflow_id,
                if data.success { "deleted" } else { "not deleted" }
            ),
            ServerEvent::Unknown => {}
        }
    }
}

/// Next channel update; pends forever once the channel is gone.
async fn next_update(
    updates: &mut Option<mpsc::UnboundedReceiver<ChannelUpdate>>,
) -> ChannelUpdate {
    if let Some(rx) = updates.as_mut() {
        if let Some(update) = rx.recv().await {
            return update;
        }
        *updates = None;
    }
    std::future::pending().await
}

fn print_workflows(workflows: &[WorkflowSummary]) {
    if workflows.is_empty() {
        println!("no workflows");
        return;
    }
    for wf in workflows {
        println!(
            "{:<12} {:<32} {:>3} actions  {}",
            wf.id, wf.name, wf.action_count, wf.created_at
        );
    }
}

fn print_playback(report: &PlaybackReport) {
    println!(
        "playback {}: {}/{} actions executed",
        if report.success { "succeeded" } else { "failed" },
        report.actions_executed,
        report.total()
    );
    for err in &report.errors {
        println!("  #{}: {}", err.action_index, err.error);
    }
}
