//! Automation-server message set.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use workflow_core_types::{
    CapturedAction, PlaybackReport, RecordingReceipt, Workflow, WorkflowSummary,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitConfig {
    pub viewport: Viewport,
}

/// Requests sent by the shell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Init {
        config: InitConfig,
    },
    UserMessage {
        message: String,
    },
    Reset,
    PauseAgent,
    ResumeAgent,
    StartRecording,
    StopRecording {
        workflow_name: String,
        captured_actions: Vec<CapturedAction>,
    },
    ListWorkflows,
    GetWorkflow {
        workflow_id: String,
    },
    PlayWorkflow {
        workflow_id: String,
    },
    DeleteWorkflow {
        workflow_id: String,
    },
}

impl ClientMessage {
    pub fn init(width: u32, height: u32) -> Self {
        ClientMessage::Init {
            config: InitConfig {
                viewport: Viewport { width, height },
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Init { .. } => "init",
            ClientMessage::UserMessage { .. } => "user_message",
            ClientMessage::Reset => "reset",
            ClientMessage::PauseAgent => "pause_agent",
            ClientMessage::ResumeAgent => "resume_agent",
            ClientMessage::StartRecording => "start_recording",
            ClientMessage::StopRecording { .. } => "stop_recording",
            ClientMessage::ListWorkflows => "list_workflows",
            ClientMessage::GetWorkflow { .. } => "get_workflow",
            ClientMessage::PlayWorkflow { .. } => "play_workflow",
            ClientMessage::DeleteWorkflow { .. } => "delete_workflow",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowList {
    #[serde(default)]
    pub workflows: Vec<WorkflowSummary>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEnvelope {
    pub workflow: Workflow,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReceipt {
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub success: bool,
}

/// Events pushed by the automation server. Types outside this set decode to
/// [`ServerEvent::Unknown`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    InitComplete {
        #[serde(default)]
        data: Value,
    },
    AgentMessage {
        #[serde(default)]
        message: String,
    },
    AgentPaused {
        #[serde(default)]
        message: String,
    },
    AgentResumed {
        #[serde(default)]
        message: String,
    },
    Observation {
        #[serde(default)]
        data: Value,
    },
    Status {
        #[serde(default)]
        data: Value,
    },
    Error {
        #[serde(default)]
        error: String,
    },
    /// Base64 encoded PNG of the hidden surface.
    Screenshot {
        #[serde(default)]
        data: String,
    },
    RecordingStarted {
        #[serde(default)]
        message: String,
    },
    RecordingStopped {
        #[serde(default)]
        data: RecordingReceipt,
    },
    WorkflowsList {
        #[serde(default)]
        data: WorkflowList,
    },
    WorkflowData {
        data: WorkflowEnvelope,
    },
    WorkflowCompleted {
        #[serde(default)]
        data: PlaybackReport,
    },
    WorkflowDeleted {
        #[serde(default)]
        data: DeletionReceipt,
    },
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::InitComplete { .. } => "init_complete",
            ServerEvent::AgentMessage { .. } => "agent_message",
            ServerEvent::AgentPaused { .. } => "agent_paused",
            ServerEvent::AgentResumed { .. } => "agent_resumed",
            ServerEvent::Observation { .. } => "observation",
            ServerEvent::Status { .. } => "status",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Screenshot { .. } => "screenshot",
            ServerEvent::RecordingStarted { .. } => "recording_started",
            ServerEvent::RecordingStopped { .. } => "recording_stopped",
            ServerEvent::WorkflowsList { .. } => "workflows_list",
            ServerEvent::WorkflowData { .. } => "workflow_data",
            ServerEvent::WorkflowCompleted { .. } => "workflow_completed",
            ServerEvent::WorkflowDeleted { .. } => "workflow_deleted",
            ServerEvent::Unknown => "unknown",
        }
    }
}
