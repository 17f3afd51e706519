use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::CapturedAction;

/// A named, ordered sequence of captured actions replayable by the
/// automation server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub start_url: String,
    #[serde(default)]
    pub actions: Vec<CapturedAction>,
    /// Recording length in seconds.
    #[serde(default)]
    pub duration: f64,
}

impl Workflow {
    /// Builds a workflow draft from a finished recording.
    pub fn from_recording(
        name: impl Into<String>,
        start_url: impl Into<String>,
        actions: Vec<CapturedAction>,
        duration: f64,
    ) -> Self {
        Self {
            id: new_workflow_id(),
            name: name.into(),
            description: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
            start_url: start_url.into(),
            actions,
            duration,
        }
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at.clone(),
            action_count: self.actions.len(),
            duration: self.duration,
            start_url: self.start_url.clone(),
        }
    }
}

/// `wf_` followed by eight lowercase hex digits.
pub fn new_workflow_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("wf_{}", &simple[..8])
}

/// Listing entry as returned in `workflows_list`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub action_count: usize,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub start_url: String,
}

/// Acknowledgement carried by `recording_stopped`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingReceipt {
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub action_count: usize,
    #[serde(default)]
    pub duration: f64,
}

/// Outcome of a `play_workflow` request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackReport {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub actions_executed: usize,
    #[serde(default)]
    pub actions_failed: usize,
    #[serde(default)]
    pub errors: Vec<PlaybackError>,
}

impl PlaybackReport {
    pub fn total(&self) -> usize {
        self.actions_executed + self.actions_failed
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackError {
    pub action_index: usize,
    #[serde(default)]
    pub action: serde_json::Value,
    #[serde(default)]
    pub error: String,
}
