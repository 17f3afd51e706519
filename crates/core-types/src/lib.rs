//! Shared primitives for the workflow shell.
//!
//! Everything that crosses a crate boundary lives here: the captured action
//! record emitted by the in-page listener, the persisted workflow shape used by
//! the automation server, and the small geometry/mode types shared between the
//! mode controller and the surface adapters.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod action;
pub mod mode;
pub mod workflow;

pub use action::{ActionContext, ActionKind, ActionPayload, CapturedAction, ScrollOffset};
pub use mode::{Bounds, ModeState};
pub use workflow::{
    new_workflow_id, PlaybackError, PlaybackReport, RecordingReceipt, Workflow, WorkflowSummary,
};

/// Shared error type for value-level validation in the core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("unknown mode: {0}")]
    UnknownMode(String),
}

/// Identifier of a browsing surface (hidden or interactive).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub String);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one recording session.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
