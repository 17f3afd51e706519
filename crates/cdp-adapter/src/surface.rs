//! Browsing-surface abstractions consumed by the mode controller.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use workflow_core_types::{Bounds, SurfaceId};

use crate::error::AdapterError;

/// Script-context isolation of an interactive surface.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Plain human browsing; console output is not observed.
    #[default]
    Sandboxed,
    /// Injected scripts share the page's DOM and their console output is
    /// delivered as [`SurfaceEvent::ConsoleMessage`].
    Relaxed,
}

/// Events emitted by an interactive surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SurfaceEvent {
    /// Main-frame navigation committed.
    Navigated { url: String },
    /// Same-document navigation (history API, fragment).
    NavigatedInPage { url: String },
    /// Document load completed.
    LoadFinished,
    ConsoleMessage { level: String, text: String },
    Closed,
}

impl SurfaceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SurfaceEvent::Navigated { .. } => "navigated",
            SurfaceEvent::NavigatedInPage { .. } => "navigated_in_page",
            SurfaceEvent::LoadFinished => "load_finished",
            SurfaceEvent::ConsoleMessage { .. } => "console_message",
            SurfaceEvent::Closed => "closed",
        }
    }
}

/// Minimal surface used for URL synchronisation.
#[async_trait]
pub trait BrowsingSurface: Send + Sync {
    async fn current_url(&self) -> Result<String, AdapterError>;

    /// Navigates and resolves once the document has loaded.
    async fn load_url(&self, url: &str) -> Result<(), AdapterError>;
}

/// Human-operable surface attached to the host window.
#[async_trait]
pub trait InteractiveSurface: BrowsingSurface {
    fn id(&self) -> &SurfaceId;

    /// Evaluates `source` in the page and returns its JSON value.
    async fn execute_script(&self, source: &str) -> Result<Value, AdapterError>;

    async fn set_bounds(&self, bounds: Bounds) -> Result<(), AdapterError>;

    /// Receiver for events emitted after this call.
    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent>;

    /// Destroys the surface. Closing twice is not an error.
    async fn close(&self) -> Result<(), AdapterError>;
}

/// Creates interactive surfaces on demand.
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn create(&self, isolation: Isolation)
        -> Result<Arc<dyn InteractiveSurface>, AdapterError>;
}
