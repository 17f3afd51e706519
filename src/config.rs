//! Shell configuration.
//!
//! Loaded from YAML (see `cli::runtime::load_config`); every section and
//! field falls back to its default, then environment overrides apply.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use action_capture::{ScriptOptions, SimulatedOptions, ACTION_TAG};
use cdp_adapter::config::DEFAULT_DEBUGGING_PORT;
use cdp_adapter::{BrowserPreference, CdpConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8765";
pub const DEFAULT_FALLBACK_URL: &str = "https://www.duckduckgo.com";
pub const DEFAULT_BLANK_URL: &str = "about:blank";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub window: WindowConfig,
    pub interactive: InteractiveConfig,
    pub recording: RecordingConfig,
}

/// Automation-server channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub connect_retries: u32,
    pub retry_backoff_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            connect_retries: 5,
            retry_backoff_ms: 1_000,
            viewport_width: 1024,
            viewport_height: 768,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub mode: BrowserPreference,
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    pub remote_debugging_port: u16,
    /// Attach to an already running browser instead of launching one.
    pub websocket_url: Option<String>,
    pub command_deadline_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            mode: BrowserPreference::Auto,
            executable: None,
            headless: false,
            user_data_dir: None,
            remote_debugging_port: DEFAULT_DEBUGGING_PORT,
            websocket_url: None,
            command_deadline_ms: 30_000,
        }
    }
}

/// Host window content size.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 1000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractiveConfig {
    /// URL treated as "nothing loaded yet".
    pub blank_url: String,
}

impl Default for InteractiveConfig {
    fn default() -> Self {
        Self {
            blank_url: DEFAULT_BLANK_URL.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub fallback_url: String,
    pub scroll_debounce_ms: u64,
    pub action_tag: String,
    pub collapse_fills: bool,
    pub capture_navigations: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            fallback_url: DEFAULT_FALLBACK_URL.to_string(),
            scroll_debounce_ms: 300,
            action_tag: ACTION_TAG.to_string(),
            collapse_fills: false,
            capture_navigations: false,
        }
    }
}

impl RecordingConfig {
    pub fn script_options(&self) -> ScriptOptions {
        ScriptOptions {
            tag: self.action_tag.clone(),
            scroll_debounce: Duration::from_millis(self.scroll_debounce_ms),
        }
    }

    pub fn simulated_options(&self) -> SimulatedOptions {
        SimulatedOptions {
            tag: self.action_tag.clone(),
            scroll_debounce: Duration::from_millis(self.scroll_debounce_ms),
        }
    }
}

impl ShellConfig {
    /// Applies `WORKFLOW_SHELL_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("WORKFLOW_SHELL_SERVER_URL") {
            if !url.trim().is_empty() {
                self.server.url = url.trim().to_string();
            }
        }
        if let Ok(mode) = env::var("WORKFLOW_SHELL_BROWSER_MODE") {
            match mode.parse::<BrowserPreference>() {
                Ok(pref) => self.browser.mode = pref,
                Err(err) => warn!(%err, "ignoring WORKFLOW_SHELL_BROWSER_MODE"),
            }
        }
        if let Ok(path) = env::var("WORKFLOW_SHELL_CHROME") {
            if !path.trim().is_empty() {
                self.browser.executable = Some(PathBuf::from(path.trim()));
            }
        }
        if let Ok(value) = env::var("WORKFLOW_SHELL_HEADLESS") {
            self.browser.headless = matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    /// Adapter configuration derived from the browser and window sections.
    pub fn cdp_config(&self) -> CdpConfig {
        let mut cfg = CdpConfig::default();
        if let Some(executable) = &self.browser.executable {
            cfg.executable = executable.clone();
        }
        if let Some(dir) = &self.browser.user_data_dir {
            cfg.user_data_dir = dir.clone();
        }
        cfg.headless = self.browser.headless;
        cfg.remote_debugging_port = self.browser.remote_debugging_port;
        cfg.websocket_url = self.browser.websocket_url.clone();
        cfg.default_deadline_ms = self.browser.command_deadline_ms;
        cfg.window_width = self.window.width;
        cfg.window_height = self.window.height;
        cfg
    }
}
