//! Chromium DevTools Protocol adapter for the workflow shell.
//!
//! One Chromium instance hosts both browsing surfaces: the hidden automation
//! page driven by the automation server over the remote debugging port, and
//! the interactive page a human operates while the agent is paused or a
//! workflow is being recorded. Higher layers only see the traits in
//! [`surface`]; [`browser::CdpBrowser`] implements them over a
//! [`transport::CdpTransport`].

use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};
use which::which;

pub mod browser;
pub mod metrics;
pub mod registry;
pub mod surface;
pub mod transport;

pub use browser::{CdpBrowser, CdpPage};
pub use config::CdpConfig;
pub use error::{AdapterError, AdapterErrorKind};
pub use surface::{BrowsingSurface, InteractiveSurface, Isolation, SurfaceEvent, SurfaceFactory};

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        #[error("navigation timed out")]
        NavTimeout,
        #[error("navigation failed")]
        NavFailed,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("script evaluation failed")]
        ScriptFailed,
        #[error("surface closed")]
        SurfaceClosed,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        pub fn surface_closed(surface: impl fmt::Display) -> Self {
            Self::new(AdapterErrorKind::SurfaceClosed).with_hint(format!("surface {surface}"))
        }
    }
}

pub mod config {
    use crate::detect_chrome_executable;
    use serde::{Deserialize, Serialize};
    use std::{
        env,
        path::{Path, PathBuf},
    };

    /// Remote debugging port the automation server attaches to.
    pub const DEFAULT_DEBUGGING_PORT: u16 = 9222;

    /// Configuration for launching and tuning the adapter.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        pub executable: PathBuf,
        pub user_data_dir: PathBuf,
        pub headless: bool,
        pub default_deadline_ms: u64,
        pub websocket_url: Option<String>,
        pub remote_debugging_port: u16,
        pub window_width: u32,
        pub window_height: u32,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                executable: default_chrome_path(),
                user_data_dir: default_profile_dir(),
                headless: resolve_headless_default(),
                default_deadline_ms: 30_000,
                websocket_url: None,
                remote_debugging_port: DEFAULT_DEBUGGING_PORT,
                window_width: 1600,
                window_height: 1000,
            }
        }
    }

    fn resolve_headless_default() -> bool {
        // The interactive surface has to be visible, so headful unless asked.
        match env::var("WORKFLOW_SHELL_HEADLESS") {
            Ok(value) => {
                let lower = value.to_ascii_lowercase();
                matches!(lower.as_str(), "1" | "true" | "yes" | "on")
            }
            Err(_) => false,
        }
    }

    fn default_chrome_path() -> PathBuf {
        detect_chrome_executable().unwrap_or_default()
    }

    fn default_profile_dir() -> PathBuf {
        if let Ok(path) = env::var("WORKFLOW_SHELL_CHROME_PROFILE") {
            return PathBuf::from(path);
        }

        let default = Path::new("./.workflow-shell-profile");
        default.into()
    }
}

pub(crate) fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("WORKFLOW_SHELL_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    let skip_defaults = env::var("WORKFLOW_SHELL_SKIP_OS_PATHS")
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);

    if !skip_defaults {
        for candidate in os_specific_chrome_paths() {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(any(target_os = "macos", target_os = "linux", target_os = "freebsd"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }

    #[cfg(not(any(
        target_os = "windows",
        target_os = "macos",
        target_os = "linux",
        target_os = "freebsd"
    )))]
    {
        &["chrome"]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let mut paths = Vec::new();
        for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
            if let Ok(value) = env::var(key) {
                let root = PathBuf::from(value.trim());
                paths.push(root.join("Google/Chrome/Application/chrome.exe"));
                paths.push(root.join("Chromium/Application/chrome.exe"));
            }
        }
        paths
    }

    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(any(target_os = "linux", target_os = "freebsd"))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
        ]
    }

    #[cfg(not(any(
        target_os = "windows",
        target_os = "macos",
        target_os = "linux",
        target_os = "freebsd"
    )))]
    {
        Vec::new()
    }
}

/// Which surface backend the shell runs on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterMode {
    Real,
    Stub,
}

impl AdapterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterMode::Real => "real",
            AdapterMode::Stub => "stub",
        }
    }

    pub fn is_stub(&self) -> bool {
        matches!(self, AdapterMode::Stub)
    }
}

/// Requested backend; `Auto` picks Real when a Chromium binary is found.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserPreference {
    #[default]
    Auto,
    Real,
    Stub,
}

impl std::str::FromStr for BrowserPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(BrowserPreference::Auto),
            "real" | "1" | "true" | "on" => Ok(BrowserPreference::Real),
            "stub" | "0" | "false" | "off" => Ok(BrowserPreference::Stub),
            other => Err(format!("unknown browser mode '{other}'")),
        }
    }
}

/// Resolves the backend and fills in the executable when a real browser is
/// used. Attaching to an existing websocket always selects Real.
pub fn resolve_mode(
    preference: BrowserPreference,
    cfg: &mut CdpConfig,
) -> Result<AdapterMode, AdapterError> {
    if matches!(preference, BrowserPreference::Stub) {
        return Ok(AdapterMode::Stub);
    }
    if cfg.websocket_url.is_some() {
        return Ok(AdapterMode::Real);
    }

    let detected = if !cfg.executable.as_os_str().is_empty() && cfg.executable.exists() {
        Some(cfg.executable.clone())
    } else {
        detect_chrome_executable()
    };

    match (detected, preference) {
        (Some(path), _) => {
            cfg.executable = path;
            Ok(AdapterMode::Real)
        }
        (None, BrowserPreference::Real) => Err(AdapterError::new(AdapterErrorKind::Internal)
            .with_hint("Chrome/Chromium executable not found")
            .with_data(serde_json::json!({
                "hint": "Set WORKFLOW_SHELL_CHROME to the full path of chrome/chromium."
            }))),
        (None, _) => {
            tracing::warn!(
                target: "cdp-adapter",
                event = "cdp_adapter.stub_mode",
                reason = "chrome_not_found",
                "Chrome executable not found; falling back to simulated surfaces"
            );
            Ok(AdapterMode::Stub)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    #[serial]
    fn detects_from_env_var() {
        let dir = tempdir().unwrap();
        let exe_path = dir.path().join("my-chrome");
        fs::write(&exe_path, b"").unwrap();
        let original = env::var("WORKFLOW_SHELL_CHROME").ok();
        env::set_var("WORKFLOW_SHELL_CHROME", exe_path.to_string_lossy().to_string());
        let detected = detect_chrome_executable();
        if let Some(value) = original {
            env::set_var("WORKFLOW_SHELL_CHROME", value);
        } else {
            env::remove_var("WORKFLOW_SHELL_CHROME");
        }
        assert_eq!(detected, Some(exe_path));
    }

    #[test]
    fn stub_preference_never_probes() {
        let mut cfg = CdpConfig::default();
        cfg.executable = PathBuf::from("/definitely/missing/chrome");
        let mode = resolve_mode(BrowserPreference::Stub, &mut cfg).unwrap();
        assert!(mode.is_stub());
        assert_eq!(cfg.executable, PathBuf::from("/definitely/missing/chrome"));
    }

    #[test]
    fn websocket_url_forces_real() {
        let mut cfg = CdpConfig::default();
        cfg.websocket_url = Some("ws://127.0.0.1:9222/devtools/browser/abc".into());
        assert_eq!(
            resolve_mode(BrowserPreference::Auto, &mut cfg).unwrap(),
            AdapterMode::Real
        );
    }

    #[test]
    fn parses_preferences() {
        assert_eq!("STUB".parse::<BrowserPreference>().unwrap(), BrowserPreference::Stub);
        assert_eq!("real".parse::<BrowserPreference>().unwrap(), BrowserPreference::Real);
        assert!("maybe".parse::<BrowserPreference>().is_err());
    }
}
