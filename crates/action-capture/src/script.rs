//! Injection source of the capture listener.

use std::time::Duration;

use crate::listener::SCROLL_DEBOUNCE;
use crate::transport::ACTION_TAG;

const TEMPLATE: &str = include_str!("../assets/capture_listener.js");

/// Window flag guarding against duplicate listener installation.
pub const LISTENER_GUARD: &str = "__captureListenersAttached";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptOptions {
    pub tag: String,
    pub scroll_debounce: Duration,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            tag: ACTION_TAG.to_string(),
            scroll_debounce: SCROLL_DEBOUNCE,
        }
    }
}

/// Builds the listener script. Evaluating it returns `true` when the
/// listeners were installed and `false` when they already were.
pub fn capture_script(options: &ScriptOptions) -> String {
    let tag = serde_json::Value::String(options.tag.clone()).to_string();
    TEMPLATE
        .replace("__WORKFLOW_TAG__", &tag)
        .replace(
            "__SCROLL_DEBOUNCE_MS__",
            &options.scroll_debounce.as_millis().to_string(),
        )
}

/// Whether `source` installs the capture listener.
pub fn is_capture_script(source: &str) -> bool {
    source.contains(LISTENER_GUARD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_tag_and_debounce() {
        let script = capture_script(&ScriptOptions {
            tag: "[REC \"x\"]".into(),
            scroll_debounce: Duration::from_millis(150),
        });
        assert!(script.contains(r#"const TAG = "[REC \"x\"]";"#));
        assert!(script.contains("const SCROLL_DEBOUNCE_MS = 150;"));
        assert!(!script.contains("__WORKFLOW_TAG__"));
        assert!(is_capture_script(&script));
    }

    #[test]
    fn default_script_uses_action_tag() {
        let script = capture_script(&ScriptOptions::default());
        assert!(script.contains(r#"const TAG = "[WORKFLOW_ACTION]";"#));
        assert!(script.contains("const SCROLL_DEBOUNCE_MS = 300;"));
    }
}
