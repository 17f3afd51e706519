//! Host-facing command results.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use workflow_core_types::CapturedAction;

/// Structured outcome of a host command. Failures are values, not errors.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<CapturedAction>>,
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_final_url(mut self, url: Option<String>) -> Self {
        self.final_url = url;
        self
    }

    pub fn with_actions(mut self, actions: Vec<CapturedAction>) -> Self {
        self.actions = Some(actions);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialises_camel_case_and_skips_empty() {
        let result = CommandResult::ok().with_final_url(Some("https://example.com".into()));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "success": true, "finalUrl": "https://example.com" })
        );
        assert_eq!(
            serde_json::to_value(CommandResult::failed("boom")).unwrap(),
            json!({ "success": false, "error": "boom" })
        );
    }
}
