//! Captured user interactions.
//!
//! The wire shape is the one emitted by the in-page capture listener:
//! `{"type":"click","selector":"#submit","context":{...},"timestamp":1712}`.
//! Navigations use the `goto` tag understood by the automation server's
//! workflow player; `navigate` is accepted as an alias on input.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::CoreError;

/// Discriminant of a captured action.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Fill,
    Scroll,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Fill => "fill",
            ActionKind::Scroll => "scroll",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document scroll position in CSS pixels.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ScrollOffset {
    #[serde(deserialize_with = "lenient_i64")]
    pub x: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub y: i64,
}

impl ScrollOffset {
    pub const ORIGIN: ScrollOffset = ScrollOffset { x: 0, y: 0 };

    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn is_origin(&self) -> bool {
        self.x == 0 && self.y == 0
    }
}

/// Variant-dependent payload of a captured action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    #[serde(rename = "goto", alias = "navigate")]
    Navigate { url: String },
    Click { selector: String },
    Fill {
        selector: String,
        #[serde(default)]
        value: String,
    },
    Scroll {
        #[serde(deserialize_with = "lenient_i64")]
        x: i64,
        #[serde(deserialize_with = "lenient_i64")]
        y: i64,
    },
}

/// Advisory enrichment attached to click actions. Never required for replay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_siblings: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl ActionContext {
    pub fn is_empty(&self) -> bool {
        self == &ActionContext::default()
    }
}

/// One observed user interaction.
///
/// `timestamp` is a capture-time marker in milliseconds since an arbitrary
/// epoch; it orders actions relative to each other and carries no wall-clock
/// meaning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedAction {
    #[serde(flatten)]
    pub payload: ActionPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ActionContext>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub timestamp: u64,
}

impl CapturedAction {
    pub fn navigate(url: impl Into<String>, timestamp: u64) -> Self {
        Self {
            payload: ActionPayload::Navigate { url: url.into() },
            context: None,
            timestamp,
        }
    }

    pub fn click(selector: impl Into<String>, context: Option<ActionContext>, timestamp: u64) -> Self {
        Self {
            payload: ActionPayload::Click {
                selector: selector.into(),
            },
            context: context.filter(|ctx| !ctx.is_empty()),
            timestamp,
        }
    }

    pub fn fill(selector: impl Into<String>, value: impl Into<String>, timestamp: u64) -> Self {
        Self {
            payload: ActionPayload::Fill {
                selector: selector.into(),
                value: value.into(),
            },
            context: None,
            timestamp,
        }
    }

    pub fn scroll(offset: ScrollOffset, timestamp: u64) -> Self {
        Self {
            payload: ActionPayload::Scroll {
                x: offset.x,
                y: offset.y,
            },
            context: None,
            timestamp,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self.payload {
            ActionPayload::Navigate { .. } => ActionKind::Navigate,
            ActionPayload::Click { .. } => ActionKind::Click,
            ActionPayload::Fill { .. } => ActionKind::Fill,
            ActionPayload::Scroll { .. } => ActionKind::Scroll,
        }
    }

    /// Locator of the target element; absent for navigations and scrolls.
    pub fn selector(&self) -> Option<&str> {
        match &self.payload {
            ActionPayload::Click { selector } | ActionPayload::Fill { selector, .. } => {
                Some(selector.as_str())
            }
            ActionPayload::Navigate { .. } | ActionPayload::Scroll { .. } => None,
        }
    }

    /// Variant-dependent value: fill text, target URL, or `"x,y"` for scrolls.
    pub fn value(&self) -> Option<String> {
        match &self.payload {
            ActionPayload::Navigate { url } => Some(url.clone()),
            ActionPayload::Fill { value, .. } => Some(value.clone()),
            ActionPayload::Scroll { x, y } => Some(format!("{x},{y}")),
            ActionPayload::Click { .. } => None,
        }
    }

    pub fn scroll_offset(&self) -> Option<ScrollOffset> {
        match self.payload {
            ActionPayload::Scroll { x, y } => Some(ScrollOffset { x, y }),
            _ => None,
        }
    }

    /// Parses one action from a JSON object, rejecting selector-bearing
    /// actions whose selector is blank.
    pub fn from_json(value: Value) -> Result<Self, CoreError> {
        let action: CapturedAction = serde_json::from_value(value)
            .map_err(|err| CoreError::InvalidAction(err.to_string()))?;
        if matches!(action.selector(), Some(sel) if sel.trim().is_empty()) {
            return Err(CoreError::InvalidAction(format!(
                "{} action without selector",
                action.kind()
            )));
        }
        Ok(action)
    }
}

impl fmt::Display for CapturedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            ActionPayload::Navigate { url } => write!(f, "navigate {url}"),
            ActionPayload::Click { selector } => write!(f, "click {selector}"),
            ActionPayload::Fill { selector, value } => {
                write!(f, "fill {selector} ({} chars)", value.chars().count())
            }
            ActionPayload::Scroll { x, y } => write!(f, "scroll {x},{y}"),
        }
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => 0,
        Some(value) => match timestamp_millis(&value) {
            Some(millis) => millis,
            None => {
                debug!(target: "core-types", raw = %value, "malformed timestamp coerced to 0");
                0
            }
        },
    })
}

/// Non-negative epoch millis, or `None` when the value cannot be one.
fn timestamp_millis(value: &Value) -> Option<u64> {
    let num = value.as_number()?;
    num.as_u64()
        .or_else(|| num.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let num = serde_json::Number::deserialize(deserializer)?;
    num.as_i64()
        .or_else(|| num.as_f64().map(|v| v.round() as i64))
        .ok_or_else(|| serde::de::Error::custom("coordinate out of range"))
}
