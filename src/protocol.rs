//! Request/response messages of the command channel.
//!
//! Requests are JSON objects keyed by `action`:
//!
//! ```text
//! {"action": "expand"}                          -> {"success": true, "count": 3}
//! {"action": "collapse"}                        -> {"success": true, "count": 2}
//! {"action": "setAutoExpand", "enabled": true}  -> {"success": true, "count": 3}
//! {"action": "getState"}                        -> {"success": true, "autoExpandEnabled": true,
//!                                                   "manualCollapseActive": false}
//! {"action": "explode"}                         -> {"success": false, "error": "Unknown action"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ExpandError, ExpandResult};
use crate::state::ReconciliationState;

/// A command from the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    Expand,
    Collapse,
    SetAutoExpand { enabled: bool },
    GetState,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Expand => "expand",
            Command::Collapse => "collapse",
            Command::SetAutoExpand { .. } => "setAutoExpand",
            Command::GetState => "getState",
        }
    }
}

const KNOWN_ACTIONS: &[&str] = &["expand", "collapse", "setAutoExpand", "getState"];

/// What the engine answered to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Number of comments affected, plus a soft warning if the preference
    /// could not be saved.
    Count {
        count: usize,
        warning: Option<String>,
    },
    State(ReconciliationState),
}

impl Reply {
    pub fn count(count: usize) -> Self {
        Reply::Count {
            count,
            warning: None,
        }
    }
}

/// Wire response, one per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_expand_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_collapse_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl Response {
    pub fn failure(error: &ExpandError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn encode(&self) -> String {
        // A struct of plain fields always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"success":false}"#.to_string())
    }
}

impl From<Reply> for Response {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Count { count, warning } => Self {
                success: true,
                count: Some(count),
                warning,
                ..Self::default()
            },
            Reply::State(state) => Self {
                success: true,
                auto_expand_enabled: Some(state.auto_expand_enabled),
                manual_collapse_active: Some(state.manual_collapse_active),
                ..Self::default()
            },
        }
    }
}

impl From<ExpandResult<Reply>> for Response {
    fn from(result: ExpandResult<Reply>) -> Self {
        match result {
            Ok(reply) => reply.into(),
            Err(e) => Response::failure(&e),
        }
    }
}

/// Parse one request.
///
/// An action outside the known set is [`ExpandError::UnknownCommand`]; a known
/// action with bad fields, or something that is not a request object at all,
/// is [`ExpandError::InvalidRequest`].
pub fn parse_request(raw: &str) -> ExpandResult<Command> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ExpandError::InvalidRequest(e.to_string()))?;

    let action = match value.get("action") {
        Some(Value::String(action)) => action.clone(),
        Some(other) => return Err(ExpandError::UnknownCommand(other.to_string())),
        None => {
            return Err(ExpandError::InvalidRequest(
                "missing \"action\" field".to_string(),
            ))
        }
    };

    if !KNOWN_ACTIONS.contains(&action.as_str()) {
        return Err(ExpandError::UnknownCommand(action));
    }

    serde_json::from_value(value).map_err(|e| ExpandError::InvalidRequest(e.to_string()))
}
