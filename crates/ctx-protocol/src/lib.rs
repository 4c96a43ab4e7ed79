//! Wire types shared between the recorder, the RPC server, the hook
//! ingestor and the store: the closed event-type vocabulary and the
//! JSON-RPC 2.0 envelope used by the stdio transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of event kinds the store will accept.
///
/// Any value outside this set is coerced to [`EventType::TaskStatus`]
/// by [`EventType::parse`] rather than rejected, since producers
/// (adapters, hooks) are not trusted to stay in sync with this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UserIntent,
    AgentPlan,
    CodeChange,
    Revert,
    DecisionMade,
    ToolUse,
    TestResult,
    ErrorSeen,
    TaskStatus,
    Handoff,
}

impl EventType {
    /// High-value event types are never removed by compaction.
    pub fn is_high_value(self) -> bool {
        matches!(
            self,
            Self::DecisionMade | Self::Handoff | Self::ErrorSeen | Self::ToolUse | Self::Revert
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserIntent => "user_intent",
            Self::AgentPlan => "agent_plan",
            Self::CodeChange => "code_change",
            Self::Revert => "revert",
            Self::DecisionMade => "decision_made",
            Self::ToolUse => "tool_use",
            Self::TestResult => "test_result",
            Self::ErrorSeen => "error_seen",
            Self::TaskStatus => "task_status",
            Self::Handoff => "handoff",
        }
    }

    /// Parses a free-form string, falling back to `task_status` for
    /// anything not in the closed set.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "user_intent" => Self::UserIntent,
            "agent_plan" => Self::AgentPlan,
            "code_change" => Self::CodeChange,
            "revert" => Self::Revert,
            "decision_made" => Self::DecisionMade,
            "tool_use" => Self::ToolUse,
            "test_result" => Self::TestResult,
            "error_seen" => Self::ErrorSeen,
            "handoff" => Self::Handoff,
            _ => Self::TaskStatus,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentinel hash recorded for a file that has been deleted.
pub const DELETED_SENTINEL: &str = "__deleted__";

/// A JSON-RPC 2.0 request as read off the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    /// A request with no `id` is a JSON-RPC notification: no response
    /// is ever sent for it, success or failure.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A JSON-RPC 2.0 response, built with [`Response::ok`] or
/// [`Response::error`].
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    pub code: i64,
    pub message: String,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Standard JSON-RPC error codes used across the transport, plus the
/// one domain-specific extension for "no session is running".
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const NO_ACTIVE_SESSION: i64 = -32010;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_event_type_roundtrips() {
        assert_eq!(EventType::parse("revert"), EventType::Revert);
        assert_eq!(EventType::Revert.as_str(), "revert");
    }

    #[test]
    fn parse_unknown_event_type_falls_back_to_task_status() {
        assert_eq!(EventType::parse("made_up"), EventType::TaskStatus);
    }

    #[test]
    fn high_value_set_matches_closed_list() {
        assert!(EventType::DecisionMade.is_high_value());
        assert!(EventType::Handoff.is_high_value());
        assert!(EventType::ErrorSeen.is_high_value());
        assert!(EventType::ToolUse.is_high_value());
        assert!(EventType::Revert.is_high_value());
        assert!(!EventType::TaskStatus.is_high_value());
        assert!(!EventType::CodeChange.is_high_value());
    }

    #[test]
    fn notification_has_no_id() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn response_ok_serializes_without_error_field() {
        let resp = Response::ok(Value::from(1), serde_json::json!({"ok": true}));
        let text = serde_json::to_string(&resp).unwrap();
        assert!(!text.contains("\"error\""));
    }

    #[test]
    fn response_error_serializes_without_result_field() {
        let resp = Response::error(Value::Null, error_codes::METHOD_NOT_FOUND, "nope");
        let text = serde_json::to_string(&resp).unwrap();
        assert!(!text.contains("\"result\""));
        assert!(text.contains("-32601"));
    }
}
