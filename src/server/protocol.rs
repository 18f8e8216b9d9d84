//! Wire protocol
//!
//! A request is one JSON object followed by a blank line (`\n\n`); the
//! response is one JSON object followed by `\n`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::pipeline::Reply;

/// Session used when a request does not name one
pub const DEFAULT_SESSION: &str = "default_session";

/// A parsed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    SendMessage {
        session_id: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        system_prompt: Option<String>,
    },
    Ping,
    Shutdown,
    CleanupHistory,
}

impl Request {
    pub fn send_message(
        session_id: impl Into<String>,
        message: impl Into<String>,
        system_prompt: Option<String>,
    ) -> Self {
        Request::SendMessage {
            session_id: session_id.into(),
            message: message.into(),
            system_prompt,
        }
    }

    /// Parse one request payload
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(payload.trim())
            .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::InvalidJson("expected a JSON object".to_string()))?;
        let action = object
            .get("action")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingAction)?;
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        match action {
            "send_message" => {
                let message = text("message").ok_or(ProtocolError::EmptyMessage)?;
                Ok(Request::SendMessage {
                    session_id: text("session_id").unwrap_or(DEFAULT_SESSION).to_string(),
                    message: message.to_string(),
                    system_prompt: text("system_prompt").map(str::to_string),
                })
            }
            "ping" => Ok(Request::Ping),
            "shutdown" => Ok(Request::Shutdown),
            "cleanup_history" => Ok(Request::CleanupHistory),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Request::SendMessage { .. } => "send_message",
            Request::Ping => "ping",
            Request::Shutdown => "shutdown",
            Request::CleanupHistory => "cleanup_history",
        }
    }
}

/// A response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Response {
    pub fn ok(response: impl Into<String>) -> Self {
        Self {
            success: true,
            response: Some(response.into()),
            error: None,
            metadata: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl From<Reply> for Response {
    fn from(reply: Reply) -> Self {
        Self {
            success: reply.success,
            response: reply.response,
            error: reply.error,
            metadata: Some(reply.metadata),
        }
    }
}

impl From<ProtocolError> for Response {
    fn from(error: ProtocolError) -> Self {
        Response::error(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_message_defaults_session() {
        let req = Request::parse(r#"{"action": "send_message", "message": " hi "}"#).unwrap();
        assert_eq!(req, Request::send_message(DEFAULT_SESSION, "hi", None));

        let req = Request::parse(
            r#"{"action": "send_message", "session_id": "s1", "message": "hi", "system_prompt": "be brief"}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            Request::send_message("s1", "hi", Some("be brief".to_string()))
        );
    }

    #[test]
    fn test_parse_errors() {
        let err = Request::parse("{not json").unwrap_err();
        assert!(err.to_string().starts_with("Invalid JSON: "));
        assert_eq!(
            Request::parse(r#"{"message": "hi"}"#).unwrap_err().to_string(),
            "Missing \"action\" field"
        );
        assert_eq!(
            Request::parse(r#"{"action": "reboot"}"#).unwrap_err().to_string(),
            "Unknown action: reboot"
        );
        assert_eq!(
            Request::parse(r#"{"action": "send_message", "message": "   "}"#).unwrap_err(),
            ProtocolError::EmptyMessage
        );
        assert!(matches!(
            Request::parse("[1, 2]"),
            Err(ProtocolError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_simple_actions() {
        assert_eq!(Request::parse(r#"{"action":"ping"}"#).unwrap(), Request::Ping);
        assert_eq!(Request::parse(r#"{"action":"shutdown"}"#).unwrap(), Request::Shutdown);
        assert_eq!(
            Request::parse(r#"{"action":"cleanup_history"}"#).unwrap(),
            Request::CleanupHistory
        );
    }

    #[test]
    fn test_serialized_request_parses_back() {
        let req = Request::send_message("s", "save my pin 4242", None);
        let text = serde_json::to_string(&req).unwrap();
        assert!(text.contains(r#""action":"send_message""#));
        assert_eq!(Request::parse(&text).unwrap(), req);
    }

    #[test]
    fn test_response_shape() {
        let text = serde_json::to_string(&Response::ok("pong")).unwrap();
        assert_eq!(text, r#"{"success":true,"response":"pong"}"#);
        let back: Response = serde_json::from_str(r#"{"success":false,"error":"x"}"#).unwrap();
        assert_eq!(back, Response::error("x"));
    }
}
