//! Conversion of tool outcomes into MCP tool results.
//!
//! Success payloads pass through untouched; every failure, local or from the
//! runner, becomes the same `{kind, message, details?}` shape.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, ErrorKind, Result};
use crate::protocol::{ContentItem, ToolCallResult};

/// A successful tool outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Data returned to the agent, usually the runner's payload verbatim.
    pub payload: Value,
    /// Text shown instead of the pretty-printed payload.
    pub summary: Option<String>,
}

impl ToolOutput {
    /// Output carrying `payload` only.
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            summary: None,
        }
    }

    /// Attach a text summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// A failed tool outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolFailure {
    /// Failure kind.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Status code, body, or other detail the agent can act on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&Error> for ToolFailure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

/// Outcome of exactly one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// The tool ran.
    Success(ToolOutput),
    /// The tool failed.
    Failure(ToolFailure),
}

impl ToolResult {
    /// Whether this is a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Failure(_))
    }

    /// Failure kind, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ToolResult::Success(_) => None,
            ToolResult::Failure(f) => Some(f.kind),
        }
    }

    /// Success payload, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            ToolResult::Success(out) => Some(&out.payload),
            ToolResult::Failure(_) => None,
        }
    }

    /// MCP wire form.
    ///
    /// Success: the summary (or pretty JSON payload) as text, plus the payload
    /// as `structuredContent` when it is an object. Failure: the pretty JSON
    /// failure as text with `isError` set.
    pub fn into_call_result(self) -> ToolCallResult {
        match self {
            ToolResult::Success(out) => {
                let text = match out.summary {
                    Some(summary) => summary,
                    None => pretty(&out.payload),
                };
                let structured_content = out.payload.is_object().then_some(out.payload);
                ToolCallResult {
                    content: vec![ContentItem::text(text)],
                    structured_content,
                    is_error: false,
                }
            }
            ToolResult::Failure(failure) => {
                let text = serde_json::to_string_pretty(&failure).unwrap_or_else(|_| {
                    format!("{}: {}", failure.kind, failure.message)
                });
                ToolCallResult {
                    content: vec![ContentItem::text(text)],
                    structured_content: None,
                    is_error: true,
                }
            }
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Fold a dispatch outcome into a tool result.
pub fn normalize(outcome: Result<ToolOutput>) -> ToolResult {
    match outcome {
        Ok(output) => ToolResult::Success(output),
        Err(err) => ToolResult::Failure(ToolFailure::from(&err)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use serde_json::json;

    #[test]
    fn success_payload_is_unchanged() {
        let result = normalize(Ok(ToolOutput::new(json!({"success": true}))));
        assert_eq!(result.payload(), Some(&json!({"success": true})));

        let call = result.into_call_result();
        assert!(!call.is_error);
        assert_eq!(call.structured_content, Some(json!({"success": true})));
        let text: Value = serde_json::from_str(call.content[0].as_text()).unwrap();
        assert_eq!(text, json!({"success": true}));
    }

    #[test]
    fn runner_reported_failure_is_still_a_success_payload() {
        let body = json!({"success": false, "error": "element not found"});
        let result = normalize(Ok(ToolOutput::new(body.clone())));
        assert!(!result.is_error());
        assert_eq!(result.payload(), Some(&body));
    }

    #[test]
    fn non_object_payloads_skip_structured_content() {
        let call = normalize(Ok(ToolOutput::new(Value::Null))).into_call_result();
        assert_eq!(call.structured_content, None);
        assert_eq!(call.content[0].as_text(), "null");

        let call = normalize(Ok(ToolOutput::new(json!([1, 2])))).into_call_result();
        assert_eq!(call.structured_content, None);
    }

    #[test]
    fn summary_replaces_text_but_keeps_payload() {
        let output = ToolOutput::new(json!({"data": {"elements": []}})).with_summary("UI Snapshot (0 elements)");
        let call = normalize(Ok(output)).into_call_result();
        assert_eq!(call.content[0].as_text(), "UI Snapshot (0 elements)");
        assert_eq!(call.structured_content, Some(json!({"data": {"elements": []}})));
    }

    #[test]
    fn errors_share_one_shape() {
        let cases = [
            (Error::UnknownTool("ui_nope".into()), ErrorKind::UnknownTool),
            (Error::InvalidArguments("text missing".into()), ErrorKind::InvalidArguments),
            (Error::NoActiveConnection, ErrorKind::NoActiveConnection),
            (
                Error::BackendUnreachable {
                    url: "http://localhost:9876/health".into(),
                    reason: "connection refused".into(),
                },
                ErrorKind::BackendUnreachable,
            ),
            (
                Error::BackendTimeout {
                    url: "http://localhost:9876/health".into(),
                    timeout: Duration::from_secs(30),
                },
                ErrorKind::BackendTimeout,
            ),
            (
                Error::BackendError {
                    status: 404,
                    body: "no such element".into(),
                },
                ErrorKind::BackendError,
            ),
            (
                Error::BackendProtocolError("expected value".into()),
                ErrorKind::BackendProtocolError,
            ),
        ];

        for (err, kind) in cases {
            let message = err.to_string();
            let result = normalize(Err(err));
            assert_eq!(result.error_kind(), Some(kind));

            let call = result.into_call_result();
            assert!(call.is_error);
            let body: Value = serde_json::from_str(call.content[0].as_text()).unwrap();
            assert_eq!(body["kind"], kind.as_str());
            assert_eq!(body["message"], message.as_str());
        }
    }

    #[test]
    fn backend_error_details_reach_the_agent() {
        let call = normalize(Err(Error::BackendError {
            status: 500,
            body: "boom".into(),
        }))
        .into_call_result();
        let body: Value = serde_json::from_str(call.content[0].as_text()).unwrap();
        assert_eq!(body["details"], json!({"status": 500, "body": "boom"}));
    }
}
