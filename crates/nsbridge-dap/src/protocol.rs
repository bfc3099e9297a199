//! DAP protocol message types.
//!
//! Only the envelopes and the argument/body shapes the adapter and the
//! transform pipeline look into are typed; everything else travels as
//! `serde_json::Value`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// A DAP request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    /// Always "request".
    #[serde(rename = "type")]
    pub message_type: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl Request {
    pub fn new(seq: i64, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            seq,
            message_type: "request".into(),
            command: command.into(),
            arguments,
        }
    }
}

/// A DAP response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Assigned when the response is sent.
    pub seq: i64,
    /// Always "response".
    #[serde(rename = "type")]
    pub message_type: String,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    /// Error message if `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// A successful response to `request`.
    pub fn success(request: &Request, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            message_type: "response".into(),
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    /// A failed response carrying only a message.
    pub fn failure(request: &Request, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::success(request, None)
        }
    }

    /// A failed response carrying a structured error in `body.error`.
    pub fn error(request: &Request, error: ErrorMessage) -> Self {
        let message = error.formatted();
        let body = serde_json::to_value(ErrorResponseBody { error }).ok();
        Self {
            success: false,
            message: Some(message),
            body,
            ..Self::success(request, None)
        }
    }

    /// Numeric code of a structured error, if any.
    pub fn error_id(&self) -> Option<i64> {
        self.body.as_ref()?.get("error")?.get("id")?.as_i64()
    }
}

/// A DAP event message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned when the event is sent.
    pub seq: i64,
    /// Always "event".
    #[serde(rename = "type")]
    pub message_type: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    pub fn new(event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            message_type: "event".into(),
            event: event.into(),
            body,
        }
    }

    pub fn initialized() -> Self {
        Self::new("initialized", None)
    }

    pub fn terminated() -> Self {
        Self::new("terminated", None)
    }

    /// An `output` event for one line of CLI output.
    pub fn output(category: OutputCategory, text: &str) -> Self {
        let body = OutputEventBody {
            category,
            output: format!("{text}\n"),
        };
        Self::new("output", serde_json::to_value(body).ok())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Where a structured error should be reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDestination {
    User,
    Telemetry,
}

/// The `body.error` of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub id: i64,
    /// Message template; `{name}` is replaced from `variables`.
    pub format: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_telemetry: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_user: Option<bool>,
}

impl ErrorMessage {
    pub fn new(id: i64, format: impl Into<String>, destination: ErrorDestination) -> Self {
        let (send_telemetry, show_user) = match destination {
            ErrorDestination::User => (None, Some(true)),
            ErrorDestination::Telemetry => (Some(true), None),
        };
        Self {
            id,
            format: format.into(),
            variables: BTreeMap::new(),
            send_telemetry,
            show_user,
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// `format` with every known `{name}` substituted.
    pub fn formatted(&self) -> String {
        self.variables
            .iter()
            .fold(self.format.clone(), |text, (name, value)| {
                text.replace(&format!("{{{name}}}"), value)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponseBody {
    pub error: ErrorMessage,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputCategory {
    Console,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEventBody {
    pub category: OutputCategory,
    pub output: String,
}

// ---------------------------------------------------------------------------
// Requests handled by the adapter itself
// ---------------------------------------------------------------------------

/// Arguments for the `initialize` request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequestArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, rename = "adapterID", skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,
    /// Whether lines are 1-based. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_start_at1: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns_start_at1: Option<bool>,
    /// "path" or "uri".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_format: Option<String>,
}

/// Capabilities returned in the `initialize` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_configuration_done_request: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_conditional_breakpoints: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_evaluate_for_hovers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_function_breakpoints: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_breakpoint_filters: Option<Vec<ExceptionBreakpointsFilter>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionBreakpointsFilter {
    pub filter: String,
    pub label: String,
    #[serde(default)]
    pub default: bool,
}

/// Arguments shared by `launch` and `attach`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequestArguments {
    /// "ios" or "android".
    pub platform: String,
    /// Root directory of the NativeScript app.
    pub app_root: String,
    #[serde(default)]
    pub emulator: bool,
    /// Launch only.
    #[serde(default)]
    pub stop_on_entry: bool,
    /// Extra CLI arguments, appended after `--no-client`.
    #[serde(default)]
    pub tns_args: Vec<String>,
}

// ---------------------------------------------------------------------------
// Shapes the pipeline rewrites
// ---------------------------------------------------------------------------

/// A source location.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Arguments for the `setBreakpoints` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    pub source: Source,
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,
}

/// A breakpoint as reported back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
}

/// Arguments for the `evaluate` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<Value>,
    /// "watch", "repl", "hover".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}
