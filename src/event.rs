use serde::Serialize;

use crate::frames::FrameDescriptor;

/// The JSON event envelope understood by the error-tracking backend.
///
/// Field names are a fixed wire contract; the `sentry.interfaces.*` renames
/// must stay byte-for-byte as they are.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    /// Random 128-bit identifier, 32 lowercase hex digits.
    pub event_id: String,
    /// Fully interpolated message.
    pub message: String,
    /// UTC, ISO-8601, second precision.
    pub timestamp: String,
    pub level: u32,
    pub logger: String,
    /// Function name where the log call occurred.
    pub culprit: String,
    pub server_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(rename = "sentry.interfaces.Message")]
    pub message_interface: MessageInterface,
    #[serde(rename = "sentry.interfaces.Exception", skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInterface>,
    #[serde(rename = "sentry.interfaces.Stacktrace", skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<StacktraceInterface>,
}

/// Raw message plus independently stringified format arguments.
#[derive(Debug, Clone, Serialize)]
pub struct MessageInterface {
    pub message: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExceptionInterface {
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
    pub module: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StacktraceInterface {
    pub frames: Vec<FrameDescriptor>,
}
