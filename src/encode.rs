use tracing::warn;

use crate::event::LogEvent;

/// Serialize an event to JSON text, degrading instead of failing.
///
/// **Returns**
/// - The full event on success.
/// - The event without its exception interfaces if the first attempt fails.
/// - The literal `{}` if both attempts fail.
///
/// The result is always syntactically valid JSON; losing event detail is
/// preferred over losing the log pipeline.
pub fn to_json(event: &LogEvent) -> String {
    match serde_json::to_string(event) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!(error = %err, "event encoding failed, retrying without exception data");
            let mut stripped = event.clone();
            stripped.exception = None;
            stripped.stacktrace = None;
            serde_json::to_string(&stripped).unwrap_or_else(|_| "{}".to_owned())
        }
    }
}
