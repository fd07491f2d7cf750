use std::rc::Rc;

use chrono::Utc;
use uuid::Uuid;

use crate::encode;
use crate::event::{ExceptionInterface, LogEvent, MessageInterface, StacktraceInterface};
use crate::frames::{FrameExtractor, ModuleResolver};
use crate::record::LogRecord;
use crate::sanitize::{Sanitizer, ValueRenderer};
use crate::shorten::{MAX_LENGTH_LIST, MAX_LENGTH_STRING};

/// Formatter configuration. Read-only once the formatter is constructed.
///
/// **Fields**
/// - `project`: tags events with a project identifier when set.
/// - `server_name`: overrides the auto-detected host name.
/// - `string_max_length` / `list_max_length`: bounding limits applied to
///   frame variables.
#[derive(Clone, Debug)]
pub struct FormatterConfig {
    pub project: Option<String>,
    pub server_name: Option<String>,
    pub string_max_length: usize,
    pub list_max_length: usize,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        FormatterConfig {
            project: None,
            server_name: None,
            string_max_length: MAX_LENGTH_STRING,
            list_max_length: MAX_LENGTH_LIST,
        }
    }
}

/// Renders [`LogRecord`]s as Sentry-schema JSON lines.
///
/// The host name is resolved once here and reused for every event. All
/// state is read-only after construction, so a single formatter can be
/// shared across threads of the host framework for concurrent reads.
pub struct SentryFormatter {
    project: Option<String>,
    server_name: String,
    sanitizer: Sanitizer,
    extractor: FrameExtractor,
}

impl SentryFormatter {
    pub fn new(config: FormatterConfig) -> Self {
        Self::with_renderers(config, Vec::new())
    }

    /// Construct with an explicit ordered renderer list; the sanitizer
    /// consults it before its built-in rules.
    pub fn with_renderers(config: FormatterConfig, renderers: Vec<Box<dyn ValueRenderer>>) -> Self {
        let server_name = config.server_name.clone().unwrap_or_else(detect_server_name);
        SentryFormatter {
            project: config.project,
            server_name,
            sanitizer: Sanitizer::new(renderers),
            extractor: FrameExtractor::new(config.string_max_length, config.list_max_length),
        }
    }

    /// Attach a module resolver used for best-effort frame path shortening.
    pub fn with_module_resolver(mut self, resolver: Rc<dyn ModuleResolver>) -> Self {
        self.extractor = self.extractor.with_resolver(resolver);
        self
    }

    /// Render one record as a single line of JSON.
    ///
    /// Never fails and never panics: in the worst case the result is a
    /// reduced or empty JSON object.
    pub fn format(&self, record: &LogRecord) -> String {
        encode::to_json(&self.build_event(record))
    }

    fn build_event(&self, record: &LogRecord) -> LogEvent {
        let (exception, stacktrace) = match &record.exception {
            Some(captured) => {
                let exception = ExceptionInterface {
                    type_name: captured.type_name.clone(),
                    value: captured.value.clone(),
                    module: captured
                        .module
                        .clone()
                        .unwrap_or_else(|| record.module.clone()),
                };
                let frames = self.extractor.extract(&captured.traceback, &self.sanitizer);
                (Some(exception), Some(StacktraceInterface { frames }))
            }
            None => (None, None),
        };

        LogEvent {
            event_id: Uuid::new_v4().simple().to_string(),
            message: record.rendered_message(),
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            level: record.level,
            logger: record.logger.clone(),
            culprit: record.function.clone(),
            server_name: self.server_name.clone(),
            project: self.project.clone(),
            message_interface: MessageInterface {
                message: record.msg.clone(),
                params: record.stringified_args(),
            },
            exception,
            stacktrace,
        }
    }
}

fn detect_server_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_owned())
}
