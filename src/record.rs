use crate::traceback::CapturedTraceback;
use crate::value::CapturedValue;

/// One structured log event as handed over by the host logging framework.
#[derive(Clone)]
pub struct LogRecord {
    /// Name of the logger that emitted the record.
    pub logger: String,
    /// Numeric severity.
    pub level: u32,
    /// Raw, uninterpolated message.
    pub msg: String,
    /// Positional format arguments for `msg`.
    pub args: Vec<CapturedValue>,
    /// Function name at the call site.
    pub function: String,
    /// Module name at the call site.
    pub module: String,
    /// Exception captured together with the record, if any.
    pub exception: Option<CapturedException>,
}

/// Exception data attached to a log record.
#[derive(Clone)]
pub struct CapturedException {
    /// Rendered name of the exception type.
    pub type_name: String,
    /// Rendered exception value.
    pub value: String,
    /// Module that owns the exception type. Falls back to the record's
    /// module when the host did not capture it.
    pub module: Option<String>,
    pub traceback: CapturedTraceback,
}

impl LogRecord {
    /// Interpolate the raw message with the record's arguments.
    ///
    /// Each `%s` consumes one argument in order; `%%` renders a literal
    /// percent sign. Placeholders beyond the argument list are kept
    /// verbatim rather than failing the record.
    pub fn rendered_message(&self) -> String {
        if self.args.is_empty() {
            return self.msg.clone();
        }

        let mut rendered = String::with_capacity(self.msg.len());
        let mut args = self.args.iter();
        let mut chars = self.msg.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch != '%' {
                rendered.push(ch);
                continue;
            }
            match chars.peek() {
                Some('s') => {
                    chars.next();
                    match args.next() {
                        Some(arg) => rendered.push_str(&arg.display_string()),
                        None => rendered.push_str("%s"),
                    }
                }
                Some('%') => {
                    chars.next();
                    rendered.push('%');
                }
                _ => rendered.push('%'),
            }
        }
        rendered
    }

    /// Every argument rendered independently as a string, so the params
    /// list stays JSON-safe even for values with no data representation.
    pub fn stringified_args(&self) -> Vec<String> {
        self.args.iter().map(CapturedValue::display_string).collect()
    }
}
