use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fmt::Write as _;
use std::rc::Rc;

/// Placeholder emitted when rendering a value would revisit an ancestor of
/// the current traversal.
pub const CYCLE_MARKER: &str = "<...>";

/// Error produced by a rendering step that could not build its output.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("value rendering failed: {0}")]
    Failed(String),
}

/// A runtime value captured from the host application for inclusion in a
/// log event.
///
/// Containers are shared (`Rc`), so a captured structure may legitimately
/// reference itself; consumers use [`CapturedValue::identity`] to detect
/// that. Values the host cannot express as data are captured behind the
/// [`OpaqueCapture`] seam.
#[derive(Clone)]
pub enum CapturedValue {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Seq(Rc<RefCell<Vec<CapturedValue>>>),
    Map(Rc<RefCell<BTreeMap<String, CapturedValue>>>),
    Opaque(Rc<dyn OpaqueCapture>),
}

/// Capture seam for values with no data representation.
///
/// **Returns**
/// - `type_name`: stable name of the captured value's type, used for the
///   degraded placeholder when rendering fails.
/// - `render`: a best-effort human-readable rendering. May fail; the caller
///   is responsible for degrading gracefully.
pub trait OpaqueCapture {
    fn type_name(&self) -> &str;
    fn render(&self) -> Result<String, RenderError>;
}

/// [`OpaqueCapture`] adapter over any `Debug` value.
pub struct DebugCapture<T> {
    value: T,
    type_name: &'static str,
}

impl<T: fmt::Debug> DebugCapture<T> {
    pub fn new(value: T) -> Self {
        DebugCapture {
            value,
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl<T: fmt::Debug> OpaqueCapture for DebugCapture<T> {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn render(&self) -> Result<String, RenderError> {
        Ok(format!("{:?}", self.value))
    }
}

impl CapturedValue {
    pub fn seq(items: Vec<CapturedValue>) -> Self {
        CapturedValue::Seq(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: BTreeMap<String, CapturedValue>) -> Self {
        CapturedValue::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn opaque(capture: impl OpaqueCapture + 'static) -> Self {
        CapturedValue::Opaque(Rc::new(capture))
    }

    /// Capture any `Debug` value as an opaque handle.
    pub fn from_debug<T: fmt::Debug + 'static>(value: T) -> Self {
        Self::opaque(DebugCapture::new(value))
    }

    /// Stable identity token for values that can participate in cycles.
    /// Scalars have no identity and return `None`.
    pub fn identity(&self) -> Option<usize> {
        match self {
            CapturedValue::Seq(items) => Some(Rc::as_ptr(items) as *const () as usize),
            CapturedValue::Map(entries) => Some(Rc::as_ptr(entries) as *const () as usize),
            CapturedValue::Opaque(capture) => Some(Rc::as_ptr(capture) as *const () as usize),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            CapturedValue::Null => "null",
            CapturedValue::Bool(_) => "bool",
            CapturedValue::Int(_) => "int",
            CapturedValue::Uint(_) => "uint",
            CapturedValue::Float(_) => "float",
            CapturedValue::Str(_) => "str",
            CapturedValue::Seq(_) => "seq",
            CapturedValue::Map(_) => "map",
            CapturedValue::Opaque(capture) => capture.type_name(),
        }
    }

    /// Truthiness used by cooperative marker variables: null, `false`, zero
    /// and empty containers are false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            CapturedValue::Null => false,
            CapturedValue::Bool(value) => *value,
            CapturedValue::Int(value) => *value != 0,
            CapturedValue::Uint(value) => *value != 0,
            CapturedValue::Float(value) => *value != 0.0,
            CapturedValue::Str(value) => !value.is_empty(),
            CapturedValue::Seq(items) => !items.borrow().is_empty(),
            CapturedValue::Map(entries) => !entries.borrow().is_empty(),
            CapturedValue::Opaque(_) => true,
        }
    }

    /// Best-effort display rendering. Cycle-safe and infallible: opaque
    /// values that fail to render fall back to their type name.
    pub fn display_string(&self) -> String {
        let mut out = String::new();
        self.write_display(&mut out, &mut HashSet::new());
        out
    }

    fn write_display(&self, out: &mut String, visiting: &mut HashSet<usize>) {
        if let Some(token) = self.identity() {
            if !visiting.insert(token) {
                out.push_str(CYCLE_MARKER);
                return;
            }
        }

        match self {
            CapturedValue::Null => out.push_str("null"),
            CapturedValue::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
            CapturedValue::Int(value) => {
                let _ = write!(out, "{}", value);
            }
            CapturedValue::Uint(value) => {
                let _ = write!(out, "{}", value);
            }
            CapturedValue::Float(value) => {
                let _ = write!(out, "{}", value);
            }
            CapturedValue::Str(value) => out.push_str(value),
            CapturedValue::Seq(items) => {
                out.push('[');
                for (index, item) in items.borrow().iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    item.write_display(out, visiting);
                }
                out.push(']');
            }
            CapturedValue::Map(entries) => {
                out.push('{');
                for (index, (key, entry)) in entries.borrow().iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(key);
                    out.push_str(": ");
                    entry.write_display(out, visiting);
                }
                out.push('}');
            }
            CapturedValue::Opaque(capture) => match capture.render() {
                Ok(rendered) => out.push_str(&rendered),
                Err(_) => {
                    let _ = write!(out, "<{}>", capture.type_name());
                }
            },
        }

        if let Some(token) = self.identity() {
            visiting.remove(&token);
        }
    }
}

impl From<bool> for CapturedValue {
    fn from(value: bool) -> Self {
        CapturedValue::Bool(value)
    }
}

impl From<i64> for CapturedValue {
    fn from(value: i64) -> Self {
        CapturedValue::Int(value)
    }
}

impl From<i32> for CapturedValue {
    fn from(value: i32) -> Self {
        CapturedValue::Int(value as i64)
    }
}

impl From<u64> for CapturedValue {
    fn from(value: u64) -> Self {
        CapturedValue::Uint(value)
    }
}

impl From<f64> for CapturedValue {
    fn from(value: f64) -> Self {
        CapturedValue::Float(value)
    }
}

impl From<&str> for CapturedValue {
    fn from(value: &str) -> Self {
        CapturedValue::Str(value.to_owned())
    }
}

impl From<String> for CapturedValue {
    fn from(value: String) -> Self {
        CapturedValue::Str(value)
    }
}

impl From<Vec<CapturedValue>> for CapturedValue {
    fn from(items: Vec<CapturedValue>) -> Self {
        CapturedValue::seq(items)
    }
}
