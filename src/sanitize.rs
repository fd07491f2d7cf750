use std::cell::RefCell;
use std::collections::HashSet;

use serde_json::{Map as JsonMap, Value};
use tracing::warn;

use crate::value::{CapturedValue, RenderError, CYCLE_MARKER};

/// Type-specific rendering hook consulted by the [`Sanitizer`] before its
/// built-in rules.
///
/// Renderers are an ordered list configured at construction time; the first
/// one whose `can` returns `true` wins. A failing `render` never propagates:
/// the sanitizer logs it and substitutes a type-name placeholder.
pub trait ValueRenderer {
    /// Whether this renderer handles the given value.
    fn can(&self, value: &CapturedValue) -> bool;

    /// Produce the JSON rendering for a value this renderer claimed.
    fn render(&self, value: &CapturedValue) -> Result<Value, RenderError>;
}

/// Reduces captured runtime values to JSON-safe primitives.
///
/// Guarantees: never panics, never returns an error, terminates on
/// self-referential input. Cycles render as [`CYCLE_MARKER`]; the same value
/// reached twice over independent paths is rendered twice.
pub struct Sanitizer {
    renderers: Vec<Box<dyn ValueRenderer>>,
}

impl Sanitizer {
    pub fn new(renderers: Vec<Box<dyn ValueRenderer>>) -> Self {
        Sanitizer { renderers }
    }

    /// Recursively transform one captured value into a JSON-safe value.
    pub fn transform(&self, value: &CapturedValue) -> Value {
        let visiting = RefCell::new(HashSet::new());
        self.transform_inner(value, &visiting)
    }

    fn transform_inner(&self, value: &CapturedValue, visiting: &RefCell<HashSet<usize>>) -> Value {
        // Null stays null and never enters the cycle guard.
        if matches!(value, CapturedValue::Null) {
            return Value::Null;
        }

        let _guard = match value.identity() {
            Some(token) => match VisitGuard::enter(visiting, token) {
                Some(guard) => Some(guard),
                None => return Value::String(CYCLE_MARKER.to_owned()),
            },
            None => None,
        };

        for renderer in &self.renderers {
            if renderer.can(value) {
                return match renderer.render(value) {
                    Ok(rendered) => rendered,
                    Err(err) => {
                        warn!(error = %err, kind = value.type_name(), "value renderer failed");
                        degraded(value)
                    }
                };
            }
        }

        match value {
            CapturedValue::Null => Value::Null,
            CapturedValue::Bool(inner) => Value::Bool(*inner),
            CapturedValue::Int(inner) => Value::from(*inner),
            CapturedValue::Uint(inner) => Value::from(*inner),
            // JSON has no NaN or infinities; those degrade to null.
            CapturedValue::Float(inner) => serde_json::Number::from_f64(*inner)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CapturedValue::Str(inner) => Value::String(inner.clone()),
            CapturedValue::Seq(items) => Value::Array(
                items
                    .borrow()
                    .iter()
                    .map(|item| self.transform_inner(item, visiting))
                    .collect(),
            ),
            CapturedValue::Map(entries) => {
                let mut object = JsonMap::new();
                for (key, entry) in entries.borrow().iter() {
                    object.insert(key.clone(), self.transform_inner(entry, visiting));
                }
                Value::Object(object)
            }
            CapturedValue::Opaque(capture) => match capture.render() {
                // The rendered text goes back through the pipeline so custom
                // renderers see it too.
                Ok(rendered) => self.transform_inner(&CapturedValue::Str(rendered), visiting),
                Err(err) => {
                    warn!(error = %err, kind = capture.type_name(), "opaque value rendering failed");
                    degraded(value)
                }
            },
        }
    }
}

fn degraded(value: &CapturedValue) -> Value {
    Value::String(format!("<{}>", value.type_name()))
}

/// Marks a value as being visited for the duration of one recursion step.
/// Removal happens in `Drop`, so the guard stays correct on every exit path.
struct VisitGuard<'a> {
    visiting: &'a RefCell<HashSet<usize>>,
    token: usize,
}

impl<'a> VisitGuard<'a> {
    fn enter(visiting: &'a RefCell<HashSet<usize>>, token: usize) -> Option<Self> {
        if !visiting.borrow_mut().insert(token) {
            return None;
        }
        Some(VisitGuard { visiting, token })
    }
}

impl Drop for VisitGuard<'_> {
    fn drop(&mut self) {
        self.visiting.borrow_mut().remove(&self.token);
    }
}
