use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::warn;

use crate::value::CapturedValue;

/// Name of the cooperative frame-local that asks for a frame to be left out
/// of rendered stack traces. Honored when its value is truthy.
pub const TRACEBACK_HIDE_LOCAL: &str = "__traceback_hide__";

/// Placeholder substituted for a frame's variables when its scope could not
/// be coerced into a mapping.
pub const INVALID_LOCAL_SCOPE: &str = "<invalid local scope>";

/// Capability interface over a frame's local-variable scope.
///
/// Scopes only have to support key enumeration and per-key lookup; they do
/// not need full mapping behavior. Enumeration may fail, in which case the
/// frame's variables degrade to [`INVALID_LOCAL_SCOPE`].
pub trait LocalScope {
    /// Enumerate the variable names present in this scope.
    fn keys(&self) -> Result<Vec<String>, ScopeError>;

    /// Look up one variable by name. `None` when absent or unreadable.
    fn get(&self, key: &str) -> Option<CapturedValue>;
}

#[derive(thiserror::Error, Debug)]
pub enum ScopeError {
    #[error("local scope does not support key enumeration: {0}")]
    Unsupported(String),
}

/// Plain map-backed scope, the common case for captured frames.
pub struct MapScope {
    entries: BTreeMap<String, CapturedValue>,
}

impl MapScope {
    pub fn new(entries: BTreeMap<String, CapturedValue>) -> Self {
        MapScope { entries }
    }
}

impl LocalScope for MapScope {
    fn keys(&self) -> Result<Vec<String>, ScopeError> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn get(&self, key: &str) -> Option<CapturedValue> {
        self.entries.get(key).cloned()
    }
}

/// Source-access capability of the loader that imported a module, tried
/// before falling back to reading the file from disk.
pub trait SourceLoader {
    /// Full source text of the given module, if this loader can provide it.
    fn get_source(&self, module: &str) -> Option<String>;
}

/// One function activation captured from an exception traceback.
#[derive(Clone)]
pub struct CapturedFrame {
    /// Absolute path of the source file, as reported by the runtime.
    pub abs_path: Option<String>,
    /// Name of the executing function.
    pub function: Option<String>,
    /// Dotted module name the frame belongs to.
    pub module: Option<String>,
    /// 1-based line number reported by the runtime.
    pub lineno: Option<u32>,
    /// The frame's local-variable scope, if captured.
    pub locals: Option<Rc<dyn LocalScope>>,
    /// Loader of the frame's module, for source retrieval.
    pub loader: Option<Rc<dyn SourceLoader>>,
}

/// Captured call stack in the order reported by the runtime.
#[derive(Clone)]
pub struct CapturedTraceback {
    pub frames: Vec<CapturedFrame>,
}

impl CapturedTraceback {
    pub fn new(frames: Vec<CapturedFrame>) -> Self {
        CapturedTraceback { frames }
    }

    /// Frames in traceback order, minus the ones that ask to be hidden.
    pub fn iter_visible(&self) -> impl Iterator<Item = &CapturedFrame> {
        self.frames.iter().filter(|frame| !frame.is_hidden())
    }
}

impl CapturedFrame {
    /// Whether this frame carries a truthy [`TRACEBACK_HIDE_LOCAL`] marker.
    pub fn is_hidden(&self) -> bool {
        let Some(scope) = &self.locals else {
            return false;
        };
        scope
            .get(TRACEBACK_HIDE_LOCAL)
            .map_or(false, |marker| marker.is_truthy())
    }

    /// Coerce the local scope into a plain mapping value, ready for
    /// sanitization. A frame without locals yields an empty mapping;
    /// a scope that refuses coercion yields [`INVALID_LOCAL_SCOPE`].
    pub fn locals_value(&self) -> CapturedValue {
        let Some(scope) = &self.locals else {
            return CapturedValue::map(BTreeMap::new());
        };
        match coerce_scope(scope.as_ref()) {
            Ok(entries) => CapturedValue::map(entries),
            Err(err) => {
                warn!(error = %err, "failed to coerce frame locals");
                CapturedValue::Str(INVALID_LOCAL_SCOPE.to_owned())
            }
        }
    }
}

fn coerce_scope(scope: &dyn LocalScope) -> Result<BTreeMap<String, CapturedValue>, ScopeError> {
    let mut entries = BTreeMap::new();
    for key in scope.keys()? {
        // A listed key that fails lookup still appears, as null.
        let value = scope.get(&key).unwrap_or(CapturedValue::Null);
        entries.insert(key, value);
    }
    Ok(entries)
}
