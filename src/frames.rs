use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

use crate::sanitize::Sanitizer;
use crate::shorten::shorten;
use crate::source::{get_lines_from_file, SourceContext, CONTEXT_LINES};
use crate::traceback::{CapturedFrame, CapturedTraceback};

/// Resolves the defining file of a top-level module, mirroring the host
/// runtime's module table. Used for best-effort frame path shortening.
pub trait ModuleResolver {
    /// Path of the file that defines the given top-level module, if known.
    fn module_file(&self, top_level: &str) -> Option<PathBuf>;
}

/// JSON-ready description of one stack frame.
///
/// The three context fields are omitted from serialized output entirely
/// when the source could not be located, as opposed to being emitted empty.
#[derive(Debug, Clone, Serialize)]
pub struct FrameDescriptor {
    pub abs_path: Option<String>,
    pub filename: Option<String>,
    pub module: Option<String>,
    pub function: String,
    pub lineno: Option<u32>,
    pub vars: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_context: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_context: Option<Vec<String>>,
}

/// Turns captured tracebacks into ordered [`FrameDescriptor`] sequences.
pub struct FrameExtractor {
    string_max_length: usize,
    list_max_length: usize,
    resolver: Option<Rc<dyn ModuleResolver>>,
}

impl FrameExtractor {
    pub fn new(string_max_length: usize, list_max_length: usize) -> Self {
        FrameExtractor {
            string_max_length,
            list_max_length,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Rc<dyn ModuleResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Build descriptors for every visible frame, preserving traceback
    /// order. Hidden frames are dropped both by the iteration and by the
    /// per-frame pass, so the marker works on either entry point.
    pub fn extract(
        &self,
        traceback: &CapturedTraceback,
        sanitizer: &Sanitizer,
    ) -> Vec<FrameDescriptor> {
        let mut descriptors = Vec::new();
        for frame in traceback.iter_visible() {
            if frame.is_hidden() {
                continue;
            }
            descriptors.push(self.describe(frame, sanitizer));
        }
        descriptors
    }

    fn describe(&self, frame: &CapturedFrame, sanitizer: &Sanitizer) -> FrameDescriptor {
        // 0-based for the window math, back to 1-based in the descriptor.
        let line_index = frame.lineno.map(|lineno| (lineno as usize).saturating_sub(1));

        let context = match (&frame.abs_path, line_index) {
            (Some(abs_path), Some(index)) => get_lines_from_file(
                abs_path,
                index,
                CONTEXT_LINES,
                frame.loader.as_deref(),
                frame.module.as_deref(),
            ),
            _ => None,
        };

        let filename = frame.abs_path.as_ref().map(|abs_path| {
            self.relative_filename(abs_path, frame.module.as_deref())
                .unwrap_or_else(|| abs_path.clone())
        });

        let vars = shorten(
            sanitizer.transform(&frame.locals_value()),
            self.string_max_length,
            self.list_max_length,
        );

        let (pre_context, context_line, post_context) = match context {
            Some(SourceContext {
                pre_context,
                context_line,
                post_context,
            }) => (Some(pre_context), Some(context_line), Some(post_context)),
            None => (None, None, None),
        };

        FrameDescriptor {
            abs_path: frame.abs_path.clone(),
            filename,
            module: frame.module.clone(),
            function: frame
                .function
                .clone()
                .unwrap_or_else(|| "<unknown>".to_owned()),
            lineno: line_index.map(|index| index as u32 + 1),
            vars,
            pre_context,
            context_line,
            post_context,
        }
    }

    /// Rewrite an absolute path relative to the install root of the frame's
    /// top-level module, turning `/usr/lib/pythonX/site-packages/pkg/mod.py`
    /// into `pkg/mod.py`. Best effort: `None` on any miss, and the caller
    /// keeps the absolute path.
    fn relative_filename(&self, abs_path: &str, module: Option<&str>) -> Option<String> {
        let resolver = self.resolver.as_deref()?;
        let top_level = module?.split('.').next()?;
        let module_file = resolver.module_file(top_level)?;
        // The install root is two components up from the module's own file.
        let install_root = module_file.ancestors().nth(2)?;
        let relative = Path::new(abs_path).strip_prefix(install_root).ok()?;
        let relative = relative.to_string_lossy();
        if relative.is_empty() {
            None
        } else {
            Some(relative.into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::io::Write;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::traceback::{LocalScope, MapScope, ScopeError, TRACEBACK_HIDE_LOCAL};
    use crate::value::CapturedValue;

    struct MapResolver(HashMap<String, PathBuf>);

    impl ModuleResolver for MapResolver {
        fn module_file(&self, top_level: &str) -> Option<PathBuf> {
            self.0.get(top_level).cloned()
        }
    }

    struct BrokenScope;

    impl LocalScope for BrokenScope {
        fn keys(&self) -> Result<Vec<String>, ScopeError> {
            Err(ScopeError::Unsupported("no keys".to_owned()))
        }

        fn get(&self, _key: &str) -> Option<CapturedValue> {
            None
        }
    }

    fn scope_of(entries: Vec<(&str, CapturedValue)>) -> Rc<dyn LocalScope> {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value))
            .collect();
        Rc::new(MapScope::new(entries))
    }

    fn frame(abs_path: Option<&str>, lineno: Option<u32>) -> CapturedFrame {
        CapturedFrame {
            abs_path: abs_path.map(str::to_owned),
            function: Some("handler".to_owned()),
            module: Some("pkg.mod".to_owned()),
            lineno,
            locals: Some(scope_of(vec![("x", CapturedValue::from(1i64))])),
            loader: None,
        }
    }

    fn extractor() -> FrameExtractor {
        FrameExtractor::new(400, 50)
    }

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(Vec::new())
    }

    #[test]
    fn missing_file_omits_context_fields() {
        let traceback = CapturedTraceback::new(vec![frame(Some("/gone/away.py"), Some(3))]);
        let descriptors = extractor().extract(&traceback, &sanitizer());
        assert_eq!(descriptors.len(), 1);
        let descriptor = &descriptors[0];
        assert!(descriptor.pre_context.is_none());
        assert!(descriptor.context_line.is_none());
        assert!(descriptor.post_context.is_none());

        let encoded = serde_json::to_value(descriptor).expect("encode");
        let keys: Vec<&str> = encoded.as_object().expect("object").keys().map(String::as_str).collect();
        assert!(!keys.contains(&"pre_context"));
        assert!(!keys.contains(&"context_line"));
        assert!(!keys.contains(&"post_context"));
    }

    #[test]
    fn present_file_yields_one_based_lineno_and_context() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"alpha\nbeta\ngamma\n").expect("write");
        let path = file.path().to_string_lossy().into_owned();

        let traceback = CapturedTraceback::new(vec![frame(Some(&path), Some(2))]);
        let descriptors = extractor().extract(&traceback, &sanitizer());
        let descriptor = &descriptors[0];
        assert_eq!(descriptor.lineno, Some(2));
        assert_eq!(descriptor.context_line.as_deref(), Some("beta"));
        assert_eq!(descriptor.pre_context.as_deref(), Some(&["alpha".to_owned()][..]));
        assert_eq!(descriptor.post_context.as_deref(), Some(&["gamma".to_owned()][..]));
    }

    #[test]
    fn hidden_frames_never_appear() {
        let mut hidden = frame(None, None);
        hidden.locals = Some(scope_of(vec![
            (TRACEBACK_HIDE_LOCAL, CapturedValue::from(true)),
        ]));
        let traceback = CapturedTraceback::new(vec![frame(None, None), hidden, frame(None, None)]);
        let descriptors = extractor().extract(&traceback, &sanitizer());
        assert_eq!(descriptors.len(), 2);
    }

    #[test]
    fn vars_are_sanitized_and_bounded() {
        let long = "x".repeat(500);
        let mut untrimmed = frame(None, None);
        untrimmed.locals = Some(scope_of(vec![("text", CapturedValue::from(long))]));
        let traceback = CapturedTraceback::new(vec![untrimmed]);
        let descriptors = extractor().extract(&traceback, &sanitizer());
        let text = descriptors[0].vars["text"].as_str().expect("string var");
        assert_eq!(text.len(), 403);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn broken_scope_yields_placeholder_vars() {
        let mut broken = frame(None, None);
        broken.locals = Some(Rc::new(BrokenScope));
        let traceback = CapturedTraceback::new(vec![broken]);
        let descriptors = extractor().extract(&traceback, &sanitizer());
        assert_eq!(descriptors[0].vars, json!("<invalid local scope>"));
    }

    #[test]
    fn missing_function_defaults_to_unknown() {
        let mut anonymous = frame(None, None);
        anonymous.function = None;
        let traceback = CapturedTraceback::new(vec![anonymous]);
        let descriptors = extractor().extract(&traceback, &sanitizer());
        assert_eq!(descriptors[0].function, "<unknown>");
    }

    #[test]
    fn filename_is_relativized_when_root_is_known() {
        let mut roots = HashMap::new();
        roots.insert(
            "pkg".to_owned(),
            PathBuf::from("/site-packages/pkg/__init__.py"),
        );
        let extractor = extractor().with_resolver(Rc::new(MapResolver(roots)));

        let traceback =
            CapturedTraceback::new(vec![frame(Some("/site-packages/pkg/mod.py"), None)]);
        let descriptors = extractor.extract(&traceback, &sanitizer());
        assert_eq!(descriptors[0].filename.as_deref(), Some("pkg/mod.py"));
        assert_eq!(
            descriptors[0].abs_path.as_deref(),
            Some("/site-packages/pkg/mod.py")
        );
    }

    #[test]
    fn unknown_module_falls_back_to_abs_path() {
        let extractor = extractor().with_resolver(Rc::new(MapResolver(HashMap::new())));
        let traceback = CapturedTraceback::new(vec![frame(Some("/somewhere/else.py"), None)]);
        let descriptors = extractor.extract(&traceback, &sanitizer());
        assert_eq!(descriptors[0].filename.as_deref(), Some("/somewhere/else.py"));
    }

    #[test]
    fn frame_order_is_preserved() {
        let mut first = frame(None, Some(1));
        first.function = Some("outer".to_owned());
        let mut second = frame(None, Some(9));
        second.function = Some("inner".to_owned());
        let traceback = CapturedTraceback::new(vec![first, second]);
        let descriptors = extractor().extract(&traceback, &sanitizer());
        assert_eq!(descriptors[0].function, "outer");
        assert_eq!(descriptors[1].function, "inner");
        assert_eq!(descriptors[0].lineno, Some(1));
        assert_eq!(descriptors[1].lineno, Some(9));
    }

    #[test]
    fn frame_without_locals_has_empty_vars() {
        let mut bare = frame(None, None);
        bare.locals = None;
        let traceback = CapturedTraceback::new(vec![bare]);
        let descriptors = extractor().extract(&traceback, &sanitizer());
        assert_eq!(descriptors[0].vars, json!({}));
    }
}
