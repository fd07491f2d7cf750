use std::fs;
use std::sync::LazyLock;

use encoding_rs::Encoding;
use regex::Regex;

use crate::traceback::SourceLoader;

/// Number of source lines captured on each side of the target line.
pub const CONTEXT_LINES: usize = 5;

/// Charset declaration scanned for on the first two lines of a source file,
/// e.g. `# -*- coding: utf-8 -*-`.
static CODING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"coding[:=]\s*([-\w.]+)").expect("invalid coding regex"));

/// Source lines around one target line of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    pub pre_context: Vec<String>,
    pub context_line: String,
    pub post_context: Vec<String>,
}

/// Fetch up to `context_lines` lines around `lineno` (0-based) of a source
/// file.
///
/// The module loader's source access is tried first, then a direct file
/// read. `None` means the source could not be located or the target line is
/// out of range (the file may have changed since the frame was captured);
/// callers omit context in that case rather than defaulting it.
pub fn get_lines_from_file(
    abs_path: &str,
    lineno: usize,
    context_lines: usize,
    loader: Option<&dyn SourceLoader>,
    module: Option<&str>,
) -> Option<SourceContext> {
    let source = load_source(abs_path, loader, module)?;
    let lines: Vec<&str> = source.lines().map(|line| line.trim_end_matches('\r')).collect();

    if lineno >= lines.len() {
        return None;
    }

    let lower = lineno.saturating_sub(context_lines);
    let upper = (lineno + 1 + context_lines).min(lines.len());

    Some(SourceContext {
        pre_context: lines[lower..lineno].iter().map(|line| (*line).to_owned()).collect(),
        context_line: lines[lineno].to_owned(),
        post_context: lines[lineno + 1..upper]
            .iter()
            .map(|line| (*line).to_owned())
            .collect(),
    })
}

fn load_source(
    abs_path: &str,
    loader: Option<&dyn SourceLoader>,
    module: Option<&str>,
) -> Option<String> {
    if let (Some(loader), Some(module)) = (loader, module) {
        if let Some(source) = loader.get_source(module) {
            return Some(source);
        }
    }
    let bytes = fs::read(abs_path).ok()?;
    Some(decode_source(&bytes))
}

/// Decode raw source bytes honoring a declared charset, defaulting to ASCII.
/// Undecodable bytes are replaced, never fatal.
fn decode_source(bytes: &[u8]) -> String {
    let label = declared_encoding(bytes).unwrap_or_else(|| "ascii".to_owned());
    let encoding = Encoding::for_label(label.as_bytes()).unwrap_or(encoding_rs::WINDOWS_1252);
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}

fn declared_encoding(bytes: &[u8]) -> Option<String> {
    for line in bytes.split(|byte| *byte == b'\n').take(2) {
        let line = String::from_utf8_lossy(line);
        if let Some(captures) = CODING_RE.captures(&line) {
            return Some(captures[1].to_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    struct FixedLoader(String);

    impl SourceLoader for FixedLoader {
        fn get_source(&self, _module: &str) -> Option<String> {
            Some(self.0.clone())
        }
    }

    struct EmptyLoader;

    impl SourceLoader for EmptyLoader {
        fn get_source(&self, _module: &str) -> Option<String> {
            None
        }
    }

    fn temp_source(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp source");
        file.write_all(content).expect("write temp source");
        file
    }

    #[test]
    fn context_window_around_target_line() {
        let file = temp_source(b"l0\nl1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\n");
        let path = file.path().to_string_lossy().into_owned();
        let context = get_lines_from_file(&path, 4, 2, None, None).expect("context");
        assert_eq!(context.pre_context, vec!["l2", "l3"]);
        assert_eq!(context.context_line, "l4");
        assert_eq!(context.post_context, vec!["l5", "l6"]);
    }

    #[test]
    fn window_is_clamped_at_file_edges() {
        let file = temp_source(b"first\nsecond\n");
        let path = file.path().to_string_lossy().into_owned();
        let context = get_lines_from_file(&path, 0, 5, None, None).expect("context");
        assert!(context.pre_context.is_empty());
        assert_eq!(context.context_line, "first");
        assert_eq!(context.post_context, vec!["second"]);
    }

    #[test]
    fn missing_file_yields_none() {
        assert!(get_lines_from_file("/no/such/file.py", 0, 5, None, None).is_none());
    }

    #[test]
    fn out_of_range_line_yields_none() {
        let file = temp_source(b"only\n");
        let path = file.path().to_string_lossy().into_owned();
        assert!(get_lines_from_file(&path, 40, 5, None, None).is_none());
    }

    #[test]
    fn loader_source_wins_over_file() {
        let file = temp_source(b"from disk\n");
        let path = file.path().to_string_lossy().into_owned();
        let loader = FixedLoader("from loader\n".to_owned());
        let context =
            get_lines_from_file(&path, 0, 5, Some(&loader), Some("pkg.mod")).expect("context");
        assert_eq!(context.context_line, "from loader");
    }

    #[test]
    fn loader_miss_falls_back_to_file() {
        let file = temp_source(b"from disk\n");
        let path = file.path().to_string_lossy().into_owned();
        let context =
            get_lines_from_file(&path, 0, 5, Some(&EmptyLoader), Some("pkg.mod")).expect("context");
        assert_eq!(context.context_line, "from disk");
    }

    #[test]
    fn declared_charset_is_honored() {
        // "caf\xe9" is latin-1 for "café".
        let file = temp_source(b"# -*- coding: latin-1 -*-\ncaf\xe9\n");
        let path = file.path().to_string_lossy().into_owned();
        let context = get_lines_from_file(&path, 1, 5, None, None).expect("context");
        assert_eq!(context.context_line, "caf\u{e9}");
    }

    #[test]
    fn crlf_line_endings_are_stripped() {
        let file = temp_source(b"one\r\ntwo\r\n");
        let path = file.path().to_string_lossy().into_owned();
        let context = get_lines_from_file(&path, 1, 5, None, None).expect("context");
        assert_eq!(context.pre_context, vec!["one"]);
        assert_eq!(context.context_line, "two");
    }
}
