use serde_json::Value;

/// Maximum number of elements kept of a list-like structure.
pub const MAX_LENGTH_LIST: usize = 50;

/// Maximum number of characters kept of a string-like structure.
pub const MAX_LENGTH_STRING: usize = 400;

/// Bound an already-sanitized value to the configured limits.
///
/// Strings longer than `string_length` keep their first `string_length`
/// characters followed by `"..."`. Arrays longer than `list_length` keep
/// their first `list_length` elements followed by a `"..."` entry and a
/// `"(N more elements)"` entry. Mappings are never truncated themselves,
/// only their values are bounded; closing that gap would change the stored
/// shape, so it is left as-is.
pub fn shorten(value: Value, string_length: usize, list_length: usize) -> Value {
    match value {
        Value::String(text) => Value::String(shorten_string(text, string_length)),
        Value::Array(items) if items.len() > list_length => {
            let remaining = items.len() - list_length;
            let mut kept: Vec<Value> = items
                .into_iter()
                .take(list_length)
                .map(|item| shorten(item, string_length, list_length))
                .collect();
            kept.push(Value::String("...".to_owned()));
            kept.push(Value::String(format!("({} more elements)", remaining)));
            Value::Array(kept)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| shorten(item, string_length, list_length))
                .collect(),
        ),
        Value::Object(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(key, entry)| (key, shorten(entry, string_length, list_length)))
                .collect(),
        ),
        other => other,
    }
}

fn shorten_string(text: String, string_length: usize) -> String {
    // nth() lands on the first character past the limit, which keeps the
    // cut on a character boundary.
    match text.char_indices().nth(string_length) {
        Some((cut, _)) => {
            let mut shortened = String::with_capacity(cut + 3);
            shortened.push_str(&text[..cut]);
            shortened.push_str("...");
            shortened
        }
        None => text,
    }
}
