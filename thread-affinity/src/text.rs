//! Small helpers for picking apart line-oriented procfs text.

/// Returns true if `line` begins with `prefix`.
pub fn starts_with(line: &str, prefix: &str) -> bool {
    line.starts_with(prefix)
}

/// Removes the first occurrence of `needle` from `s`, if present.
pub fn erase_substr(s: &mut String, needle: &str) {
    if needle.is_empty() {
        return;
    }
    if let Some(pos) = s.find(needle) {
        s.replace_range(pos..pos.saturating_add(needle.len()), "");
    }
}

/// Splits `s` on every occurrence of `delim`.
///
/// A string without the delimiter yields a single field, so callers must
/// check the field count instead of indexing blindly.
pub fn split(s: &str, delim: char) -> Vec<&str> {
    s.split(delim).collect()
}

/// Returns the `index`-th `delim`-separated field of `s`, if it exists.
pub fn field(s: &str, delim: char, index: usize) -> Option<&str> {
    s.split(delim).nth(index)
}
