//! Dotted-path lookup over JSON values.

use serde_json::Value;

/// Resolve a dotted path (`a.b.c`) against a JSON value. A non-mapping
/// intermediate is a miss, not an error.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
