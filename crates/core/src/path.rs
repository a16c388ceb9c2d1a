//! Tolerant navigation over decoded documents. Only mappings are walked: a missing key,
//! a sequence or a scalar in the middle of the path yields `None`.

use serde_json::Value;

/// Split `status.phase` into `["status", "phase"]`.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

/// Walk `segments` from `root` through nested mappings. Numeric segments are plain keys;
/// they never index into sequences.
pub fn nested<'a, S: AsRef<str>>(root: &'a Value, segments: &[S]) -> Option<&'a Value> {
    let mut cur = root;
    for seg in segments {
        cur = cur.as_object()?.get(seg.as_ref())?;
    }
    Some(cur)
}

/// Like [`nested`], but only string leaves count. Numbers and bools are not coerced.
pub fn nested_str<'a, S: AsRef<str>>(root: &'a Value, segments: &[S]) -> Option<&'a str> {
    nested(root, segments).and_then(|v| v.as_str())
}
