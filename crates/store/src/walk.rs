//! Per-subtree ingestion. Every failure below a subtree root is logged and skipped.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use gather_core::Record;
use serde::Deserialize;
use serde_json::Value;

use crate::value::LossyValue;
use tracing::{trace, warn};
use walkdir::WalkDir;

const LIST_SUFFIX: &str = "List";

/// `.yaml` / `.yml`, case-insensitive.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

/// Decode the first YAML document of `text` into a generic value.
/// Returns `Ok(None)` for empty documents (no content, `null`, or an empty mapping).
/// A root that is not a mapping is an error. Values JSON cannot represent are converted
/// lossily rather than rejected.
pub fn decode_document(text: &str) -> Result<Option<Value>> {
    let Some(doc) = serde_yaml::Deserializer::from_str(text).next() else { return Ok(None) };
    let LossyValue(value) = LossyValue::deserialize(doc).context("decoding yaml")?;
    match &value {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Object(_) => Ok(Some(value)),
        _ => bail!("document root is not a mapping"),
    }
}

fn read_document(path: &Path) -> Result<Option<Value>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    decode_document(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Visit every yaml file below `dir` in file-name order.
fn for_each_yaml(dir: &Path, mut f: impl FnMut(&Path)) {
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable path");
                continue;
            }
        };
        if entry.file_type().is_dir() || !is_yaml_file(entry.path()) {
            continue;
        }
        metrics::counter!("loader_files_total", 1u64);
        f(entry.path());
    }
}

fn skipped(path: &Path, e: &anyhow::Error) {
    let msg = format!("{:#}", e);
    metrics::counter!("loader_files_skipped_total", 1u64);
    warn!(file = %path.display(), error = %msg, "failed to load resource file; skipping");
}

/// `cluster-scoped-resources`: exactly one record per file.
pub(crate) fn load_cluster_scoped(dir: &Path, out: &mut Vec<Record>) {
    for_each_yaml(dir, |path| match read_document(path) {
        Ok(Some(doc)) => match Record::from_value(doc) {
            Ok(r) => out.push(r),
            Err(e) => skipped(path, &e.into()),
        },
        Ok(None) => trace!(file = %path.display(), "empty document"),
        Err(e) => skipped(path, &e),
    });
}

/// One `namespaces/<ns>` directory: single records or `*List` documents expanded by item.
pub(crate) fn load_namespace(dir: &Path, out: &mut Vec<Record>) {
    for_each_yaml(dir, |path| match read_document(path) {
        Ok(Some(doc)) => expand(path, doc, out),
        Ok(None) => trace!(file = %path.display(), "empty document"),
        Err(e) => skipped(path, &e),
    });
}

fn expand(path: &Path, doc: Value, out: &mut Vec<Record>) {
    let is_list = doc.get("kind").and_then(|k| k.as_str()).map(|k| k.ends_with(LIST_SUFFIX)).unwrap_or(false);
    if !is_list {
        match Record::from_value(doc) {
            Ok(r) => out.push(r),
            Err(e) => skipped(path, &e.into()),
        }
        return;
    }
    let Value::Object(mut map) = doc else { return };
    let Some(Value::Array(items)) = map.remove("items") else {
        trace!(file = %path.display(), "list without items");
        return;
    };
    for item in items {
        if !item.is_object() {
            trace!(file = %path.display(), "skipping non-object list item");
            continue;
        }
        // objects always yield a record
        if let Ok(r) = Record::from_value(item) {
            out.push(r);
        }
    }
}
