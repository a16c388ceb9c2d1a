//! Gather core types: record identity, records, archive metadata and errors.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod error;
pub mod path;

pub use error::{GatherError, GatherResult};

/// Composite identity of a record kind: `(group, version, kind)`.
/// The core API group is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), kind: kind.into() }
    }

    /// Split an `apiVersion` (`"apps/v1"` or `"v1"`) and pair it with `kind`.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Parses `v1/Kind` or `group/v1/Kind`.
impl FromStr for Gvk {
    type Err = GatherError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = key.split('/').collect();
        let gvk = match parts.as_slice() {
            [version, kind] => Gvk::new("", *version, *kind),
            [group, version, kind] => Gvk::new(*group, *version, *kind),
            _ => return Err(GatherError::InvalidGvk(format!("{} (expect v1/Kind or group/v1/Kind)", key))),
        };
        if gvk.version.is_empty() || gvk.kind.is_empty() {
            return Err(GatherError::InvalidGvk(format!("{} (empty version or kind)", key)));
        }
        Ok(gvk)
    }
}

pub type Labels = SmallVec<[(String, String); 8]>;

/// One ingested object. Identity fields are extracted once at construction; the full
/// decoded document stays in `body`.
///
/// `Clone` copies `body` recursively, so a cloned record shares nothing with its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub gvk: Gvk,
    /// `None` for cluster-scoped records.
    pub namespace: Option<String>,
    pub name: String,
    /// String-valued entries of `metadata.labels`.
    pub labels: Labels,
    pub body: serde_json::Value,
}

impl Record {
    /// Build a record from a decoded document. Missing identity fields become empty strings;
    /// only a non-object document is rejected.
    pub fn from_value(body: serde_json::Value) -> GatherResult<Self> {
        if !body.is_object() {
            return Err(GatherError::InvalidRecord(format!("expected a mapping at document root, found {}", type_name(&body))));
        }
        let api_version = body.get("apiVersion").and_then(|v| v.as_str()).unwrap_or("");
        let kind = body.get("kind").and_then(|v| v.as_str()).unwrap_or("");
        let gvk = Gvk::from_api_version(api_version, kind);
        let meta = body.get("metadata");
        let name = meta.and_then(|m| m.get("name")).and_then(|v| v.as_str()).unwrap_or("").to_string();
        let namespace = meta
            .and_then(|m| m.get("namespace"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let mut labels = Labels::new();
        if let Some(lbls) = meta.and_then(|m| m.get("labels")).and_then(|v| v.as_object()) {
            for (k, v) in lbls.iter() {
                if let Some(val) = v.as_str() { labels.push((k.clone(), val.to_string())); }
            }
        }
        Ok(Self { gvk, namespace, name, labels, body })
    }

    pub fn is_namespaced(&self) -> bool { self.namespace.is_some() }

    pub fn namespace_str(&self) -> &str { self.namespace.as_deref().unwrap_or("") }

    /// Identity-index key: bare name for cluster-scoped records, `namespace/name` otherwise.
    pub fn key(&self) -> String {
        match self.namespace.as_deref() {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

fn type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "sequence",
        serde_json::Value::Object(_) => "mapping",
    }
}

/// Coarse facts about a loaded archive. Fields the archive does not provide stay empty.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ArchiveMetadata {
    pub path: String,
    pub version: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub resource_count: usize,
    pub namespace_count: usize,
}

pub mod prelude {
    pub use super::{ArchiveMetadata, GatherError, GatherResult, Gvk, Labels, Record};
}
