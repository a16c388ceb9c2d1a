//! Etcd side-channel snapshots read straight from `<root>/etcd_info/`. Not indexed.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use gather_core::{GatherError, GatherResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const ETCD_INFO_DIR: &str = "etcd_info";
const HEALTH_FILE: &str = "endpoint_health.json";
const ALARM_FILE: &str = "alarm_list.json";
const OBJECT_COUNT_FILE: &str = "object_count.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EtcdEndpoint {
    pub address: String,
    /// `healthy` or `unhealthy`
    pub health: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EtcdHealth {
    pub healthy: bool,
    pub endpoints: Vec<EtcdEndpoint>,
    pub alarms: Vec<String>,
}

fn snapshot_err(path: &Path, reason: impl ToString) -> GatherError {
    GatherError::Snapshot { path: path.to_path_buf(), reason: reason.to_string() }
}

fn read_json(path: &Path) -> GatherResult<Value> {
    let data = fs::read(path).map_err(|e| snapshot_err(path, e))?;
    serde_json::from_slice(&data).map_err(|e| snapshot_err(path, e))
}

// bool, "true"/"healthy", or an object carrying one of those under `health`
fn health_flag(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true" || s == "healthy",
        Value::Object(map) => match map.get("health") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true" || s == "healthy",
            _ => false,
        },
        _ => false,
    }
}

fn endpoint(v: &Value) -> EtcdEndpoint {
    let address = v.get("endpoint").and_then(|e| e.as_str()).unwrap_or("").to_string();
    let healthy = v.get("health").map(health_flag).unwrap_or(false);
    EtcdEndpoint { address, health: if healthy { "healthy" } else { "unhealthy" }.to_string() }
}

/// Endpoint health plus any recorded alarms. The alarm list is optional.
pub fn read_health(root: &Path) -> GatherResult<EtcdHealth> {
    let dir = root.join(ETCD_INFO_DIR);
    let health_path = dir.join(HEALTH_FILE);
    let endpoints: Vec<EtcdEndpoint> = match read_json(&health_path)? {
        Value::Array(items) => items.iter().map(endpoint).collect(),
        obj @ Value::Object(_) => vec![endpoint(&obj)],
        other => return Err(snapshot_err(&health_path, format!("unexpected health data format: {}", other))),
    };
    let healthy = endpoints.iter().all(|e| e.health == "healthy");

    let mut alarms = Vec::new();
    match read_json(&dir.join(ALARM_FILE)) {
        Ok(Value::Array(items)) => {
            alarms.extend(items.iter().filter_map(|a| a.get("alarm").and_then(|v| v.as_str())).map(|s| s.to_string()));
        }
        Ok(_) => debug!("alarm list is not an array; ignoring"),
        Err(e) => debug!(error = %e, "no alarm list"),
    }
    Ok(EtcdHealth { healthy, endpoints, alarms })
}

/// Object counts per resource. Values are numeric strings; unparsable ones count as zero.
pub fn read_object_count(root: &Path) -> GatherResult<BTreeMap<String, i64>> {
    let path = root.join(ETCD_INFO_DIR).join(OBJECT_COUNT_FILE);
    let raw: BTreeMap<String, String> =
        serde_json::from_value(read_json(&path)?).map_err(|e| snapshot_err(&path, e))?;
    Ok(raw.into_iter().map(|(k, v)| (k, leading_int(&v))).collect())
}

// Leading optional sign and digits, the rest ignored.
fn leading_int(s: &str) -> i64 {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn etcd_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let etcd = dir.path().join(ETCD_INFO_DIR);
        fs::create_dir_all(&etcd).unwrap();
        for (name, body) in files { fs::write(etcd.join(name), body).unwrap(); }
        dir
    }

    #[test]
    fn health_array_with_mixed_forms() {
        let dir = etcd_dir(&[
            (HEALTH_FILE, r#"[{"endpoint":"https://10.0.0.1:2379","health":true},
                              {"endpoint":"https://10.0.0.2:2379","health":"healthy"},
                              {"endpoint":"https://10.0.0.3:2379","health":{"health":"false"}}]"#),
            (ALARM_FILE, r#"[{"alarm":"NOSPACE","memberID":1}]"#),
        ]);
        let h = read_health(dir.path()).unwrap();
        assert!(!h.healthy);
        assert_eq!(h.endpoints.len(), 3);
        assert_eq!(h.endpoints[0].health, "healthy");
        assert_eq!(h.endpoints[1].health, "healthy");
        assert_eq!(h.endpoints[2], EtcdEndpoint { address: "https://10.0.0.3:2379".into(), health: "unhealthy".into() });
        assert_eq!(h.alarms, vec!["NOSPACE"]);
    }

    #[test]
    fn health_single_object_nested() {
        let dir = etcd_dir(&[(HEALTH_FILE, r#"{"endpoint":"https://10.0.0.1:2379","health":{"health":true}}"#)]);
        let h = read_health(dir.path()).unwrap();
        assert!(h.healthy);
        assert_eq!(h.endpoints.len(), 1);
        assert!(h.alarms.is_empty());
    }

    #[test]
    fn health_missing_or_garbage_is_snapshot_error() {
        let empty = etcd_dir(&[]);
        assert!(matches!(read_health(empty.path()), Err(GatherError::Snapshot { .. })));
        let bad = etcd_dir(&[(HEALTH_FILE, "\"just a string\"")]);
        assert!(matches!(read_health(bad.path()), Err(GatherError::Snapshot { .. })));
        let broken = etcd_dir(&[(HEALTH_FILE, "{not json")]);
        assert!(matches!(read_health(broken.path()), Err(GatherError::Snapshot { .. })));
    }

    #[test]
    fn object_counts_parse_numeric_strings() {
        let dir = etcd_dir(&[(OBJECT_COUNT_FILE, r#"{"pods":"120","secrets":"42 objects","events":"n/a"}"#)]);
        let counts = read_object_count(dir.path()).unwrap();
        assert_eq!(counts["pods"], 120);
        assert_eq!(counts["secrets"], 42);
        assert_eq!(counts["events"], 0);
        assert!(matches!(read_object_count(etcd_dir(&[]).path()), Err(GatherError::Snapshot { .. })));
    }

    #[test]
    fn leading_int_edges() {
        assert_eq!(leading_int("-5"), -5);
        assert_eq!(leading_int(""), 0);
        assert_eq!(leading_int("+"), 0);
    }
}
