//! Gather search: in-RAM resource index over loaded records.
//!
//! Three views share the same `Arc<Record>` values:
//! - identity: `Gvk -> key -> record`, key is `name` or `namespace/name`
//! - namespace: `namespace -> Gvk -> name -> record`
//! - label: `"key=value" -> "namespace/name" -> record`, flat across kinds
//!
//! The index is immutable once built. Every accessor hands out owned clones, so callers can
//! mutate results freely and concurrent readers need no locking.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use gather_core::{GatherError, GatherResult, Gvk, Record};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

type Bucket = FxHashMap<String, Arc<Record>>;

#[derive(Debug, Default)]
pub struct ResourceIndex {
    by_gvk: FxHashMap<Gvk, Bucket>,
    by_namespace: FxHashMap<String, FxHashMap<Gvk, Bucket>>,
    by_label: FxHashMap<String, Bucket>,
    namespaces: Vec<String>,
}

fn label_key(k: &str, v: &str) -> String { format!("{}={}", k, v) }

fn label_member(r: &Record) -> String { format!("{}/{}", r.namespace_str(), r.name) }

impl ResourceIndex {
    /// Build all views in one pass. `namespaces` is kept verbatim as the roster, including
    /// namespaces that contributed no records.
    pub fn build(records: Vec<Record>, namespaces: Vec<String>) -> Self {
        let started = Instant::now();
        let mut idx = Self { namespaces, ..Self::default() };
        for r in records {
            idx.insert(Arc::new(r));
        }
        metrics::gauge!("index_records", idx.count() as f64);
        metrics::gauge!("index_kinds", idx.by_gvk.len() as f64);
        metrics::gauge!("index_label_keys", idx.by_label.len() as f64);
        debug!(
            records = idx.count(),
            kinds = idx.by_gvk.len(),
            label_keys = idx.by_label.len(),
            took_ms = %started.elapsed().as_millis(),
            "resource index built"
        );
        idx
    }

    /// Last insert wins for a repeated identity, in every view.
    fn insert(&mut self, r: Arc<Record>) {
        let replaced = self.by_gvk.entry(r.gvk.clone()).or_default().insert(r.key(), Arc::clone(&r));
        if let Some(old) = replaced {
            trace!(gvk = %old.gvk, key = %old.key(), "duplicate identity; keeping later record");
            self.drop_label_postings(&old);
        }
        if let Some(ns) = r.namespace.as_deref() {
            self.by_namespace
                .entry(ns.to_string())
                .or_default()
                .entry(r.gvk.clone())
                .or_default()
                .insert(r.name.clone(), Arc::clone(&r));
        }
        let member = label_member(&r);
        for (k, v) in r.labels.iter() {
            self.by_label.entry(label_key(k, v)).or_default().insert(member.clone(), Arc::clone(&r));
        }
    }

    // Postings still pointing at a replaced record would otherwise outlive it.
    fn drop_label_postings(&mut self, old: &Arc<Record>) {
        let member = label_member(old);
        for (k, v) in old.labels.iter() {
            let key = label_key(k, v);
            let Some(bucket) = self.by_label.get_mut(&key) else { continue };
            if bucket.get(&member).map(|cur| Arc::ptr_eq(cur, old)).unwrap_or(false) {
                bucket.remove(&member);
            }
            if bucket.is_empty() {
                self.by_label.remove(&key);
            }
        }
    }

    /// Exact lookup. An empty `namespace` addresses a cluster-scoped record.
    pub fn get(&self, gvk: &Gvk, namespace: &str, name: &str) -> GatherResult<Record> {
        let bucket = self.by_gvk.get(gvk).ok_or_else(|| GatherError::not_found(gvk, namespace, name))?;
        let key = if namespace.is_empty() { name.to_string() } else { format!("{}/{}", namespace, name) };
        bucket
            .get(&key)
            .map(|r| Record::clone(r))
            .ok_or_else(|| GatherError::not_found(gvk, namespace, name))
    }

    /// All records of `gvk` in `namespace`, or across every namespace and cluster scope when
    /// `namespace` is empty. Unknown combinations yield an empty list.
    pub fn list(&self, gvk: &Gvk, namespace: &str) -> Vec<Record> {
        let bucket = if namespace.is_empty() {
            self.by_gvk.get(gvk)
        } else {
            self.by_namespace.get(namespace).and_then(|kinds| kinds.get(gvk))
        };
        bucket.map(|b| b.values().map(|r| Record::clone(r)).collect()).unwrap_or_default()
    }

    /// Records matching every `key=value` term of a comma-separated selector.
    /// No operators beyond equality; an empty selector or any unknown term yields nothing.
    pub fn find_by_label(&self, selector: &str) -> Vec<Record> {
        if selector.trim().is_empty() {
            return Vec::new();
        }
        let mut terms = selector.split(',').map(str::trim);
        let Some(first) = terms.next().and_then(|t| self.by_label.get(t)) else { return Vec::new() };
        let mut candidates: FxHashMap<&str, &Arc<Record>> = first.iter().map(|(k, r)| (k.as_str(), r)).collect();
        for term in terms {
            let Some(bucket) = self.by_label.get(term) else { return Vec::new() };
            candidates.retain(|k, _| bucket.contains_key(*k));
            if candidates.is_empty() {
                break;
            }
        }
        candidates.into_values().map(|r| Record::clone(r)).collect()
    }

    /// Indexed kinds, sorted.
    pub fn list_kinds(&self) -> Vec<Gvk> {
        let mut kinds: Vec<Gvk> = self.by_gvk.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Namespace roster captured at load time.
    pub fn list_namespaces(&self) -> Vec<String> { self.namespaces.clone() }

    /// Distinct identities across all kinds.
    pub fn count(&self) -> usize { self.by_gvk.values().map(|b| b.len()).sum() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(ns: &str, name: &str, labels: &[(&str, &str)]) -> Record {
        let mut lbls = serde_json::Map::new();
        for (k, v) in labels { lbls.insert((*k).to_string(), json!(v)); }
        Record::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": name, "namespace": ns, "labels": lbls },
            "status": { "phase": "Running" }
        }))
        .unwrap()
    }

    fn node(name: &str, labels: &[(&str, &str)]) -> Record {
        let mut lbls = serde_json::Map::new();
        for (k, v) in labels { lbls.insert((*k).to_string(), json!(v)); }
        Record::from_value(json!({"apiVersion": "v1", "kind": "Node", "metadata": { "name": name, "labels": lbls }})).unwrap()
    }

    fn pod_gvk() -> Gvk { Gvk::new("", "v1", "Pod") }

    fn names(mut rs: Vec<Record>) -> Vec<String> {
        rs.sort_by(|a, b| a.key().cmp(&b.key()));
        rs.into_iter().map(|r| r.key()).collect()
    }

    fn scenario() -> ResourceIndex {
        ResourceIndex::build(
            vec![
                pod("default", "a", &[("app", "foo"), ("tier", "web")]),
                pod("default", "b", &[("app", "foo")]),
                pod("other", "c", &[("app", "bar")]),
                node("master-0", &[("role", "master")]),
            ],
            vec!["default".into(), "other".into(), "empty".into()],
        )
    }

    #[test]
    fn scenario_counts() {
        let idx = scenario();
        assert_eq!(idx.list(&pod_gvk(), "").len(), 3);
        assert_eq!(idx.list(&pod_gvk(), "default").len(), 2);
        let foo = idx.find_by_label("app=foo");
        assert_eq!(foo.len(), 2);
        assert!(foo.iter().all(|r| r.namespace.as_deref() == Some("default")));
        assert_eq!(idx.count(), 4);
        assert_eq!(idx.list_namespaces(), vec!["default", "other", "empty"]);
        assert_eq!(idx.list_kinds(), vec![Gvk::new("", "v1", "Node"), pod_gvk()]);
    }

    #[test]
    fn get_namespaced_and_cluster_scoped() {
        let idx = scenario();
        let r = idx.get(&pod_gvk(), "default", "a").unwrap();
        assert_eq!(r.name, "a");
        let n = idx.get(&Gvk::new("", "v1", "Node"), "", "master-0").unwrap();
        assert_eq!(n.name, "master-0");
    }

    #[test]
    fn get_misses_are_not_found() {
        let idx = scenario();
        let unknown_kind = idx.get(&Gvk::new("apps", "v1", "Deployment"), "default", "a").unwrap_err();
        assert!(unknown_kind.is_not_found());
        let unknown_key = idx.get(&pod_gvk(), "default", "zzz").unwrap_err();
        match unknown_key {
            GatherError::NotFound { gvk, namespace, name } => {
                assert_eq!(gvk, pod_gvk());
                assert_eq!(namespace, "default");
                assert_eq!(name, "zzz");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // namespaced record is not reachable by bare name
        assert!(idx.get(&pod_gvk(), "", "a").unwrap_err().is_not_found());
    }

    #[test]
    fn list_is_total() {
        let idx = scenario();
        assert!(idx.list(&Gvk::new("apps", "v1", "Deployment"), "").is_empty());
        assert!(idx.list(&pod_gvk(), "empty").is_empty());
        assert!(idx.list(&pod_gvk(), "no-such-ns").is_empty());
        // cluster-scoped kinds have no namespace view
        assert!(idx.list(&Gvk::new("", "v1", "Node"), "default").is_empty());
    }

    #[test]
    fn returned_records_are_isolated() {
        let idx = scenario();
        let mut r = idx.get(&pod_gvk(), "default", "a").unwrap();
        r.body["status"]["phase"] = json!("Failed");
        r.name.push_str("-mutated");
        let again = idx.get(&pod_gvk(), "default", "a").unwrap();
        assert_eq!(again.body["status"]["phase"], json!("Running"));
        assert_eq!(again.name, "a");

        let mut listed = idx.list(&pod_gvk(), "default");
        for r in listed.iter_mut() { r.body = json!(null); }
        assert!(idx.list(&pod_gvk(), "default").iter().all(|r| r.body.is_object()));
    }

    #[test]
    fn label_selector_is_and_only() {
        let idx = scenario();
        assert_eq!(names(idx.find_by_label("app=foo,tier=web")), vec!["default/a"]);
        assert_eq!(names(idx.find_by_label(" app=foo , tier=web ")), vec!["default/a"]);
        assert!(idx.find_by_label("app=foo,tier=db").is_empty());
        assert!(idx.find_by_label("nope=1,app=foo").is_empty());
        assert!(idx.find_by_label("").is_empty());
        assert!(idx.find_by_label("app=foo,").is_empty());
        assert!(idx.find_by_label("app!=foo").is_empty());
        assert_eq!(names(idx.find_by_label("role=master")), vec!["master-0"]);
    }

    #[test]
    fn label_intersection_matches_pairwise_sets() {
        let idx = scenario();
        let both = names(idx.find_by_label("app=foo,tier=web"));
        let a = names(idx.find_by_label("app=foo"));
        let b = names(idx.find_by_label("tier=web"));
        let expected: Vec<String> = a.into_iter().filter(|k| b.contains(k)).collect();
        assert_eq!(both, expected);
    }

    #[test]
    fn duplicate_identity_last_wins() {
        let first = pod("default", "dup", &[("gen", "1")]);
        let mut second = pod("default", "dup", &[("gen", "2")]);
        second.body["status"]["phase"] = json!("Succeeded");
        let idx = ResourceIndex::build(vec![first, second], vec!["default".into()]);
        assert_eq!(idx.count(), 1);
        let r = idx.get(&pod_gvk(), "default", "dup").unwrap();
        assert_eq!(r.body["status"]["phase"], json!("Succeeded"));
        assert_eq!(idx.list(&pod_gvk(), "default").len(), 1);
        assert_eq!(idx.find_by_label("gen=2").len(), 1);
        assert!(idx.find_by_label("gen=1").is_empty(), "stale label postings must not survive");
    }
}
