#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use gather_core::Gvk;
use gather_search::ResourceIndex;

fn write(root: &Path, rel: &str, body: &str) {
    let p = root.join(rel);
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    fs::write(p, body).unwrap();
}

fn pod_yaml(ns: &str, name: &str) -> String {
    format!("apiVersion: v1\nkind: Pod\nmetadata:\n  name: {name}\n  namespace: {ns}\n  labels:\n    app: {ns}\n")
}

#[test]
fn cross_namespace_list_is_union_of_namespaces() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "namespaces/alpha/core/pods/a1.yaml", &pod_yaml("alpha", "a1"));
    write(root, "namespaces/alpha/core/pods/a2.yaml", &pod_yaml("alpha", "a2"));
    write(root, "namespaces/beta/core/pods/b1.yaml", &pod_yaml("beta", "b1"));
    write(root, "namespaces/gamma/core/configmaps.yaml", "apiVersion: v1\nkind: ConfigMapList\nitems: []\n");
    // a cluster-scoped object of the same kind is included in the cross-namespace view
    write(root, "cluster-scoped-resources/core/pods/odd.yaml", "apiVersion: v1\nkind: Pod\nmetadata:\n  name: odd\n");

    let loaded = gather_store::load(root).unwrap();
    let idx = ResourceIndex::build(loaded.records, loaded.namespaces);
    let pod = Gvk::new("", "v1", "Pod");

    let mut all: Vec<String> = idx.list(&pod, "").into_iter().map(|r| r.key()).collect();
    all.sort();
    let mut union: Vec<String> = Vec::new();
    for ns in idx.list_namespaces() {
        union.extend(idx.list(&pod, &ns).into_iter().map(|r| r.key()));
    }
    union.push("odd".to_string());
    union.sort();
    assert_eq!(all, union);
    assert_eq!(all, vec!["alpha/a1", "alpha/a2", "beta/b1", "odd"]);

    assert_eq!(idx.list_namespaces(), vec!["alpha", "beta", "gamma"]);
    assert!(idx.list(&pod, "gamma").is_empty());
    assert_eq!(idx.find_by_label("app=alpha").len(), 2);
}

#[test]
fn later_file_wins_for_duplicate_identity() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    // walk order is file-name order, so b-second.yaml is loaded after a-first.yaml
    write(
        root,
        "namespaces/ns/core/a-first.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n  namespace: ns\ndata:\n  v: first\n",
    );
    write(
        root,
        "namespaces/ns/core/b-second.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n  namespace: ns\ndata:\n  v: second\n",
    );
    let loaded = gather_store::load(root).unwrap();
    assert_eq!(loaded.records.len(), 2);
    let idx = ResourceIndex::build(loaded.records, loaded.namespaces);
    let cm = idx.get(&Gvk::new("", "v1", "ConfigMap"), "ns", "cfg").unwrap();
    assert_eq!(cm.body["data"]["v"], serde_json::json!("second"));
    assert_eq!(idx.count(), 1);
}
