//! Gather store: loads a must-gather archive from disk into a flat record collection.
//!
//! Layout consumed (read-only):
//! - optional wrapping directory named after the gathering image (`quay…` or `…sha256…`)
//! - `version`, `timestamp` plain-text metadata
//! - `cluster-scoped-resources/**/*.{yaml,yml}`, one record per file
//! - `namespaces/<ns>/**/*.{yaml,yml}`, one record or a `*List` per file
//!
//! Only an unlistable archive root fails the load. Everything below it is skip-and-warn.

#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use gather_core::{ArchiveMetadata, GatherError, GatherResult, Record};
use tracing::{debug, info, warn};

mod value;
mod walk;

pub use walk::{decode_document, is_yaml_file};

pub const CLUSTER_SCOPED_DIR: &str = "cluster-scoped-resources";
pub const NAMESPACES_DIR: &str = "namespaces";
pub const VERSION_FILE: &str = "version";
pub const TIMESTAMP_FILE: &str = "timestamp";

/// Records, namespace roster and metadata produced by one load.
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    pub records: Vec<Record>,
    /// Every first-level directory under `namespaces/`, with or without records.
    pub namespaces: Vec<String>,
    pub metadata: ArchiveMetadata,
}

/// Walk the archive at `path`.
///
/// Load order is deterministic: cluster-scoped files first, then namespaces by name, each
/// subtree in file-name order. With duplicate identities the later record wins downstream.
pub fn load(path: impl AsRef<Path>) -> GatherResult<LoadResult> {
    let started = Instant::now();
    let path = path.as_ref();
    let top = list_dirs(path).map_err(|source| GatherError::ArchiveUnreadable { path: path.to_path_buf(), source })?;
    let root = pick_root(path, &top);
    info!(path = %path.display(), root = %root.display(), "loading archive");

    let mut metadata = read_metadata(&root);
    metadata.path = path.display().to_string();

    let mut records = Vec::new();
    let cluster_dir = root.join(CLUSTER_SCOPED_DIR);
    if cluster_dir.is_dir() {
        let before = records.len();
        walk::load_cluster_scoped(&cluster_dir, &mut records);
        debug!(count = records.len() - before, "cluster-scoped records loaded");
    } else {
        warn!(dir = %cluster_dir.display(), "no cluster-scoped resources in archive");
    }

    let mut namespaces = Vec::new();
    let ns_dir = root.join(NAMESPACES_DIR);
    if ns_dir.is_dir() {
        match list_dirs(&ns_dir) {
            Ok(dirs) => {
                for ns in dirs {
                    let before = records.len();
                    walk::load_namespace(&ns_dir.join(&ns), &mut records);
                    debug!(namespace = %ns, count = records.len() - before, "namespace records loaded");
                    namespaces.push(ns);
                }
            }
            Err(e) => warn!(dir = %ns_dir.display(), error = %e, "cannot list namespaces directory"),
        }
    } else {
        warn!(dir = %ns_dir.display(), "no namespaced resources in archive");
    }

    metadata.resource_count = records.len();
    metadata.namespace_count = namespaces.len();
    let took_ms = started.elapsed().as_secs_f64() * 1000.0;
    metrics::counter!("loader_records_total", records.len() as u64);
    metrics::histogram!("loader_load_ms", took_ms);
    info!(
        resources = metadata.resource_count,
        namespaces = metadata.namespace_count,
        version = %metadata.version,
        took_ms = %started.elapsed().as_millis(),
        "archive loaded"
    );
    Ok(LoadResult { records, namespaces, metadata })
}

/// Effective data root for `path`: a child directory named after the gathering image when
/// present, else `path` itself. Never fails.
pub fn resolve_root(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match list_dirs(path) {
        Ok(dirs) => pick_root(path, &dirs),
        Err(_) => path.to_path_buf(),
    }
}

fn pick_root(path: &Path, dirs: &[String]) -> PathBuf {
    dirs.iter()
        .find(|name| is_image_dir(name))
        .map(|name| path.join(name))
        .unwrap_or_else(|| path.to_path_buf())
}

fn is_image_dir(name: &str) -> bool {
    name.starts_with("quay") || name.contains("sha256")
}

/// Names of the direct child directories of `dir`, sorted.
fn list_dirs(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    out.sort_unstable();
    Ok(out)
}

/// Best-effort read of `version` and `timestamp`; missing or malformed input leaves fields empty.
pub fn read_metadata(root: &Path) -> ArchiveMetadata {
    let mut meta = ArchiveMetadata::default();
    match fs::read_to_string(root.join(VERSION_FILE)) {
        Ok(s) => meta.version = s.trim().to_string(),
        Err(e) => debug!(error = %e, "no version file"),
    }
    match fs::read_to_string(root.join(TIMESTAMP_FILE)) {
        Ok(s) => {
            let (start, end) = parse_timestamps(&s);
            meta.start_time = start;
            meta.end_time = end;
        }
        Err(e) => debug!(error = %e, "no timestamp file"),
    }
    meta
}

/// Parse `started <RFC-3339>` / `ended <RFC-3339>` lines. Unparsable lines are ignored.
pub fn parse_timestamps(text: &str) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let mut start = None;
    let mut end = None;
    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("started ") {
            if let Some(t) = parse_rfc3339(rest) { start = Some(t); }
        } else if let Some(rest) = line.strip_prefix("ended ") {
            if let Some(t) = parse_rfc3339(rest) { end = Some(t); }
        }
    }
    (start, end)
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim()).ok().map(|dt| dt.with_timezone(&Utc))
}
