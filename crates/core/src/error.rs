//! Error taxonomy shared by loader, index and façade.

use std::path::PathBuf;

use crate::Gvk;

/// Conditions surfaced to callers. Per-file load problems never appear here; the loader
/// logs and skips them.
#[derive(Debug, thiserror::Error)]
pub enum GatherError {
    #[error("archive unreadable at {}: {source}", .path.display())]
    ArchiveUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not_found: {gvk} {}", display_ref(.namespace, .name))]
    NotFound { gvk: Gvk, namespace: String, name: String },
    #[error("invalid field selector: {0} (expect path.to.field=value)")]
    InvalidFieldSelector(String),
    #[error("invalid gvk: {0}")]
    InvalidGvk(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("snapshot {}: {reason}", .path.display())]
    Snapshot { path: PathBuf, reason: String },
    /// A background task was cancelled before producing a result, e.g. on runtime shutdown.
    #[error("interrupted: {0}")]
    Interrupted(String),
}

impl GatherError {
    pub fn not_found(gvk: &Gvk, namespace: &str, name: &str) -> Self {
        Self::NotFound { gvk: gvk.clone(), namespace: namespace.to_string(), name: name.to_string() }
    }

    pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound { .. }) }
}

fn display_ref(namespace: &str, name: &str) -> String {
    if namespace.is_empty() { name.to_string() } else { format!("{}/{}", namespace, name) }
}

pub type GatherResult<T> = Result<T, GatherError>;
