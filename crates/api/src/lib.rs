//! Gather public API façade (in-process).
//!
//! [`Provider`] owns one loaded archive and its resource index and is the only entry point
//! downstream handlers use. [`GatherApi`] is the async seam a protocol layer binds to.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use gather_core::{ArchiveMetadata, GatherError, GatherResult, Gvk, Record};
use gather_search::ResourceIndex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod etcd;
pub mod selector;

pub use etcd::{EtcdEndpoint, EtcdHealth};
pub use selector::FieldSelector;

/// Filters applied by [`Provider::list_resources`]. Empty strings count as absent; a zero
/// limit means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: usize,
}

impl ListOptions {
    pub fn labels(mut self, selector: impl Into<String>) -> Self { self.label_selector = Some(selector.into()); self }
    pub fn fields(mut self, selector: impl Into<String>) -> Self { self.field_selector = Some(selector.into()); self }
    pub fn limit(mut self, limit: usize) -> Self { self.limit = limit; self }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

/// List response shaped like a Kubernetes `<Kind>List`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceList {
    pub api_version: String,
    pub kind: String,
    pub items: Vec<Record>,
}

/// One load generation: the index and the metadata it was built with.
struct Loaded {
    index: ResourceIndex,
    metadata: ArchiveMetadata,
}

impl Loaded {
    fn from_path(path: &Path) -> GatherResult<Self> {
        let t0 = Instant::now();
        let result = gather_store::load(path)?;
        let index = ResourceIndex::build(result.records, result.namespaces);
        info!(records = index.count(), took_ms = %t0.elapsed().as_millis(), "index ready");
        Ok(Self { index, metadata: result.metadata })
    }
}

/// Query façade over one archive.
///
/// The current generation sits behind an [`ArcSwap`]: queries read it lock-free and
/// [`Provider::reload`] replaces it wholesale.
pub struct Provider {
    path: PathBuf,
    current: ArcSwap<Loaded>,
}

impl Provider {
    /// Load the archive at `path` and build its index. Fails only if the archive root
    /// cannot be listed.
    pub fn open(path: impl Into<PathBuf>) -> GatherResult<Self> {
        let path = path.into();
        info!(path = %path.display(), "provider: opening archive");
        let loaded = Loaded::from_path(&path)?;
        Ok(Self { path, current: ArcSwap::from_pointee(loaded) })
    }

    /// Build a fresh generation from the same path and swap it in. On failure the
    /// previous generation stays in place.
    pub fn reload(&self) -> GatherResult<()> {
        let loaded = Loaded::from_path(&self.path)?;
        self.current.store(Arc::new(loaded));
        metrics::counter!("provider_reloads_total", 1u64);
        info!(path = %self.path.display(), "provider: archive reloaded");
        Ok(())
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn metadata(&self) -> ArchiveMetadata { self.current.load().metadata.clone() }

    pub fn get_resource(&self, gvk: &Gvk, namespace: &str, name: &str) -> GatherResult<Record> {
        let res = self.current.load().index.get(gvk, namespace, name);
        debug!(gvk = %gvk, ns = %namespace, name = %name, found = res.is_ok(), "provider: get");
        res
    }

    /// Label selector (post-filtered to `gvk`/`namespace`) or plain listing, then the
    /// field selector, then the limit.
    pub fn list_resources(&self, gvk: &Gvk, namespace: &str, opts: &ListOptions) -> GatherResult<ResourceList> {
        let t0 = Instant::now();
        let fields = non_empty(&opts.field_selector).map(FieldSelector::parse).transpose()?;
        let current = self.current.load();
        let mut items = match non_empty(&opts.label_selector) {
            Some(sel) => current
                .index
                .find_by_label(sel)
                .into_iter()
                .filter(|r| &r.gvk == gvk && (namespace.is_empty() || r.namespace_str() == namespace))
                .collect(),
            None => current.index.list(gvk, namespace),
        };
        if let Some(fs) = fields.as_ref() {
            items.retain(|r| fs.matches(r));
        }
        if opts.limit > 0 && items.len() > opts.limit {
            items.truncate(opts.limit);
        }
        debug!(gvk = %gvk, ns = %namespace, items = items.len(), took_ms = %t0.elapsed().as_millis(), "provider: list");
        Ok(ResourceList { api_version: gvk.api_version(), kind: format!("{}List", gvk.kind), items })
    }

    pub fn list_namespaces(&self) -> Vec<String> { self.current.load().index.list_namespaces() }

    pub fn list_kinds(&self) -> Vec<Gvk> { self.current.load().index.list_kinds() }

    pub fn count(&self) -> usize { self.current.load().index.count() }

    pub fn etcd_health(&self) -> GatherResult<EtcdHealth> {
        etcd::read_health(&gather_store::resolve_root(&self.path))
    }

    pub fn etcd_object_count(&self) -> GatherResult<BTreeMap<String, i64>> {
        etcd::read_object_count(&gather_store::resolve_root(&self.path))
    }
}

/// Async surface for protocol layers and handlers.
#[async_trait::async_trait]
pub trait GatherApi: Send + Sync {
    async fn metadata(&self) -> ArchiveMetadata;

    async fn get_resource(&self, gvk: &Gvk, namespace: &str, name: &str) -> GatherResult<Record>;

    async fn list_resources(&self, gvk: &Gvk, namespace: &str, opts: ListOptions) -> GatherResult<ResourceList>;

    async fn list_namespaces(&self) -> GatherResult<Vec<String>>;

    async fn list_kinds(&self) -> GatherResult<Vec<Gvk>>;

    /// Distinct indexed identities.
    async fn count(&self) -> GatherResult<usize>;

    async fn etcd_health(&self) -> GatherResult<EtcdHealth>;

    async fn etcd_object_count(&self) -> GatherResult<BTreeMap<String, i64>>;
}

/// In-process implementation backed by a shared [`Provider`].
#[derive(Clone)]
pub struct InProcApi {
    provider: Arc<Provider>,
}

impl InProcApi {
    pub fn new(provider: Arc<Provider>) -> Self { Self { provider } }

    /// Load on a blocking thread so the runtime stays responsive on large archives.
    pub async fn open(path: impl Into<PathBuf>) -> GatherResult<Self> {
        let path = path.into();
        let provider = join_task(tokio::task::spawn_blocking(move || Provider::open(path)), "archive load").await?;
        Ok(Self::new(Arc::new(provider)))
    }

    pub fn provider(&self) -> &Arc<Provider> { &self.provider }
}

#[async_trait::async_trait]
impl GatherApi for InProcApi {
    async fn metadata(&self) -> ArchiveMetadata { self.provider.metadata() }

    async fn get_resource(&self, gvk: &Gvk, namespace: &str, name: &str) -> GatherResult<Record> {
        self.provider.get_resource(gvk, namespace, name)
    }

    async fn list_resources(&self, gvk: &Gvk, namespace: &str, opts: ListOptions) -> GatherResult<ResourceList> {
        self.provider.list_resources(gvk, namespace, &opts)
    }

    async fn list_namespaces(&self) -> GatherResult<Vec<String>> { Ok(self.provider.list_namespaces()) }

    async fn list_kinds(&self) -> GatherResult<Vec<Gvk>> { Ok(self.provider.list_kinds()) }

    async fn count(&self) -> GatherResult<usize> { Ok(self.provider.count()) }

    async fn etcd_health(&self) -> GatherResult<EtcdHealth> {
        let p = Arc::clone(&self.provider);
        join_task(tokio::task::spawn_blocking(move || p.etcd_health()), "etcd health read").await
    }

    async fn etcd_object_count(&self) -> GatherResult<BTreeMap<String, i64>> {
        let p = Arc::clone(&self.provider);
        join_task(tokio::task::spawn_blocking(move || p.etcd_object_count()), "etcd object count read").await
    }
}

/// Await a spawned task. A panic inside the task is resumed on the caller; cancellation
/// becomes [`GatherError::Interrupted`].
async fn join_task<T>(handle: JoinHandle<GatherResult<T>>, what: &str) -> GatherResult<T> {
    match handle.await {
        Ok(res) => res,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            warn!(task = what, error = %e, "background task cancelled");
            Err(GatherError::Interrupted(format!("{} cancelled", what)))
        }
    }
}
