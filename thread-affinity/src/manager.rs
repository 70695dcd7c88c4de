//! [`AffinityManager`], the shared entry point for topology queries and thread pinning.

use {
    crate::{
        affinity::{self, AffinityMask, Tid},
        cluster::CoreCluster,
        config::ThreadAffinityConfig,
        error::ThreadAffinityError,
        threads::{self, ThreadEntry, ThreadRegistry},
        topology::{CpuTopology, CpuTopologyCache},
        trace::{ScopedTrace, Tracer},
    },
    log::{debug, info, warn},
    std::{ops::Deref, sync::Arc},
};

/// Outcome of applying a mask to every thread with a given name.
#[derive(Debug, Default)]
pub struct NameAffinityReport {
    pub results: Vec<(Tid, Result<(), ThreadAffinityError>)>,
}

impl NameAffinityReport {
    /// Number of threads whose name matched.
    pub fn matched(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = Tid> + '_ {
        self.results
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(tid, _)| *tid)
    }

    pub fn failed(&self) -> impl Iterator<Item = (Tid, &ThreadAffinityError)> + '_ {
        self.results
            .iter()
            .filter_map(|(tid, result)| result.as_ref().err().map(|err| (*tid, err)))
    }

    /// True when no matching thread failed, including when nothing matched.
    pub fn is_ok(&self) -> bool {
        self.results.iter().all(|(_, result)| result.is_ok())
    }
}

#[derive(Debug)]
pub struct AffinityManagerInner {
    pub config: ThreadAffinityConfig,
    pub topology: CpuTopologyCache,
    pub threads: ThreadRegistry,
    pub tracer: Tracer,
}

/// Entry point for topology queries and affinity changes.
///
/// Owns the lazily populated topology cache and thread registry. Cheap to
/// clone; clones share the same state.
#[derive(Debug, Clone)]
pub struct AffinityManager {
    inner: Arc<AffinityManagerInner>,
}

impl Deref for AffinityManager {
    type Target = AffinityManagerInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Default for AffinityManager {
    fn default() -> Self {
        Self::new(ThreadAffinityConfig::default())
    }
}

impl AffinityManager {
    pub fn new(config: ThreadAffinityConfig) -> Self {
        let tracer = if config.enable_tracing {
            Tracer::detect()
        } else {
            Tracer::Unavailable
        };
        Self::with_tracer(config, tracer)
    }

    pub fn with_tracer(config: ThreadAffinityConfig, tracer: Tracer) -> Self {
        Self {
            inner: Arc::new(AffinityManagerInner {
                topology: CpuTopologyCache::new(config.clone()),
                threads: ThreadRegistry::new(&config),
                config,
                tracer,
            }),
        }
    }

    pub fn cores_count(&self) -> usize {
        self.topology.core_count()
    }

    pub fn cpu_topology(&self) -> Arc<CpuTopology> {
        self.topology.topology()
    }

    pub fn cpu_hardware(&self) -> String {
        self.topology.hardware()
    }

    /// Re-enumerates the process's threads.
    pub fn thread_entries(&self) -> Vec<ThreadEntry> {
        let _trace = self.tracer.scoped("enumerate_threads");
        self.threads.enumerate()
    }

    /// Re-enumerates the process's threads as `"<tid> <name>\n"` lines.
    pub fn enumerate_threads(&self) -> String {
        threads::format_thread_listing(&self.thread_entries())
    }

    pub fn set_thread_affinity_mask(
        &self,
        tid: Tid,
        mask: AffinityMask,
    ) -> Result<(), ThreadAffinityError> {
        affinity::set_thread_affinity_mask(tid, mask)
    }

    pub fn set_current_thread_affinity_mask(
        &self,
        mask: AffinityMask,
    ) -> Result<(), ThreadAffinityError> {
        affinity::set_current_thread_affinity_mask(mask)
    }

    /// Applies `mask` to every thread named exactly `name`.
    ///
    /// Threads are looked up in the registry snapshot, which is only taken if
    /// it is empty; threads started since then are not seen until
    /// [`AffinityManager::enumerate_threads`] runs. No match is not an error.
    pub fn set_thread_affinity_mask_by_name(
        &self,
        name: &str,
        mask: AffinityMask,
    ) -> NameAffinityReport {
        let tids = self.threads.find_by_name(name);
        if tids.is_empty() {
            debug!("no thread named {name:?}");
        } else if mask.is_empty() {
            warn!("empty affinity mask for threads named {name:?}, leaving them unchanged");
        }

        let results = tids
            .into_iter()
            .map(|tid| {
                info!("Found thread {name}:{tid}");
                (tid, affinity::set_thread_affinity_mask(tid, mask))
            })
            .collect();
        NameAffinityReport { results }
    }

    pub fn cluster_mask(&self, cluster: CoreCluster) -> AffinityMask {
        cluster.mask(&self.cpu_topology())
    }

    /// Pins every thread named `name` to the cores of `cluster`.
    pub fn set_thread_affinity_by_name_to_cluster(
        &self,
        name: &str,
        cluster: CoreCluster,
    ) -> NameAffinityReport {
        let mask = self.cluster_mask(cluster);
        if mask.is_empty() {
            debug!("no cores discovered, not pinning {name:?}");
            return NameAffinityReport::default();
        }
        self.set_thread_affinity_mask_by_name(name, mask)
    }

    pub fn begin_section(&self, name: &str) -> bool {
        self.tracer.begin_section(name)
    }

    pub fn end_section(&self) {
        self.tracer.end_section()
    }

    pub fn scoped_trace(&self, name: &str) -> ScopedTrace<'_> {
        self.tracer.scoped(name)
    }
}
