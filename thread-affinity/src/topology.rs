//! CPU topology discovery from `/proc/cpuinfo` and per-core sysfs attributes.

use {
    crate::{config::ThreadAffinityConfig, sysfs, text},
    log::{debug, info, warn},
    std::{
        collections::BTreeMap,
        fs::File,
        io::{BufRead, BufReader},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex, MutexGuard,
        },
    },
};

/// A logical CPU as seen at discovery time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuCore {
    /// Position of the core's `processor` line in `/proc/cpuinfo`.
    pub id: usize,
    /// Maximum frequency in kHz, 0 if unknown.
    pub frequency: u64,
    /// Physical package (cluster) id, 0 if unknown.
    pub package_id: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuTopology {
    /// Cores in discovery order.
    pub cores: Vec<CpuCore>,
    /// Value of the `Hardware` line in `/proc/cpuinfo`, empty if absent.
    pub hardware: String,
}

impl CpuTopology {
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    /// Maps each physical package id to the ids of its cores.
    pub fn packages(&self) -> BTreeMap<u32, Vec<usize>> {
        let mut packages: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for core in &self.cores {
            packages.entry(core.package_id).or_default().push(core.id);
        }
        packages
    }

    pub fn max_frequency(&self) -> Option<u64> {
        self.cores.iter().map(|core| core.frequency).max()
    }

    pub fn min_frequency(&self) -> Option<u64> {
        self.cores.iter().map(|core| core.frequency).min()
    }

    /// Parses the contents of a cpuinfo file, reading per-core attributes
    /// from the sysfs tree configured in `config`.
    ///
    /// Lines are decoded lossily, so bytes that are not UTF-8 never end the
    /// scan early. Only a read error stops it.
    pub fn parse(reader: impl BufRead, config: &ThreadAffinityConfig) -> Self {
        let mut topology = CpuTopology::default();

        for line in reader.split(b'\n') {
            let line = match line {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("stopped reading cpuinfo early: {err}");
                    break;
                }
            };
            let line = String::from_utf8_lossy(&line);

            if text::starts_with(&line, "processor") {
                let id = topology.cores.len();
                topology.cores.push(CpuCore {
                    id,
                    frequency: sysfs::read_numeric_attribute(config.max_freq_path(id)),
                    package_id: sysfs::read_numeric_attribute(config.package_id_path(id)),
                });
            } else if text::starts_with(&line, "Hardware") {
                match text::field(&line, ':', 1) {
                    Some(hardware) => topology.hardware = hardware.trim().to_string(),
                    None => debug!("ignoring Hardware line without delimiter: {line:?}"),
                }
            }
        }

        topology
    }

    /// Reads the topology from the configured procfs and sysfs roots.
    ///
    /// Returns `None` when cpuinfo cannot be opened.
    pub fn read(config: &ThreadAffinityConfig) -> Option<Self> {
        let path = config.cpuinfo_path();
        match File::open(&path) {
            Ok(file) => Some(Self::parse(BufReader::new(file), config)),
            Err(err) => {
                warn!("unable to open {}: {err}", path.display());
                None
            }
        }
    }
}

/// Lazily populated, shareable view of the CPU topology.
///
/// The first caller to find the cache empty scans the filesystem while holding
/// the lock, so concurrent callers wait and then see the finished topology. An
/// empty scan result is not cached and the next query scans again.
#[derive(Debug)]
pub struct CpuTopologyCache {
    config: ThreadAffinityConfig,
    topology: Mutex<Option<Arc<CpuTopology>>>,
    population_count: AtomicUsize,
}

impl CpuTopologyCache {
    pub fn new(config: ThreadAffinityConfig) -> Self {
        Self {
            config,
            topology: Mutex::new(None),
            population_count: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<CpuTopology>>> {
        self.topology.lock().unwrap_or_else(|poisoned| {
            warn!("topology cache lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn topology(&self) -> Arc<CpuTopology> {
        let mut cached = self.lock();
        if let Some(topology) = cached.as_ref() {
            return Arc::clone(topology);
        }

        let scans = self
            .population_count
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1);
        debug!("populating cpu topology (scan #{scans})");
        let topology = Arc::new(CpuTopology::read(&self.config).unwrap_or_default());
        info!("CPU cores = {}", topology.cores.len());
        info!("CPU hardware = {}", topology.hardware);

        if !topology.is_empty() {
            *cached = Some(Arc::clone(&topology));
        }
        topology
    }

    pub fn core_count(&self) -> usize {
        self.topology().cores.len()
    }

    pub fn hardware(&self) -> String {
        self.topology().hardware.clone()
    }

    /// Number of filesystem scans performed so far.
    pub fn population_count(&self) -> usize {
        self.population_count.load(Ordering::Relaxed)
    }

    /// True once a non-empty topology has been cached.
    pub fn is_populated(&self) -> bool {
        self.lock().is_some()
    }
}
