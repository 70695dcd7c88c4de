//! Filesystem roots and switches for topology discovery, loadable from TOML.

use {
    crate::error::ThreadAffinityError,
    serde::{Deserialize, Serialize},
    std::path::{Path, PathBuf},
};

/// Where topology and thread information is read from.
///
/// Missing fields take their defaults, so an empty file is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThreadAffinityConfig {
    /// Mount point of procfs, used for `cpuinfo` and `self/task`.
    pub proc_root: PathBuf,
    /// Mount point of sysfs, used for per-core cpufreq and topology attributes.
    pub sys_root: PathBuf,
    /// When false the platform tracing backend is never resolved.
    pub enable_tracing: bool,
}

impl Default for ThreadAffinityConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            enable_tracing: true,
        }
    }
}

impl ThreadAffinityConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ThreadAffinityError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        toml::from_str::<Self>(&contents).map_err(|e| {
            ThreadAffinityError::Config(format!(
                "invalid TOML in config file {}: {e}",
                path.display()
            ))
        })
    }

    pub fn cpuinfo_path(&self) -> PathBuf {
        self.proc_root.join("cpuinfo")
    }

    pub fn task_dir(&self) -> PathBuf {
        self.proc_root.join("self").join("task")
    }

    pub fn cpu_dir(&self, cpu: usize) -> PathBuf {
        self.sys_root
            .join("devices/system/cpu")
            .join(format!("cpu{cpu}"))
    }

    pub fn max_freq_path(&self, cpu: usize) -> PathBuf {
        self.cpu_dir(cpu).join("cpufreq/cpuinfo_max_freq")
    }

    pub fn package_id_path(&self, cpu: usize) -> PathBuf {
        self.cpu_dir(cpu).join("topology/physical_package_id")
    }
}
