//! Snapshot of this process's threads, read from `/proc/self/task`.

use {
    crate::{affinity::Tid, config::ThreadAffinityConfig, sysfs, text},
    log::{debug, warn},
    std::{
        collections::BTreeMap,
        fmt, fs,
        path::{Path, PathBuf},
        sync::{Mutex, MutexGuard},
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadEntry {
    pub tid: Tid,
    /// The kernel's `comm` for the thread; not unique.
    pub name: String,
}

impl fmt::Display for ThreadEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tid, self.name)
    }
}

/// Extracts the command name from a `/proc/<pid>/task/<tid>/stat` line.
///
/// The line looks like `<tid> (<comm>) <state> ...`. The name runs from the
/// first `(` to the last `)`, so names that themselves contain parentheses
/// are kept whole.
pub fn parse_stat_comm(line: &str) -> Option<&str> {
    let start = line.find('(')?.saturating_add(1);
    let end = line.rfind(')')?;
    line.get(start..end)
}

/// Parses a listing of `"<tid> <name>"` lines back into a map.
///
/// Names may contain spaces. Lines without a name or with a non-numeric tid
/// are skipped.
pub fn parse_thread_listing(listing: &str) -> BTreeMap<Tid, String> {
    listing
        .lines()
        .filter_map(|line| {
            let (tid, name) = line.split_once(' ')?;
            Some((tid.parse().ok()?, name.to_string()))
        })
        .collect()
}

/// Renders entries as the `"<tid> <name>\n"` listing.
pub fn format_thread_listing(entries: &[ThreadEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{entry}\n"))
        .collect()
}

fn read_thread_entry(task_dir: &Path, file_name: &str) -> Option<ThreadEntry> {
    let tid = match file_name.parse::<Tid>() {
        Ok(tid) => tid,
        Err(_) => {
            debug!("skipping non-thread task entry {file_name:?}");
            return None;
        }
    };

    // The thread may have exited since the directory was listed.
    let stat = sysfs::read_attribute(task_dir.join(file_name).join("stat"))?;
    match parse_stat_comm(&stat) {
        Some(name) => Some(ThreadEntry {
            tid,
            name: name.to_string(),
        }),
        None => {
            debug!("malformed stat line for tid {tid}: {stat:?}");
            None
        }
    }
}

/// Reads every thread listed under `task_dir`, ordered by tid.
fn scan_task_dir(task_dir: &Path) -> BTreeMap<Tid, String> {
    let mut threads = BTreeMap::new();
    let entries = match fs::read_dir(task_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("unable to list {}: {err}", task_dir.display());
            return threads;
        }
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if text::starts_with(file_name, ".") {
            continue;
        }
        if let Some(thread) = read_thread_entry(task_dir, file_name) {
            threads.insert(thread.tid, thread.name);
        }
    }
    threads
}

/// Point-in-time mapping of thread id to thread name.
///
/// The snapshot goes stale as threads come and go. [`ThreadRegistry::enumerate`]
/// always rescans; the other accessors scan only while the snapshot is empty.
#[derive(Debug)]
pub struct ThreadRegistry {
    task_dir: PathBuf,
    threads: Mutex<BTreeMap<Tid, String>>,
}

impl ThreadRegistry {
    pub fn new(config: &ThreadAffinityConfig) -> Self {
        Self {
            task_dir: config.task_dir(),
            threads: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Tid, String>> {
        self.threads.lock().unwrap_or_else(|poisoned| {
            warn!("thread registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn entries(threads: &BTreeMap<Tid, String>) -> Vec<ThreadEntry> {
        threads
            .iter()
            .map(|(&tid, name)| ThreadEntry {
                tid,
                name: name.clone(),
            })
            .collect()
    }

    /// Rebuilds the snapshot from scratch and returns it.
    pub fn enumerate(&self) -> Vec<ThreadEntry> {
        let mut threads = self.lock();
        *threads = scan_task_dir(&self.task_dir);
        debug!("enumerated {} threads", threads.len());
        Self::entries(&threads)
    }

    /// Returns the cached snapshot, enumerating first if it is empty.
    pub fn snapshot_or_enumerate(&self) -> Vec<ThreadEntry> {
        let mut threads = self.lock();
        if threads.is_empty() {
            *threads = scan_task_dir(&self.task_dir);
        }
        Self::entries(&threads)
    }

    /// Thread ids whose name equals `name` exactly, from the cached snapshot
    /// (enumerating first if it is empty).
    pub fn find_by_name(&self, name: &str) -> Vec<Tid> {
        let mut threads = self.lock();
        if threads.is_empty() {
            *threads = scan_task_dir(&self.task_dir);
        }
        threads
            .iter()
            .filter(|(_, thread_name)| thread_name.as_str() == name)
            .map(|(&tid, _)| tid)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
