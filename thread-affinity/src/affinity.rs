//! Per-thread CPU affinity via `sched_setaffinity(2)`.

use {
    crate::error::ThreadAffinityError,
    std::{fmt, ops::BitOr},
};
#[cfg(any(target_os = "linux", target_os = "android"))]
use {
    log::{debug, error},
    std::io,
};

/// Kernel thread id, as found under `/proc/self/task`.
pub type Tid = i32;

/// Number of cores addressable by an [`AffinityMask`].
pub const MAX_MASK_CORES: usize = u64::BITS as usize;

/// Bit-per-core mask: bit `i` set means the thread may run on core `i`.
///
/// The mask is not checked against the discovered topology; bits for cores
/// that do not exist are passed to the kernel unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AffinityMask(u64);

impl AffinityMask {
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Builds a mask from core ids. Ids at or above [`MAX_MASK_CORES`] are ignored.
    pub fn from_cores(cores: impl IntoIterator<Item = usize>) -> Self {
        Self(
            cores
                .into_iter()
                .filter(|&core| core < MAX_MASK_CORES)
                .fold(0, |bits, core| bits | (1u64 << core)),
        )
    }

    /// Mask covering cores `0..count`.
    pub fn all(count: usize) -> Self {
        if count >= MAX_MASK_CORES {
            Self(u64::MAX)
        } else {
            Self((1u64 << count) - 1)
        }
    }

    pub fn contains(&self, core: usize) -> bool {
        core < MAX_MASK_CORES && self.0 & (1u64 << core) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Core ids with their bit set, ascending.
    pub fn cores(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_MASK_CORES).filter(move |&core| self.contains(core))
    }
}

impl From<u64> for AffinityMask {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl BitOr for AffinityMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for AffinityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn to_cpu_set(mask: AffinityMask) -> libc::cpu_set_t {
    // safety: cpu_set_t is a POD type, zero-initialization is standard
    let mut cpu_set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    for cpu in mask.cores() {
        // safety: cpu < MAX_MASK_CORES, well below CPU_SETSIZE
        unsafe {
            libc::CPU_SET(cpu, &mut cpu_set);
        }
    }
    cpu_set
}

/// Kernel thread id of the calling thread.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn current_thread_id() -> Result<Tid, ThreadAffinityError> {
    // safety: gettid takes no arguments and cannot fail
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    Ok(tid as Tid)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn current_thread_id() -> Result<Tid, ThreadAffinityError> {
    Err(ThreadAffinityError::NotSupported)
}

/// Restricts thread `tid` to the cores in `mask`.
///
/// Failures are logged with the raw errno and returned; the caller's thread
/// is never aborted. Concurrent calls for the same `tid` race in the kernel
/// and the last one wins.
///
/// # Errors
///
/// Returns [`ThreadAffinityError::EmptyMask`] if no bit is set.
/// Returns [`ThreadAffinityError::SetAffinity`] if the system call fails
/// (e.g. the thread exited or permission is denied).
/// Returns [`ThreadAffinityError::NotSupported`] on other platforms.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn set_thread_affinity_mask(tid: Tid, mask: AffinityMask) -> Result<(), ThreadAffinityError> {
    if mask.is_empty() {
        return Err(ThreadAffinityError::EmptyMask);
    }

    debug!("set affinity mask for tid: {tid} {mask}");
    let cpu_set = to_cpu_set(mask);
    // safety: cpu_set is a fully initialized cpu_set_t of the size passed
    let result = unsafe {
        libc::sched_setaffinity(tid, std::mem::size_of::<libc::cpu_set_t>(), &cpu_set)
    };

    if result != 0 {
        let source = io::Error::last_os_error();
        error!(
            "error in the syscall setaffinity: tid={tid} mask={mask} err={}",
            source.raw_os_error().unwrap_or_default()
        );
        return Err(ThreadAffinityError::SetAffinity {
            tid,
            mask: mask.bits(),
            source,
        });
    }

    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn set_thread_affinity_mask(
    _tid: Tid,
    _mask: AffinityMask,
) -> Result<(), ThreadAffinityError> {
    Err(ThreadAffinityError::NotSupported)
}

/// Applies `mask` to the calling thread.
pub fn set_current_thread_affinity_mask(mask: AffinityMask) -> Result<(), ThreadAffinityError> {
    set_thread_affinity_mask(current_thread_id()?, mask)
}

/// Reads the affinity of thread `tid`, truncated to the first
/// [`MAX_MASK_CORES`] cores.
///
/// # Errors
///
/// Returns [`ThreadAffinityError::GetAffinity`] if the system call fails.
/// Returns [`ThreadAffinityError::NotSupported`] on other platforms.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn thread_affinity_mask(tid: Tid) -> Result<AffinityMask, ThreadAffinityError> {
    // safety: cpu_set_t is a POD type, zero-initialization is standard
    let mut cpu_set: libc::cpu_set_t = unsafe { std::mem::zeroed() };

    // safety: cpu_set is a valid, writable cpu_set_t of the size passed
    let result = unsafe {
        libc::sched_getaffinity(tid, std::mem::size_of::<libc::cpu_set_t>(), &mut cpu_set)
    };

    if result != 0 {
        return Err(ThreadAffinityError::GetAffinity {
            tid,
            source: io::Error::last_os_error(),
        });
    }

    // safety: CPU_ISSET is safe with a valid cpu_set_t and cpu < CPU_SETSIZE
    let cores = (0..MAX_MASK_CORES).filter(|&cpu| unsafe { libc::CPU_ISSET(cpu, &cpu_set) });
    Ok(AffinityMask::from_cores(cores))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn thread_affinity_mask(_tid: Tid) -> Result<AffinityMask, ThreadAffinityError> {
    Err(ThreadAffinityError::NotSupported)
}

/// Reads the affinity of the calling thread.
pub fn current_thread_affinity_mask() -> Result<AffinityMask, ThreadAffinityError> {
    thread_affinity_mask(current_thread_id()?)
}
