#![cfg_attr(
    not(feature = "agave-unstable-api"),
    deprecated(
        since = "3.1.0",
        note = "This crate has been marked for formal inclusion in the Agave Unstable API. From \
                v4.0.0 onward, the `agave-unstable-api` crate feature must be specified to \
                acknowledge use of an interface that may break without warning."
    )
)]
// Activate some of the Rust 2024 lints to make the future migration easier.
#![warn(if_let_rescope)]
#![warn(keyword_idents_2024)]
#![warn(missing_unsafe_on_extern)]
#![warn(rust_2024_guarded_string_incompatible_syntax)]
#![warn(rust_2024_incompatible_pat)]
#![warn(tail_expr_drop_order)]
#![warn(unsafe_attr_outside_unsafe)]
#![warn(unsafe_op_in_unsafe_fn)]

//! CPU topology discovery and per-thread affinity control for Linux and Android.
//!
//! The crate answers three questions at runtime: how many cores the machine has
//! and how fast each one can run, which package (cluster) each core belongs to,
//! and which threads exist in this process. Threads can then be pinned to cores
//! by thread id or by name using a bit-per-core [`AffinityMask`].
//!
//! Topology and the thread list are read lazily from procfs and sysfs by an
//! [`AffinityManager`], which callers construct once and share.
//!
//! # Platform Support
//!
//! Linux and Android. Syscall wrappers return [`ThreadAffinityError::NotSupported`]
//! on other platforms; procfs-backed queries simply find nothing.
//!
//! # Examples
//!
//! ```no_run
//! use agave_thread_affinity::*;
//!
//! # fn main() -> Result<(), ThreadAffinityError> {
//! let manager = AffinityManager::default();
//! println!("{} cores on {}", manager.cores_count(), manager.cpu_hardware());
//!
//! // Pin the calling thread to the first four cores
//! manager.set_current_thread_affinity_mask(AffinityMask::from_bits(0x0f))?;
//!
//! // Pin every thread named "Worker Thread" to the big cores
//! let report = manager.set_thread_affinity_by_name_to_cluster("Worker Thread", CoreCluster::Big);
//! for (tid, err) in report.failed() {
//!     eprintln!("tid {tid}: {err}");
//! }
//! # Ok(())
//! # }
//! ```

mod affinity;
mod cluster;
mod config;
mod error;
mod manager;
pub mod sysfs;
pub mod text;
mod threads;
mod topology;
mod trace;

pub use {
    affinity::{
        current_thread_affinity_mask, current_thread_id, set_current_thread_affinity_mask,
        set_thread_affinity_mask, thread_affinity_mask, AffinityMask, Tid, MAX_MASK_CORES,
    },
    cluster::CoreCluster,
    config::ThreadAffinityConfig,
    error::ThreadAffinityError,
    manager::{AffinityManager, AffinityManagerInner, NameAffinityReport},
    threads::{
        format_thread_listing, parse_stat_comm, parse_thread_listing, ThreadEntry, ThreadRegistry,
    },
    topology::{CpuCore, CpuTopology, CpuTopologyCache},
    trace::{LogTraceBackend, ScopedTrace, TraceBackend, Tracer},
};
