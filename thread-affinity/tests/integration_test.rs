//! Integration tests for agave-thread-affinity
//!
//! These tests read the real procfs/sysfs of the test process and change the
//! affinity of its own threads. Permission errors are tolerated so the suite
//! can run in restricted containers.

use agave_thread_affinity::*;
#[cfg(any(target_os = "linux", target_os = "android"))]
use std::{
    sync::{mpsc, Arc, Barrier},
    thread,
};

#[cfg(any(target_os = "linux", target_os = "android"))]
fn is_permission_error(err: &ThreadAffinityError) -> bool {
    err.raw_os_error() == Some(libc::EPERM)
}

/// Spawns a thread with the given name that stays alive until the returned
/// sender is dropped, and returns its tid.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn spawn_named_thread(name: &str) -> (Tid, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let (tid_sender, tid_receiver) = mpsc::channel();
    let (stop_sender, stop_receiver) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            tid_sender.send(current_thread_id().unwrap()).unwrap();
            // returns once the sender is dropped
            let _ = stop_receiver.recv();
        })
        .unwrap();
    (tid_receiver.recv().unwrap(), stop_sender, handle)
}

#[test]
#[cfg(any(target_os = "linux", target_os = "android"))]
fn test_real_topology() {
    solana_logger::setup();
    let manager = AffinityManager::default();
    let count = manager.cores_count();
    assert!(count > 0, "/proc/cpuinfo should list at least one processor");

    let topology = manager.cpu_topology();
    let ids: Vec<_> = topology.cores.iter().map(|core| core.id).collect();
    assert_eq!(ids, (0..count).collect::<Vec<_>>());
    assert_eq!(manager.cores_count(), count);
    assert_eq!(manager.topology.population_count(), 1);
}

#[test]
#[cfg(any(target_os = "linux", target_os = "android"))]
fn test_enumerate_real_threads() {
    let (main_tid, main_stop, main_handle) = spawn_named_thread("main");
    let (worker_tid, worker_stop, worker_handle) = spawn_named_thread("worker-1");

    let manager = AffinityManager::default();
    let threads = parse_thread_listing(&manager.enumerate_threads());
    assert_eq!(threads.get(&main_tid).map(String::as_str), Some("main"));
    assert_eq!(threads.get(&worker_tid).map(String::as_str), Some("worker-1"));
    assert!(
        threads.contains_key(&current_thread_id().unwrap()),
        "calling thread should be listed"
    );

    drop((main_stop, worker_stop));
    main_handle.join().unwrap();
    worker_handle.join().unwrap();
}

#[test]
#[cfg(any(target_os = "linux", target_os = "android"))]
fn test_set_current_thread_affinity() {
    let original = current_thread_affinity_mask().expect("Failed to get original affinity");
    let first_core = original.cores().next().expect("thread must be allowed on some core");
    let pinned = AffinityMask::from_cores([first_core]);

    match set_current_thread_affinity_mask(pinned) {
        Ok(()) => {
            assert_eq!(current_thread_affinity_mask().unwrap(), pinned);
            set_current_thread_affinity_mask(original).expect("Failed to restore affinity");
            assert_eq!(current_thread_affinity_mask().unwrap(), original);
        }
        Err(ref err) if is_permission_error(err) => {
            eprintln!("Skipping affinity test: insufficient permissions");
        }
        Err(err) => panic!("Unexpected error: {err:?}"),
    }
}

#[test]
#[cfg(any(target_os = "linux", target_os = "android"))]
fn test_set_affinity_by_name() {
    let (tid, stop, handle) = spawn_named_thread("pin-me");
    let original = thread_affinity_mask(tid).unwrap();
    let first_core = original.cores().next().unwrap();
    let pinned = AffinityMask::from_cores([first_core]);

    let manager = AffinityManager::default();
    let report = manager.set_thread_affinity_mask_by_name("pin-me", pinned);
    assert_eq!(report.matched(), 1);
    match &report.results[0] {
        (matched_tid, Ok(())) => {
            assert_eq!(*matched_tid, tid);
            assert_eq!(thread_affinity_mask(tid).unwrap(), pinned);
        }
        (_, Err(err)) if is_permission_error(err) => {
            eprintln!("Skipping affinity test: insufficient permissions");
        }
        (_, Err(err)) => panic!("Unexpected error: {err:?}"),
    }

    drop(stop);
    handle.join().unwrap();
}

#[test]
#[cfg(any(target_os = "linux", target_os = "android"))]
fn test_set_affinity_by_unknown_name_is_noop() {
    let manager = AffinityManager::default();
    let report = manager.set_thread_affinity_mask_by_name("nonexistent", AffinityMask::from_bits(1));
    assert_eq!(report.matched(), 0);
    assert!(report.is_ok());
}

#[test]
#[cfg(any(target_os = "linux", target_os = "android"))]
fn test_concurrent_topology_queries() {
    const THREADS: usize = 8;
    let manager = AffinityManager::default();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let manager = manager.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.cpu_topology()
            })
        })
        .collect();
    let topologies: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(manager.topology.population_count(), 1);
    for topology in &topologies {
        assert_eq!(**topology, *topologies[0]);
    }
}

#[test]
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn test_non_linux_returns_not_supported() {
    assert!(matches!(
        set_current_thread_affinity_mask(AffinityMask::from_bits(1)).unwrap_err(),
        ThreadAffinityError::NotSupported
    ));
    assert!(matches!(
        current_thread_affinity_mask().unwrap_err(),
        ThreadAffinityError::NotSupported
    ));
}
