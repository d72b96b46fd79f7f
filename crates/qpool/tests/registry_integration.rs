// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry integration tests
//!
//! Validates single construction under concurrent first access and the
//! global install path.

use std::sync::{Arc, Barrier};
use std::thread;

use qpool::{init_registry, registry, HostBackend, PoolConfig, PoolRegistry, POOL_LANES};

#[test]
fn test_concurrent_first_access_constructs_once() {
    let backend = Arc::new(HostBackend::new(1));
    let registry = Arc::new(PoolRegistry::new(backend.clone(), PoolConfig::new()));
    let barrier = Arc::new(Barrier::new(8));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            registry.get_or_create(0).expect("pool")
        }));
    }

    let pools: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();

    for pool in &pools[1..] {
        assert!(
            Arc::ptr_eq(&pools[0], pool),
            "every racing caller must observe the same pool"
        );
    }
    assert_eq!(registry.pool_count(), 1);

    // Exactly one setup ran: one ring of queues and compute contexts.
    let stats = backend.stats();
    assert_eq!(stats.queues_created, POOL_LANES as u64);
    assert_eq!(stats.computes_created, POOL_LANES as u64);
}

#[test]
fn test_two_devices_get_independent_pools() {
    let backend = Arc::new(HostBackend::new(2));
    let registry = PoolRegistry::new(backend.clone(), PoolConfig::new());

    let pool0 = registry.get_or_create(0).expect("pool 0");
    let pool1 = registry.get_or_create(1).expect("pool 1");

    assert!(!Arc::ptr_eq(&pool0, &pool1));
    assert_eq!(pool0.device(), 0);
    assert_eq!(pool1.device(), 1);
    assert_eq!(backend.stats().queues_created, 2 * POOL_LANES as u64);

    for i in 0..POOL_LANES {
        assert_ne!(pool0.queue(i), pool1.queue(i), "lanes are per-pool");
    }
}

#[test]
fn test_randomized_access_converges_to_one_pool_per_device() {
    let backend = Arc::new(HostBackend::new(4));
    let registry = Arc::new(PoolRegistry::new(backend.clone(), PoolConfig::new()));

    let mut handles = Vec::new();
    for seed in 0..8u64 {
        let registry = Arc::clone(&registry);
        handles.push(thread::spawn(move || {
            let mut rng = fastrand::Rng::with_seed(seed);
            for _ in 0..200 {
                let device = rng.u32(0..4);
                let pool = registry.get_or_create(device).expect("pool");
                assert_eq!(pool.device(), device);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("thread");
    }

    assert_eq!(registry.pool_count(), 4);
    assert_eq!(backend.stats().queues_created, 4 * POOL_LANES as u64);

    for device in 0..4 {
        let known = registry.get(device).expect("pool exists");
        let again = registry.get_or_create(device).expect("pool");
        assert!(Arc::ptr_eq(&known, &again));
    }
}

#[test]
fn test_teardown_all_then_empty() {
    let backend = Arc::new(HostBackend::new(3));
    let registry = PoolRegistry::new(backend.clone(), PoolConfig::new());
    for device in 0..3 {
        registry.get_or_create(device).expect("pool");
    }

    registry.teardown_all().expect("teardown");

    assert_eq!(registry.pool_count(), 0);
    assert!(registry.get(0).is_none());
    let stats = backend.stats();
    assert_eq!(stats.queues_destroyed, stats.queues_created);
    assert_eq!(stats.computes_destroyed, stats.computes_created);
}

#[test]
fn test_global_install_first_wins() {
    let installed = init_registry(Arc::new(HostBackend::new(4)));
    assert!(std::ptr::eq(installed, registry()));
    assert!(std::ptr::eq(installed, init_registry(Arc::new(HostBackend::new(2)))));

    let pool1 = registry().get_or_create(3).expect("pool");
    let pool2 = installed.get_or_create(3).expect("pool");
    assert!(Arc::ptr_eq(&pool1, &pool2));
}
