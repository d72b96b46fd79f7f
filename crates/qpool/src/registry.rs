// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide pool registry with double-checked lazy construction.
//!
//! One [`DevicePool`] per device, created on first request and shared for
//! process lifetime.
//!
//! # Architecture
//!
//! ```text
//! PoolRegistry (static global, installed once)
//! +-- entries: ArcSwap<HashMap<DeviceId, Arc<DevicePool>>>   lock-free reads
//! +-- grow:    Mutex<()>                                     construction only
//! ```
//!
//! The steady-state path is a single atomic snapshot load; the mutex is
//! taken only by threads racing to construct a pool that does not exist
//! yet. Construction runs with the mutex held, and the guard is scope-
//! dropped on every exit path, so a fatal construction failure on one
//! device never blocks another device's first access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use arc_swap::ArcSwap;

use crate::backend::{DeviceBackend, DeviceId, HostBackend};
use crate::config::PoolConfig;
use crate::error::Result;
use crate::pool::DevicePool;

/// Process-wide mapping from device to its pool.
///
/// Entries are created lazily and never removed during normal operation;
/// [`PoolRegistry::teardown_all`] is the explicit end-of-process flush.
pub struct PoolRegistry {
    entries: ArcSwap<HashMap<DeviceId, Arc<DevicePool>>>,
    grow: Mutex<()>,
    backend: Arc<dyn DeviceBackend>,
    config: PoolConfig,
}

impl PoolRegistry {
    /// Create an empty registry over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn DeviceBackend>, config: PoolConfig) -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
            grow: Mutex::new(()),
            backend,
            config,
        }
    }

    /// Pool for `device`, constructing it on first request.
    ///
    /// Under concurrent first-time requests for the same unseen device,
    /// exactly one pool is constructed and every caller receives the same
    /// instance. Requests after the first pay only an atomic snapshot load.
    ///
    /// A construction failure is fatal for the workload: no entry is
    /// inserted, the error propagates, and the process is expected to
    /// terminate rather than retry.
    pub fn get_or_create(&self, device: DeviceId) -> Result<Arc<DevicePool>> {
        // Fast path: lock-free snapshot lookup.
        if let Some(pool) = self.entries.load().get(&device) {
            return Ok(Arc::clone(pool));
        }

        let _guard = self.grow.lock().unwrap_or_else(|e| e.into_inner());

        // Re-check under the lock: another thread may have won the race.
        if let Some(pool) = self.entries.load().get(&device) {
            return Ok(Arc::clone(pool));
        }

        let pool = match DevicePool::create(device, Arc::clone(&self.backend), &self.config) {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                log::error!(
                    "[PoolRegistry] pool construction failed for device {}: {}",
                    device,
                    e
                );
                // `_guard` drops here; other devices' first access stays live.
                return Err(e);
            }
        };

        let current = self.entries.load_full();
        let mut next = (*current).clone();
        next.insert(device, Arc::clone(&pool));
        self.entries.store(Arc::new(next));

        log::info!("[PoolRegistry] pool created for device {}", device);
        Ok(pool)
    }

    /// Existing pool for `device`, if one was constructed.
    #[must_use]
    pub fn get(&self, device: DeviceId) -> Option<Arc<DevicePool>> {
        self.entries.load().get(&device).map(Arc::clone)
    }

    /// Number of constructed pools.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.entries.load().len()
    }

    /// Tear down every pool and empty the registry.
    ///
    /// Same preconditions as [`DevicePool::teardown`], extended registry-
    /// wide: every user of every pool must have stopped first. Intended as
    /// the explicit end-of-process flush.
    pub fn teardown_all(&self) -> Result<()> {
        let _guard = self.grow.lock().unwrap_or_else(|e| e.into_inner());
        let drained = self.entries.swap(Arc::new(HashMap::new()));
        for (device, pool) in drained.iter() {
            pool.teardown()?;
            log::debug!("[PoolRegistry] pool for device {} torn down", device);
        }
        Ok(())
    }
}

static GLOBAL_REGISTRY: OnceLock<PoolRegistry> = OnceLock::new();

/// Install the process-wide registry over `backend`.
///
/// Configuration is read from the environment at install time. The first
/// installer wins; later calls (and [`registry`]) return the same instance,
/// ignoring their argument.
pub fn init_registry(backend: Arc<dyn DeviceBackend>) -> &'static PoolRegistry {
    GLOBAL_REGISTRY.get_or_init(|| PoolRegistry::new(backend, PoolConfig::from_env()))
}

/// Process-wide registry, installing a single-device [`HostBackend`] if
/// nothing was installed yet.
pub fn registry() -> &'static PoolRegistry {
    GLOBAL_REGISTRY
        .get_or_init(|| PoolRegistry::new(Arc::new(HostBackend::new(1)), PoolConfig::from_env()))
}
