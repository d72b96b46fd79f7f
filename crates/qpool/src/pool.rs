// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-device execution lane pool.
//!
//! A pool owns a fixed ring of [`POOL_LANES`] lanes, each pairing an
//! execution queue with the compute context bound to it at creation. Callers
//! address lanes by arbitrary index; addressing wraps modulo the ring size,
//! so monotonically increasing indices round-robin across the pool.
//!
//! # Architecture
//!
//! ```text
//! DevicePool (one per device, owned by PoolRegistry)
//! +-- mode: Pooled([Lane; 16])   lanes fixed after setup, lock-free reads
//! |         Ambient              defer to the backend's current queue/handle
//! +-- backend: Arc<dyn DeviceBackend>
//! ```
//!
//! # Thread Safety
//!
//! The lane ring is immutable after construction; `queue`/`compute` are safe
//! for unlimited concurrent readers without locking. `sync_prefix` blocks
//! only the calling thread. `teardown` is the one exception: it must not
//! race with any other use of the pool (see its documentation).

use std::sync::Arc;

use crate::backend::{ComputeHandle, DeviceBackend, DeviceId, QueueHandle};
use crate::config::{PoolConfig, POOL_LANES};
use crate::error::{Error, Result};

/// Map a logical lane index to its physical slot.
///
/// Two indices congruent modulo [`POOL_LANES`] always address the same
/// physical lane. This periodicity is deliberate: callers handing out
/// monotonically increasing indices round-robin across the pool.
#[inline]
#[must_use]
pub const fn lane_index(index: usize) -> usize {
    index % POOL_LANES
}

/// One lane: an execution queue and the compute context bound to it.
#[derive(Debug, Clone, Copy)]
struct Lane {
    queue: QueueHandle,
    compute: ComputeHandle,
}

/// Pooled-vs-ambient, decided once at construction.
enum PoolMode {
    /// Fixed ring of lanes; length is exactly [`POOL_LANES`], never resized.
    Pooled(Vec<Lane>),
    /// Defer every accessor to the backend's ambient queue/handle.
    Ambient,
}

/// Fixed-size pool of execution lanes for one physical device.
///
/// Constructed lazily through [`crate::registry::PoolRegistry`]; most
/// callers never build one directly. Accessors are valid from construction
/// until [`DevicePool::teardown`].
pub struct DevicePool {
    device: DeviceId,
    backend: Arc<dyn DeviceBackend>,
    mode: PoolMode,
}

impl DevicePool {
    /// Set up a pool for `device`.
    ///
    /// In pooled mode this selects `device` as the backend's current device
    /// (a side effect visible to every other backend user), then allocates
    /// [`POOL_LANES`] queues and the compute context bound to each.
    ///
    /// Allocation failure is fatal: the error propagates immediately, no
    /// cleanup of lower-indexed lanes is attempted (they are leaked), and
    /// the process is expected to terminate.
    pub fn create(
        device: DeviceId,
        backend: Arc<dyn DeviceBackend>,
        config: &PoolConfig,
    ) -> Result<Self> {
        if config.ambient {
            log::debug!("[DevicePool] device {} deferring to ambient mode", device);
            return Ok(Self {
                device,
                backend,
                mode: PoolMode::Ambient,
            });
        }

        backend.select_device(device)?;
        let mut lanes = Vec::with_capacity(POOL_LANES);
        for lane in 0..POOL_LANES {
            let queue = backend.create_queue().map_err(|e| Error::LaneAllocation {
                device,
                lane,
                reason: e.to_string(),
            })?;
            let compute = backend
                .create_compute(queue)
                .map_err(|e| Error::LaneAllocation {
                    device,
                    lane,
                    reason: e.to_string(),
                })?;
            lanes.push(Lane { queue, compute });
        }
        log::info!(
            "[DevicePool] device {}: {} lanes ready",
            device,
            POOL_LANES
        );
        Ok(Self {
            device,
            backend,
            mode: PoolMode::Pooled(lanes),
        })
    }

    /// Device this pool serves.
    #[inline]
    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Whether this pool defers to the ambient queue/handle.
    #[inline]
    #[must_use]
    pub fn is_ambient(&self) -> bool {
        matches!(self.mode, PoolMode::Ambient)
    }

    /// Execution queue for logical index `index`.
    ///
    /// Never fails: any index is valid via modulo wraparound. In ambient
    /// mode the index is ignored and the backend's currently-active queue is
    /// returned instead.
    #[must_use]
    pub fn queue(&self, index: usize) -> QueueHandle {
        match &self.mode {
            PoolMode::Ambient => self.backend.ambient_queue(),
            PoolMode::Pooled(lanes) => lanes[lane_index(index)].queue,
        }
    }

    /// Compute context for logical index `index`.
    ///
    /// Always the context permanently bound to `queue(index)`'s lane, so
    /// work dispatched through it is ordered on that queue. Ambient mode
    /// returns the backend's currently-active context.
    #[must_use]
    pub fn compute(&self, index: usize) -> ComputeHandle {
        match &self.mode {
            PoolMode::Ambient => self.backend.ambient_compute(),
            PoolMode::Pooled(lanes) => lanes[lane_index(index)].compute,
        }
    }

    /// Partial barrier: block until lanes `[0, min(count, POOL_LANES))`
    /// have drained.
    ///
    /// `count <= 0` returns immediately; `count >= POOL_LANES` waits on the
    /// whole pool. Unlike `queue`/`compute` this never wraps: it always
    /// targets a prefix, because its purpose is "wait for the first `count`
    /// logical workers", not "wait for lane `count`". Ambient mode is
    /// unconditionally a no-op; synchronization there belongs to the
    /// hosting environment.
    pub fn sync_prefix(&self, count: isize) -> Result<()> {
        let lanes = match &self.mode {
            PoolMode::Ambient => return Ok(()),
            PoolMode::Pooled(lanes) => lanes,
        };
        let upto = count.clamp(0, POOL_LANES as isize) as usize;
        for (lane, slot) in lanes.iter().enumerate().take(upto) {
            self.backend
                .sync_queue(slot.queue)
                .map_err(|e| Error::SyncFailed {
                    lane,
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Release all lanes' queues and compute contexts.
    ///
    /// Preconditions (not detected or enforced): called at most once, and
    /// only after every user of this pool has stopped issuing work and
    /// dropped the handles it obtained. Violations are undefined from the
    /// pool's point of view; the backend may surface an error. Ambient mode
    /// owns nothing and returns immediately.
    pub fn teardown(&self) -> Result<()> {
        let lanes = match &self.mode {
            PoolMode::Ambient => return Ok(()),
            PoolMode::Pooled(lanes) => lanes,
        };
        for (lane, slot) in lanes.iter().enumerate() {
            self.backend
                .destroy_queue(slot.queue)
                .map_err(|e| Error::TeardownFailed {
                    lane,
                    reason: e.to_string(),
                })?;
            self.backend
                .destroy_compute(slot.compute)
                .map_err(|e| Error::TeardownFailed {
                    lane,
                    reason: e.to_string(),
                })?;
        }
        log::info!("[DevicePool] device {}: lanes released", self.device);
        Ok(())
    }
}

impl std::fmt::Debug for DevicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePool")
            .field("device", &self.device)
            .field("ambient", &self.is_ambient())
            .finish()
    }
}
