// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device backend trait - native resource abstraction for pool operations.

pub mod host;

pub use host::{BackendStats, HostBackend};

use crate::error::Result;

/// Device ordinal type
pub type DeviceId = u32;

/// Handle to an ordered, device-side execution queue
///
/// Work items enqueued to the same queue execute in issue order; independent
/// queues have no relative ordering guarantee. Handles are opaque ids minted
/// by the backend; equality of handles is identity of the underlying queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueHandle(pub u32);

/// Handle to a numerical-library compute context
///
/// Bound to exactly one execution queue for its lifetime; operations
/// dispatched through it are ordered on that queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputeHandle(pub u32);

/// Native resource abstraction consumed by pools.
///
/// Implemented by:
/// - [`HostBackend`]: worker-thread queues, in-tree reference and CPU fallback
/// - vendor backends (CUDA, Level Zero, Metal) supplied by embedders
///
/// Every fallible operation is treated as unrecoverable by the pool layer:
/// errors propagate immediately and nothing is retried.
pub trait DeviceBackend: Send + Sync {
    /// Number of devices this backend exposes.
    fn device_count(&self) -> usize;

    /// Device that queue creation currently targets.
    fn current_device(&self) -> DeviceId;

    /// Make `device` current for subsequent queue creation.
    ///
    /// Side effect shared with the hosting environment: the backend's notion
    /// of the current device changes for every caller, not just this one.
    fn select_device(&self, device: DeviceId) -> Result<()>;

    /// Create an ordered execution queue on the current device.
    fn create_queue(&self) -> Result<QueueHandle>;

    /// Create a compute context permanently bound to `queue`.
    ///
    /// The binding is established here and never changes afterwards.
    fn create_compute(&self, queue: QueueHandle) -> Result<ComputeHandle>;

    /// Release an execution queue.
    ///
    /// Work already enqueued completes before the queue is released.
    fn destroy_queue(&self, queue: QueueHandle) -> Result<()>;

    /// Release a compute context.
    fn destroy_compute(&self, compute: ComputeHandle) -> Result<()>;

    /// Block the calling thread until `queue` has drained.
    fn sync_queue(&self, queue: QueueHandle) -> Result<()>;

    /// The hosting environment's currently-active queue (ambient mode).
    fn ambient_queue(&self) -> QueueHandle;

    /// The hosting environment's currently-active compute context
    /// (ambient mode). Bound to [`DeviceBackend::ambient_queue`].
    fn ambient_compute(&self) -> ComputeHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_identity() {
        assert_eq!(QueueHandle(3), QueueHandle(3));
        assert_ne!(QueueHandle(3), QueueHandle(4));
        assert_eq!(ComputeHandle(0), ComputeHandle(0));
        assert_ne!(ComputeHandle(0), ComputeHandle(1));
    }

    #[test]
    fn test_trait_is_object_safe() {
        fn assert_object_safe(_: &dyn DeviceBackend) {}
        let backend = HostBackend::new(1);
        assert_object_safe(&backend);
    }
}
