// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # QPOOL - Per-device execution queue pooling
//!
//! A fixed pool of execution lanes per accelerator device, so many logical
//! workers can issue concurrent device work without host-side serialization,
//! plus a process-wide registry that lazily creates exactly one pool per
//! device under concurrent first access.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use qpool::{HostBackend, PoolConfig, PoolRegistry, POOL_LANES};
//!
//! fn main() -> qpool::Result<()> {
//!     let registry = PoolRegistry::new(Arc::new(HostBackend::new(2)), PoolConfig::new());
//!
//!     let pool = registry.get_or_create(0)?;
//!
//!     // Indices wrap modulo the ring: worker 3 and worker 19 share a lane.
//!     assert_eq!(pool.queue(3), pool.queue(3 + POOL_LANES));
//!
//!     // Wait for the first four lanes to drain.
//!     pool.sync_prefix(4)?;
//!
//!     registry.teardown_all()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      PoolRegistry (global)                   |
//! |   lock-free snapshot reads | mutex on the construction path  |
//! +--------------------------------------------------------------+
//! |                  DevicePool (one per device)                 |
//! |   16 lanes, index mod 16 | ambient variant | prefix barrier  |
//! +--------------------------------------------------------------+
//! |                   DeviceBackend (trait seam)                 |
//! |   HostBackend in-tree | vendor backends supplied by embedder |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PoolRegistry`] | Lazily creates and owns one pool per device |
//! | [`DevicePool`] | Fixed ring of (queue, compute) lanes for one device |
//! | [`DeviceBackend`] | Native resource seam implemented per accelerator |
//! | [`HostBackend`] | Worker-thread reference backend and CPU fallback |
//!
//! ## Modules Overview
//!
//! - [`registry`] - process-wide pool registry (start here)
//! - [`pool`] - per-device lane pool and partial barrier
//! - [`backend`] - backend trait, handle types, host implementation
//! - [`config`] - pool sizing and environment toggles

/// Device backend trait, opaque handle types, host implementation.
pub mod backend;
/// Pool sizing constant and runtime configuration.
pub mod config;
/// Crate error type and `Result` alias.
pub mod error;
/// Per-device execution lane pool.
pub mod pool;
/// Process-wide registry with double-checked lazy construction.
pub mod registry;

pub use backend::{
    BackendStats, ComputeHandle, DeviceBackend, DeviceId, HostBackend, QueueHandle,
};
pub use config::{PoolConfig, ENV_AMBIENT, POOL_LANES};
pub use error::{Error, Result};
pub use pool::{lane_index, DevicePool};
pub use registry::{init_registry, registry, PoolRegistry};
