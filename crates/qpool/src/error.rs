// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for pool and backend operations.

use std::fmt;

use crate::backend::DeviceId;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during pool and backend operations
///
/// Resource-allocation failures during pool construction are fatal for the
/// workload class this crate serves: nothing is retried, no partial cleanup
/// is attempted, and the process is expected to terminate.
#[derive(Debug)]
pub enum Error {
    /// Device ordinal outside the backend's device range
    InvalidDevice { device: DeviceId, count: usize },

    /// Device selection failed
    DeviceSelect { device: DeviceId, reason: String },

    /// Queue or compute-context allocation failed while populating a pool
    ///
    /// Lanes below `lane` were already created and are considered leaked.
    LaneAllocation {
        device: DeviceId,
        lane: usize,
        reason: String,
    },

    /// Blocking drain of an execution queue failed
    SyncFailed { lane: usize, reason: String },

    /// Resource release failed during pool teardown
    TeardownFailed { lane: usize, reason: String },

    /// Backend-level failure outside any lane context
    Backend(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDevice { device, count } => {
                write!(f, "invalid device {} (backend has {} devices)", device, count)
            }
            Self::DeviceSelect { device, reason } => {
                write!(f, "failed to select device {}: {}", device, reason)
            }
            Self::LaneAllocation {
                device,
                lane,
                reason,
            } => write!(
                f,
                "lane {} allocation failed on device {}: {}",
                lane, device, reason
            ),
            Self::SyncFailed { lane, reason } => {
                write!(f, "sync of lane {} failed: {}", lane, reason)
            }
            Self::TeardownFailed { lane, reason } => {
                write!(f, "teardown of lane {} failed: {}", lane, reason)
            }
            Self::Backend(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
