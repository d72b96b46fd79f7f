// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! QPOOL Global Configuration - Single Source of Truth
//!
//! This module centralizes the pool sizing constant and the runtime
//! configuration knobs. **NEVER hardcode elsewhere!**

/// Number of execution lanes per device pool.
///
/// Fixed for the lifetime of every pool; lane addressing wraps modulo this
/// value (see [`crate::pool::lane_index`]). 16 lanes keep enough queues in
/// flight to hide launch latency without exhausting per-device queue limits
/// on any supported backend.
pub const POOL_LANES: usize = 16;

/// Environment variable selecting ambient mode.
///
/// When set to `1` or `true`, pools defer to the hosting environment's
/// currently-active queue/compute handle instead of managing their own
/// lanes. Synchronization then becomes the hosting environment's
/// responsibility and [`crate::pool::DevicePool::sync_prefix`] is a no-op.
pub const ENV_AMBIENT: &str = "QPOOL_AMBIENT";

/// Runtime configuration for pool construction.
///
/// Captured once when a registry is installed; every pool the registry
/// constructs reads the same snapshot, so the pooled-vs-ambient decision is
/// made exactly once per pool, at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Defer to the hosting environment's ambient queue/handle.
    pub ambient: bool,
}

impl PoolConfig {
    /// Create the default configuration (pooled mode).
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { ambient: false }
    }

    /// Read configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let ambient = std::env::var(ENV_AMBIENT)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self { ambient }
    }

    /// Override ambient mode (builder style).
    #[inline]
    #[must_use]
    pub fn with_ambient(mut self, ambient: bool) -> Self {
        self.ambient = ambient;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pooled() {
        assert!(!PoolConfig::new().ambient);
        assert!(!PoolConfig::default().ambient);
    }

    #[test]
    fn test_with_ambient() {
        let config = PoolConfig::new().with_ambient(true);
        assert!(config.ambient);
        assert!(!config.with_ambient(false).ambient);
    }

    #[test]
    fn test_from_env_unset_defaults_to_pooled() {
        // The variable is not set in the test environment unless a test
        // below races us; either way from_env must not panic.
        let _ = PoolConfig::from_env();
    }

    #[test]
    fn test_lane_count_fixed() {
        // Wraparound addressing and the prefix barrier both assume 16.
        assert_eq!(POOL_LANES, 16);
    }
}
