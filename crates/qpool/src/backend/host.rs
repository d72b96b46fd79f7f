// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host reference backend - worker-thread execution queues.
//!
//! Realizes each execution queue as a dedicated worker thread fed by an
//! unbounded channel, so work submitted to the same queue runs in issue
//! order and independent queues interleave freely. Doubles as the CPU
//! fallback when no accelerator backend is linked in.
//!
//! # Architecture
//!
//! ```text
//! HostBackend
//! +-- queues:   DashMap<QueueHandle, Worker>     (lock-free sharded lookup)
//! |     Worker: channel sender + DrainGate + thread handle
//! +-- bindings: DashMap<ComputeHandle, QueueHandle>
//! +-- ambient:  lazily created (queue, compute) pair
//! ```
//!
//! # Blocking model
//!
//! `sync_queue` waits on the queue's `DrainGate` (mutex + condvar) until the
//! pending-job count reaches zero. Submitters increment the count before the
//! job enters the channel, so a sync that starts after a submit returns is
//! guaranteed to observe that job.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use crossbeam::channel::{self, Sender};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use super::{ComputeHandle, DeviceBackend, DeviceId, QueueHandle};
use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pending-job gate for one queue.
///
/// Counter goes up at submit time and down when the worker finishes a job;
/// waiters sleep on the condvar until it hits zero.
struct DrainGate {
    pending: Mutex<usize>,
    drained: Condvar,
}

impl DrainGate {
    fn new() -> Self {
        Self {
            pending: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    fn begin_one(&self) {
        *self.pending.lock() += 1;
    }

    fn complete_one(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn wait_drained(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.drained.wait(&mut pending);
        }
    }
}

/// One live execution queue: its feed channel, drain gate, and thread.
struct Worker {
    tx: Sender<Job>,
    gate: Arc<DrainGate>,
    thread: thread::JoinHandle<()>,
}

/// Snapshot of backend resource counters.
///
/// Tests use deltas of these to observe "exactly one pool setup ran" and
/// "teardown released exactly what setup created".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Queues created since backend construction.
    pub queues_created: u64,
    /// Queues destroyed since backend construction.
    pub queues_destroyed: u64,
    /// Compute contexts created since backend construction.
    pub computes_created: u64,
    /// Compute contexts destroyed since backend construction.
    pub computes_destroyed: u64,
    /// Blocking queue drains performed.
    pub syncs: u64,
}

/// Worker-thread backend for host execution.
///
/// Queue handles index worker threads; compute handles are bookkeeping ids
/// whose queue binding is recorded at creation and queryable via
/// [`HostBackend::bound_queue`]. The ambient pair is created lazily on first
/// ambient access and lives until the backend drops.
pub struct HostBackend {
    devices: usize,
    current: AtomicU32,
    next_queue: AtomicU32,
    next_compute: AtomicU32,
    queues: DashMap<QueueHandle, Worker>,
    bindings: DashMap<ComputeHandle, QueueHandle>,
    ambient: OnceLock<(QueueHandle, ComputeHandle)>,
    queues_created: AtomicU64,
    queues_destroyed: AtomicU64,
    computes_created: AtomicU64,
    computes_destroyed: AtomicU64,
    syncs: AtomicU64,
}

impl HostBackend {
    /// Create a backend exposing `devices` host devices.
    ///
    /// A device here is a pure addressing domain; all queues execute on host
    /// threads regardless of which device they were created for.
    #[must_use]
    pub fn new(devices: usize) -> Self {
        Self {
            devices: devices.max(1),
            current: AtomicU32::new(0),
            next_queue: AtomicU32::new(0),
            next_compute: AtomicU32::new(0),
            queues: DashMap::new(),
            bindings: DashMap::new(),
            ambient: OnceLock::new(),
            queues_created: AtomicU64::new(0),
            queues_destroyed: AtomicU64::new(0),
            computes_created: AtomicU64::new(0),
            computes_destroyed: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
        }
    }

    /// Enqueue a closure on `queue`.
    ///
    /// Work on the same queue runs in submission order. Returns an error for
    /// a handle the backend does not know (destroyed or never created).
    pub fn submit<F>(&self, queue: QueueHandle, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let worker = self
            .queues
            .get(&queue)
            .ok_or_else(|| Error::Backend(format!("submit to unknown queue {:?}", queue)))?;
        worker.gate.begin_one();
        if worker.tx.send(Box::new(job)).is_err() {
            // Worker stopped between lookup and send; roll the count back.
            worker.gate.complete_one();
            return Err(Error::Backend(format!("queue {:?} worker stopped", queue)));
        }
        Ok(())
    }

    /// Queue a compute context was bound to at creation, if it exists.
    #[must_use]
    pub fn bound_queue(&self, compute: ComputeHandle) -> Option<QueueHandle> {
        self.bindings.get(&compute).map(|entry| *entry.value())
    }

    /// Number of live queues (ambient included once created).
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Snapshot of the resource counters.
    #[must_use]
    pub fn stats(&self) -> BackendStats {
        BackendStats {
            queues_created: self.queues_created.load(Ordering::Relaxed),
            queues_destroyed: self.queues_destroyed.load(Ordering::Relaxed),
            computes_created: self.computes_created.load(Ordering::Relaxed),
            computes_destroyed: self.computes_destroyed.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
        }
    }

    fn spawn_worker(&self, device: DeviceId) -> QueueHandle {
        let id = QueueHandle(self.next_queue.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = channel::unbounded::<Job>();
        let gate = Arc::new(DrainGate::new());
        let worker_gate = Arc::clone(&gate);
        let thread = thread::spawn(move || {
            while let Ok(job) = rx.recv() {
                job();
                worker_gate.complete_one();
            }
        });
        self.queues.insert(id, Worker { tx, gate, thread });
        self.queues_created.fetch_add(1, Ordering::Relaxed);
        log::debug!("[HostBackend] queue {:?} created on device {}", id, device);
        id
    }

    fn register_compute(&self, queue: QueueHandle) -> ComputeHandle {
        let id = ComputeHandle(self.next_compute.fetch_add(1, Ordering::Relaxed));
        self.bindings.insert(id, queue);
        self.computes_created.fetch_add(1, Ordering::Relaxed);
        id
    }

    fn ambient_pair(&self) -> (QueueHandle, ComputeHandle) {
        *self.ambient.get_or_init(|| {
            let queue = self.spawn_worker(self.current_device());
            let compute = self.register_compute(queue);
            log::debug!(
                "[HostBackend] ambient pair {:?}/{:?} created",
                queue,
                compute
            );
            (queue, compute)
        })
    }

    fn shutdown_worker(&self, queue: QueueHandle) -> Result<()> {
        let (_, worker) = self.queues.remove(&queue).ok_or_else(|| {
            Error::Backend(format!("destroy of unknown queue {:?}", queue))
        })?;
        let Worker { tx, thread, .. } = worker;
        // Disconnect the channel; the worker drains buffered jobs and exits.
        drop(tx);
        thread
            .join()
            .map_err(|_| Error::Backend(format!("queue {:?} worker panicked", queue)))?;
        self.queues_destroyed.fetch_add(1, Ordering::Relaxed);
        log::debug!("[HostBackend] queue {:?} destroyed", queue);
        Ok(())
    }
}

impl DeviceBackend for HostBackend {
    fn device_count(&self) -> usize {
        self.devices
    }

    fn current_device(&self) -> DeviceId {
        self.current.load(Ordering::Relaxed)
    }

    fn select_device(&self, device: DeviceId) -> Result<()> {
        if device as usize >= self.devices {
            return Err(Error::InvalidDevice {
                device,
                count: self.devices,
            });
        }
        self.current.store(device, Ordering::Relaxed);
        Ok(())
    }

    fn create_queue(&self) -> Result<QueueHandle> {
        Ok(self.spawn_worker(self.current_device()))
    }

    fn create_compute(&self, queue: QueueHandle) -> Result<ComputeHandle> {
        if !self.queues.contains_key(&queue) {
            return Err(Error::Backend(format!(
                "compute context requested for unknown queue {:?}",
                queue
            )));
        }
        Ok(self.register_compute(queue))
    }

    fn destroy_queue(&self, queue: QueueHandle) -> Result<()> {
        self.shutdown_worker(queue)
    }

    fn destroy_compute(&self, compute: ComputeHandle) -> Result<()> {
        self.bindings.remove(&compute).ok_or_else(|| {
            Error::Backend(format!("destroy of unknown compute context {:?}", compute))
        })?;
        self.computes_destroyed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn sync_queue(&self, queue: QueueHandle) -> Result<()> {
        // Clone the gate out of the map entry; holding the shard ref while
        // blocked would stall unrelated queue creation on the same shard.
        let gate = {
            let worker = self
                .queues
                .get(&queue)
                .ok_or_else(|| Error::Backend(format!("sync of unknown queue {:?}", queue)))?;
            Arc::clone(&worker.gate)
        };
        gate.wait_drained();
        self.syncs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn ambient_queue(&self) -> QueueHandle {
        self.ambient_pair().0
    }

    fn ambient_compute(&self) -> ComputeHandle {
        self.ambient_pair().1
    }
}

impl Drop for HostBackend {
    fn drop(&mut self) {
        let live: Vec<QueueHandle> = self.queues.iter().map(|entry| *entry.key()).collect();
        for queue in live {
            if let Some((_, worker)) = self.queues.remove(&queue) {
                let Worker { tx, thread, .. } = worker;
                drop(tx);
                let _ = thread.join();
            }
        }
    }
}

impl std::fmt::Debug for HostBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBackend")
            .field("devices", &self.devices)
            .field("current", &self.current_device())
            .field("queue_count", &self.queue_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[test]
    fn test_same_queue_runs_in_issue_order() {
        let backend = HostBackend::new(1);
        let queue = backend.create_queue().expect("queue");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            backend
                .submit(queue, move || seen.lock().push(i))
                .expect("submit");
        }
        backend.sync_queue(queue).expect("sync");

        let seen = seen.lock();
        assert_eq!(seen.len(), 100);
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "order preserved");
    }

    #[test]
    fn test_sync_blocks_until_drained() {
        let backend = HostBackend::new(1);
        let queue = backend.create_queue().expect("queue");

        backend
            .submit(queue, || thread::sleep(Duration::from_millis(50)))
            .expect("submit");

        let start = Instant::now();
        backend.sync_queue(queue).expect("sync");
        assert!(
            start.elapsed() >= Duration::from_millis(45),
            "sync should wait for the in-flight job"
        );
    }

    #[test]
    fn test_sync_empty_queue_is_immediate() {
        let backend = HostBackend::new(1);
        let queue = backend.create_queue().expect("queue");

        let start = Instant::now();
        backend.sync_queue(queue).expect("sync");
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn test_compute_binding_recorded() {
        let backend = HostBackend::new(1);
        let q0 = backend.create_queue().expect("queue");
        let q1 = backend.create_queue().expect("queue");
        let c0 = backend.create_compute(q0).expect("compute");
        let c1 = backend.create_compute(q1).expect("compute");

        assert_eq!(backend.bound_queue(c0), Some(q0));
        assert_eq!(backend.bound_queue(c1), Some(q1));
    }

    #[test]
    fn test_compute_for_unknown_queue_fails() {
        let backend = HostBackend::new(1);
        let result = backend.create_compute(QueueHandle(999));
        assert!(matches!(result, Err(Error::Backend(_))));
    }

    #[test]
    fn test_destroy_unknown_handles_fail() {
        let backend = HostBackend::new(1);
        assert!(backend.destroy_queue(QueueHandle(42)).is_err());
        assert!(backend.destroy_compute(ComputeHandle(42)).is_err());
    }

    #[test]
    fn test_double_destroy_fails() {
        let backend = HostBackend::new(1);
        let queue = backend.create_queue().expect("queue");
        backend.destroy_queue(queue).expect("first destroy");
        assert!(backend.destroy_queue(queue).is_err());
    }

    #[test]
    fn test_destroy_drains_buffered_work() {
        let backend = HostBackend::new(1);
        let queue = backend.create_queue().expect("queue");
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            backend
                .submit(queue, move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .expect("submit");
        }
        backend.destroy_queue(queue).expect("destroy");
        assert_eq!(ran.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_select_device_bounds() {
        let backend = HostBackend::new(2);
        assert_eq!(backend.device_count(), 2);
        backend.select_device(1).expect("valid device");
        assert_eq!(backend.current_device(), 1);
        assert!(matches!(
            backend.select_device(2),
            Err(Error::InvalidDevice { device: 2, count: 2 })
        ));
        // A failed select leaves the current device untouched.
        assert_eq!(backend.current_device(), 1);
    }

    #[test]
    fn test_ambient_pair_is_stable_and_bound() {
        let backend = HostBackend::new(1);
        let queue = backend.ambient_queue();
        let compute = backend.ambient_compute();

        assert_eq!(backend.ambient_queue(), queue);
        assert_eq!(backend.ambient_compute(), compute);
        assert_eq!(backend.bound_queue(compute), Some(queue));
    }

    #[test]
    fn test_stats_track_lifecycle() {
        let backend = HostBackend::new(1);
        let before = backend.stats();

        let queue = backend.create_queue().expect("queue");
        let compute = backend.create_compute(queue).expect("compute");
        backend.sync_queue(queue).expect("sync");
        backend.destroy_queue(queue).expect("destroy queue");
        backend.destroy_compute(compute).expect("destroy compute");

        let after = backend.stats();
        assert_eq!(after.queues_created - before.queues_created, 1);
        assert_eq!(after.queues_destroyed - before.queues_destroyed, 1);
        assert_eq!(after.computes_created - before.computes_created, 1);
        assert_eq!(after.computes_destroyed - before.computes_destroyed, 1);
        assert_eq!(after.syncs - before.syncs, 1);
    }

    #[test]
    fn test_drop_completes_buffered_work() {
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let backend = HostBackend::new(1);
            let queue = backend.create_queue().expect("queue");
            for _ in 0..5 {
                let ran = Arc::clone(&ran);
                backend
                    .submit(queue, move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                    })
                    .expect("submit");
            }
        }
        assert_eq!(ran.load(Ordering::SeqCst), 5);
    }
}
