// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The bounded, cross-process admission queue.
//!
//! The queue carries no useful payload: a slot means only "a connection is waiting", and
//! the actual descriptor travels out of band over the per-worker [`crate::ipc::ChannelEnd`].
//! Capacity is enforced purely through the `empty`/`filled` semaphore pair; the ring buffer
//! itself (guarded by `queue_mutex`) only has to track how many slots are taken and where.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::Result;
use crate::ipc::{NamedSemaphore, SharedRegion};

pub(crate) const EMPTY_SEM: &str = "/staticd_empty";
pub(crate) const FILLED_SEM: &str = "/staticd_filled";
pub(crate) const QUEUE_MUTEX_SEM: &str = "/staticd_queue_mutex";

/// A handle to the shared admission queue. Cheaply cloneable; every clone refers to the
/// same underlying shared memory and semaphores.
#[derive(Clone, Debug)]
pub struct AdmissionQueue {
    region: Arc<SharedRegion>,
    empty: Arc<NamedSemaphore>,
    filled: Arc<NamedSemaphore>,
    mutex: Arc<NamedSemaphore>,
    capacity: usize,
}

impl AdmissionQueue {
    /// Creates the queue's semaphores and initializes its counters in `region`.
    ///
    /// Must be called once by the master, before `fork`; `region` must have just come back
    /// from [`SharedRegion::create`] with the same `capacity`.
    pub fn create(region: Arc<SharedRegion>, capacity: usize) -> Result<Self> {
        let empty = NamedSemaphore::open(EMPTY_SEM, capacity as u32)?;
        let filled = NamedSemaphore::open(FILLED_SEM, 0)?;
        let mutex = NamedSemaphore::open(QUEUE_MUTEX_SEM, 1)?;
        Ok(Self {
            region,
            empty: Arc::new(empty),
            filled: Arc::new(filled),
            mutex: Arc::new(mutex),
            capacity,
        })
    }

    /// The effective queue capacity (`ServerConfig::max_queue_size`, clamped).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The shared region backing this queue, so the caller can build a [`crate::stats::Stats`]
    /// handle over the same mapping.
    pub fn region(&self) -> Arc<SharedRegion> {
        self.region.clone()
    }

    /// Non-blocking admit: returns `Ok(false)` immediately if the queue is full, rather
    /// than blocking the accept loop.
    pub fn try_admit(&self) -> Result<bool> {
        if !self.empty.try_wait()? {
            return Ok(false);
        }
        self.mutex.wait()?;
        self.push_slot();
        self.mutex.post()?;
        self.filled.post()?;
        Ok(true)
    }

    fn push_slot(&self) {
        // SAFETY: the caller holds `mutex`, the only invariant this region's queue fields need.
        unsafe {
            let data = self.region.data_mut();
            let pos = ((*data).queue_head + (*data).queue_count) % (*data).queue_capacity;
            (*data).queue_slots[pos] = 1;
            (*data).queue_count += 1;
        }
    }

    /// Blocks until a slot is available and removes it, honoring cooperative shutdown.
    ///
    /// Returns `Ok(false)` if `running` was cleared while waiting, in which case the caller
    /// should exit its dispatch loop rather than expect a corresponding descriptor.
    pub fn take(&self, running: &AtomicBool) -> Result<bool> {
        if !self.filled.wait_cancellable(running)? {
            return Ok(false);
        }
        if !self.mutex.wait_cancellable(running)? {
            // We hold `filled` but shutdown interrupted the mutex wait: give the slot back
            // so the semaphore balance does not leak.
            self.filled.post()?;
            return Ok(false);
        }
        // SAFETY: `mutex` is held.
        unsafe {
            let data = self.region.data_mut();
            (*data).queue_head = ((*data).queue_head + 1) % (*data).queue_capacity;
            (*data).queue_count -= 1;
        }
        self.mutex.post()?;
        self.empty.post()?;
        Ok(true)
    }
}
