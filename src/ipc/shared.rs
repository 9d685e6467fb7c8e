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

//! The single named shared-memory region backing both the admission queue and the
//! statistics counters, created once by the master before it forks.
//!
//! Every field in [`SharedData`] is a plain, non-atomic integer: every access to it is
//! already serialized by one of the named semaphores in [`super::semaphore`], exactly as
//! it would be if this were single-threaded code protected by a regular mutex. Reaching
//! for `AtomicUsize` here would buy nothing and would blur which lock actually protects
//! which field.

use shared_memory::{Shmem, ShmemConf};

use crate::error::{Result, ServerError};

/// Upper bound on the admission queue's ring buffer, fixed at compile time so the shared
/// region has a fixed size. `ServerConfig::max_queue_size` clamps the *effective* capacity
/// (and the initial value handed to the `empty` semaphore) within this bound.
pub const MAX_QUEUE_SIZE: usize = 4096;

const SHM_NAME: &str = "/staticd_shm";

#[repr(C)]
pub(crate) struct StatsRaw {
    pub total_requests: i64,
    pub bytes_transferred: i64,
    pub status_200: i64,
    pub status_404: i64,
    pub status_500: i64,
    pub active_connections: i64,
    pub total_response_time_ms: i64,
}

#[repr(C)]
pub(crate) struct SharedData {
    pub queue_capacity: usize,
    pub queue_head: usize,
    pub queue_count: usize,
    pub queue_slots: [i32; MAX_QUEUE_SIZE],
    pub stats: StatsRaw,
}

impl SharedData {
    fn zeroed() -> Self {
        Self {
            queue_capacity: 0,
            queue_head: 0,
            queue_count: 0,
            queue_slots: [0; MAX_QUEUE_SIZE],
            stats: StatsRaw {
                total_requests: 0,
                bytes_transferred: 0,
                status_200: 0,
                status_404: 0,
                status_500: 0,
                active_connections: 0,
                total_response_time_ms: 0,
            },
        }
    }
}

/// Owns the memory mapping. Created once by the master before `fork`; every worker
/// inherits the same mapping (and the same virtual address) as a side effect of `fork`,
/// so only the master ever calls [`SharedRegion::create`]. The stats-reader utility, which
/// is never a child of the master, calls [`SharedRegion::attach`] instead.
pub struct SharedRegion {
    shmem: Shmem,
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion").finish_non_exhaustive()
    }
}

// SAFETY: `shmem.as_ptr()` refers to OS shared memory designed for concurrent cross-process
// access; all reads/writes through it are externally serialized by a `NamedSemaphore`.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Creates the shared region fresh, zeroing it and recording `queue_capacity`.
    pub fn create(queue_capacity: usize) -> Result<Self> {
        let queue_capacity = queue_capacity.clamp(1, MAX_QUEUE_SIZE);
        let shmem = ShmemConf::new()
            .size(std::mem::size_of::<SharedData>())
            .os_id(SHM_NAME)
            .create()
            .map_err(|e| ServerError::SharedMemory(e.to_string()))?;

        // SAFETY: we hold the only reference to this freshly created mapping; no other
        // process has attached yet, so writing the initial value is race-free.
        unsafe {
            let ptr = shmem.as_ptr() as *mut SharedData;
            ptr.write(SharedData::zeroed());
            (*ptr).queue_capacity = queue_capacity;
        }

        Ok(Self { shmem })
    }

    /// Attaches to an already-created region by name. Used by the stats-reader utility,
    /// which is not a fork child of the master and must find the mapping independently.
    pub fn attach() -> Result<Self> {
        let shmem = ShmemConf::new()
            .os_id(SHM_NAME)
            .open()
            .map_err(|e| ServerError::SharedMemory(e.to_string()))?;
        Ok(Self { shmem })
    }

    pub(crate) fn data(&self) -> &SharedData {
        // SAFETY: the mapping is at least `size_of::<SharedData>()` bytes (enforced by
        // `create`) and was initialized before any reference to it was handed out.
        unsafe { &*(self.shmem.as_ptr() as *const SharedData) }
    }

    pub(crate) fn data_mut(&self) -> *mut SharedData {
        self.shmem.as_ptr() as *mut SharedData
    }
}
