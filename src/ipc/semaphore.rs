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

//! Thin wrapper over POSIX named semaphores (`sem_open`/`sem_wait`/`sem_post`).
//!
//! `nix` has no named-semaphore support, so this talks to `libc` directly. A named
//! semaphore is a kernel (or `/dev/shm`-backed) object addressed by a `/name` string,
//! independent of any shared memory mapping, which is exactly the cross-process mutex
//! and counting primitive the admission queue and stats region need.

use std::ffi::CString;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, ServerError};

/// A POSIX named semaphore, created (or attached to, if it already exists) via `sem_open`.
#[derive(Debug)]
pub struct NamedSemaphore {
    name: &'static str,
    sem: *mut libc::sem_t,
}

// SAFETY: `sem_t` as returned by `sem_open` is designed for exactly this: concurrent use from
// multiple threads and processes, serialized internally by the kernel.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Opens (creating if necessary) a named semaphore, initialized to `initial_value` the
    /// first time it is created. A second `open` of the same name attaches to the existing
    /// semaphore and ignores `initial_value`.
    pub fn open(name: &'static str, initial_value: u32) -> Result<Self> {
        let c_name = CString::new(name).expect("semaphore name must not contain NUL");
        // SAFETY: `c_name` is a valid NUL-terminated string for the duration of the call;
        // `O_CREAT` with mode 0o666 matches every other named object this server creates.
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                0o666,
                initial_value,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(ServerError::Semaphore {
                name,
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self { name, sem })
    }

    /// Blocks until the semaphore can be decremented, retrying transparently on `EINTR`.
    pub fn wait(&self) -> Result<()> {
        loop {
            // SAFETY: `self.sem` was returned by a successful `sem_open` and outlives `self`.
            let rc = unsafe { libc::sem_wait(self.sem) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(ServerError::Semaphore {
                name: self.name,
                source: err,
            });
        }
    }

    /// Like [`wait`](Self::wait), but re-checks `running` across each `EINTR` retry and
    /// returns `Ok(false)` without decrementing the semaphore if shutdown was observed.
    pub fn wait_cancellable(&self, running: &AtomicBool) -> Result<bool> {
        loop {
            // SAFETY: as in `wait`.
            let rc = unsafe { libc::sem_wait(self.sem) };
            if rc == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                if !running.load(Ordering::SeqCst) {
                    return Ok(false);
                }
                continue;
            }
            return Err(ServerError::Semaphore {
                name: self.name,
                source: err,
            });
        }
    }

    /// Attempts to decrement the semaphore without blocking.
    ///
    /// Returns `Ok(false)` rather than an error when the semaphore has no available count.
    pub fn try_wait(&self) -> Result<bool> {
        // SAFETY: as in `wait`.
        let rc = unsafe { libc::sem_trywait(self.sem) };
        if rc == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if matches!(err.raw_os_error(), Some(libc::EAGAIN)) {
            return Ok(false);
        }
        Err(ServerError::Semaphore {
            name: self.name,
            source: err,
        })
    }

    /// Increments the semaphore, waking one waiter if any is blocked in `wait`.
    pub fn post(&self) -> Result<()> {
        // SAFETY: as in `wait`.
        let rc = unsafe { libc::sem_post(self.sem) };
        if rc == 0 {
            Ok(())
        } else {
            Err(ServerError::Semaphore {
                name: self.name,
                source: io::Error::last_os_error(),
            })
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: closes this process's handle only; does not affect other attachers.
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

/// Removes a named semaphore from the system. Call once, from the master, during shutdown;
/// any process still holding it open via `sem_open` keeps working until it closes its handle.
pub fn unlink(name: &str) {
    if let Ok(c_name) = CString::new(name) {
        // SAFETY: best-effort teardown; a failed unlink (e.g. already removed) is not fatal.
        unsafe {
            libc::sem_unlink(c_name.as_ptr());
        }
    }
}
