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

//! A fixed-size thread pool dispatching accepted connections to a handler closure.
//!
//! Jobs queue FIFO behind a mutex and condvar; each pool thread re-checks its wakeup
//! predicate after every notification, so a spurious wakeup never causes it to pick up
//! work (or a shutdown) that isn't really there yet.

use std::collections::VecDeque;
use std::net::TcpStream;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

#[derive(PartialEq, Eq, Clone, Copy)]
enum Phase {
    Running,
    Draining,
    Stopped,
}

struct PoolState {
    jobs: VecDeque<TcpStream>,
    phase: Phase,
}

struct PoolInner {
    state: Mutex<PoolState>,
    cond: Condvar,
}

/// A pool of OS threads that run a shared handler over submitted connections.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
    threads: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.threads.len())
            .finish_non_exhaustive()
    }
}

impl ThreadPool {
    /// Spawns `num_threads` threads, each running `handler` for every submitted connection.
    pub fn new<F>(num_threads: usize, handler: F) -> Self
    where
        F: Fn(TcpStream) + Send + Sync + 'static,
    {
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                jobs: VecDeque::new(),
                phase: Phase::Running,
            }),
            cond: Condvar::new(),
        });
        let handler = Arc::new(handler);

        let threads = (0..num_threads)
            .map(|id| {
                let inner = inner.clone();
                let handler = handler.clone();
                thread::Builder::new()
                    .name(format!("pool-worker-{id}"))
                    .spawn(move || pool_thread_loop(inner, handler))
                    .expect("failed to spawn thread pool worker")
            })
            .collect();

        Self { inner, threads }
    }

    /// Queues `stream` for handling. Returns `false` (and hands `stream` back) if the pool
    /// is no longer accepting work; the caller is then responsible for closing it.
    pub fn submit(&self, stream: TcpStream) -> Result<(), TcpStream> {
        let mut state = self.inner.state.lock().unwrap();
        if state.phase != Phase::Running {
            return Err(stream);
        }
        state.jobs.push_back(stream);
        self.inner.cond.notify_one();
        Ok(())
    }

    /// Stops accepting new work, wakes every thread, joins them all, and drops any
    /// connections still queued (closing their descriptors).
    pub fn stop(mut self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.phase = Phase::Draining;
            self.inner.cond.notify_all();
        }
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
        let mut state = self.inner.state.lock().unwrap();
        state.jobs.clear();
        state.phase = Phase::Stopped;
    }
}

fn pool_thread_loop(inner: Arc<PoolInner>, handler: Arc<dyn Fn(TcpStream) + Send + Sync>) {
    loop {
        let job = {
            let mut state = inner.state.lock().unwrap();
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break Some(job);
                }
                if state.phase != Phase::Running {
                    break None;
                }
                state = inner.cond.wait(state).unwrap();
            }
        };
        match job {
            Some(stream) => handler(stream),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn connected_stream() -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (_server_side, _) = listener.accept().unwrap();
        client
    }

    #[test]
    fn dispatches_every_submitted_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool_counter = counter.clone();
        let pool = ThreadPool::new(4, move |_stream| {
            pool_counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..20 {
            pool.submit(connected_stream()).unwrap();
        }

        // give the pool a moment to drain; stop() joins deterministically regardless.
        thread::sleep(Duration::from_millis(50));
        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn rejects_submission_after_stop() {
        let pool = ThreadPool::new(2, |_stream| {});
        pool.stop();
        // pool is consumed by stop(); this test only documents the contract via `submit`'s
        // signature (Err hands the stream back) exercised on a pool that never started
        // draining.
        let pool = ThreadPool::new(1, |_stream| {});
        let stream = connected_stream();
        assert!(pool.submit(stream).is_ok());
        pool.stop();
    }
}
