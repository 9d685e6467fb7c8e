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

//! The master process: binds the listening socket, creates the shared admission queue
//! and per-worker channels before forking, then accepts connections and round-robins
//! them to workers for the life of the process.

use std::net::TcpListener;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use nix::sys::wait::waitpid;
use nix::unistd::{close, fork, ForkResult, Pid};
use staticd_proto::{response, status::Status};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::ipc::{channel_pair, semaphore, ChannelEnd, SharedRegion};
use crate::logwriter::LOG_MUTEX_SEM;
use crate::queue::{AdmissionQueue, EMPTY_SEM, FILLED_SEM, QUEUE_MUTEX_SEM};
use crate::signals;
use crate::stats::{Stats, STATS_MUTEX_SEM};

/// A worker this master forked, and the channel used to hand it descriptors.
struct WorkerHandle {
    pid: Pid,
    channel: ChannelEnd,
}

/// Runs the master for the lifetime of the process: binds, forks `config.num_workers`
/// workers, accepts connections until a shutdown signal arrives, then tears everything
/// down in reverse order.
pub fn run(config: ServerConfig) -> Result<()> {
    let terminate = signals::install_shutdown_flag()?;

    let listener = TcpListener::bind(("0.0.0.0", config.port)).map_err(ServerError::Bind)?;
    info!("listening on 0.0.0.0:{}", config.port);

    let region = Arc::new(SharedRegion::create(config.max_queue_size)?);
    let queue = AdmissionQueue::create(region.clone(), config.max_queue_size)?;
    let stats = Arc::new(Stats::new(region.clone())?);

    let mut workers = Vec::with_capacity(config.num_workers);
    for id in 0..config.num_workers {
        let (master_end, worker_end) = channel_pair()?;

        // SAFETY: no other threads hold locks or file descriptors this process cares about
        // keeping private across the fork; the child immediately either execs into worker
        // logic or exits, never returning to arbitrary master code.
        match unsafe { fork() }.map_err(ServerError::Fork)? {
            ForkResult::Parent { child } => {
                // the worker's end of its own channel is only needed in the child.
                drop(worker_end);
                workers.push(WorkerHandle {
                    pid: child,
                    channel: master_end,
                });
            }
            ForkResult::Child => {
                drop(master_end);
                drop(listener);
                // `fork` duplicated every already-forked sibling's master-end descriptor
                // into this child's fd table; this worker owns none of them, and leaving
                // them open here would keep those channels' master ends alive from the
                // kernel's perspective even after the real master closes its own copies,
                // defeating close-driven EOF shutdown for every earlier worker. `exit`
                // below never unwinds, so these raw closes are the only chance to do it.
                for sibling in &workers {
                    let _ = close(sibling.channel.as_raw_fd());
                }
                let code = run_worker_child(id, worker_end, queue.clone(), config.clone(), terminate.clone());
                std::process::exit(code);
            }
        }
    }

    info!("forked {} worker(s)", workers.len());

    let stats_timer = signals::spawn_stats_timer(stats.clone(), terminate.clone(), Duration::from_secs(30));

    accept_loop(&listener, &queue, &workers, &terminate);

    info!("shutting down");
    shutdown(listener, workers, region);
    let _ = stats_timer.join();
    Ok(())
}

fn run_worker_child(
    id: usize,
    channel: ChannelEnd,
    queue: AdmissionQueue,
    config: ServerConfig,
    terminate: Arc<AtomicBool>,
) -> i32 {
    // Each process needs its own logging subscriber; `env_logger` is process-global state
    // that does not survive (and should not be shared across) a fork.
    env_logger::init();
    match crate::worker::run(id, channel, queue, config, terminate) {
        Ok(()) => 0,
        Err(err) => {
            error!("worker {id}: fatal error: {err}");
            1
        }
    }
}

fn accept_loop(
    listener: &TcpListener,
    queue: &AdmissionQueue,
    workers: &[WorkerHandle],
    terminate: &AtomicBool,
) {
    let mut round_robin = 0usize;
    while !terminate.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                if terminate.load(Ordering::SeqCst) {
                    break;
                }
                warn!("accept failed: {err}");
                continue;
            }
        };

        match queue.try_admit() {
            Ok(true) => {}
            Ok(false) => {
                warn!("admission queue full, rejecting connection from {peer}");
                let mut stream = stream;
                if let Err(err) = response::write_error(&mut stream, Status::ServiceUnavailable, None) {
                    warn!("failed writing 503 to {peer}: {err}");
                }
                drop(stream);
                continue;
            }
            Err(err) => {
                error!("admission queue error: {err}");
                drop(stream);
                continue;
            }
        }

        let selected = round_robin;
        let worker = &workers[selected];
        round_robin = (round_robin + 1) % workers.len();

        if let Err(err) = worker.channel.send_fd(stream.as_raw_fd()) {
            error!("failed handing connection from {peer} to worker {selected}: {err}");
        }
        // The master's copy closes here regardless of success; the worker now owns (or
        // never received, in the error case) the only remaining reference.
        drop(stream);
    }
}

fn shutdown(listener: TcpListener, workers: Vec<WorkerHandle>, region: Arc<SharedRegion>) {
    drop(listener);

    // Closing each channel (by dropping it) is itself a shutdown signal: the worker's
    // `recv_fd` sees a closed peer and exits its dispatch loop. `SIGTERM` as well, matching
    // the original design's belt-and-suspenders shutdown.
    let pids: Vec<Pid> = workers.iter().map(|w| w.pid).collect();
    for worker in workers {
        drop(worker.channel);
    }
    for pid in &pids {
        if let Err(err) = nix::sys::signal::kill(*pid, nix::sys::signal::Signal::SIGTERM) {
            warn!("failed to signal worker {pid}: {err}");
        }
    }
    for pid in pids {
        if let Err(err) = waitpid(pid, None) {
            warn!("failed to reap worker {pid}: {err}");
        }
    }

    // Every worker has exited, so no process still holds one of these open; remove them
    // from the system rather than leaving a stale named semaphore for the next run to
    // inherit an unexpected initial value from.
    for name in [EMPTY_SEM, FILLED_SEM, QUEUE_MUTEX_SEM, STATS_MUTEX_SEM, LOG_MUTEX_SEM] {
        semaphore::unlink(name);
    }

    drop(region);
}
