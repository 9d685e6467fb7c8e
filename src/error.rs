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

//! The error type shared across the server's subsystems.

use thiserror::Error;

/// Errors that can surface from the master process, a worker, or the stats-reader utility.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or configure the listening socket.
    #[error("failed to bind listening socket: {0}")]
    Bind(#[source] std::io::Error),

    /// Failed to create or attach the named shared memory region.
    #[error("shared memory error: {0}")]
    SharedMemory(String),

    /// Failed to open, wait on, or post a named semaphore.
    #[error("semaphore '{name}' error: {source}")]
    Semaphore {
        /// The POSIX name of the semaphore, e.g. `"/staticd_queue_mutex"`.
        name: &'static str,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to fork a worker process.
    #[error("failed to fork worker: {0}")]
    Fork(#[source] nix::errno::Errno),

    /// Failed to create or use a worker's descriptor-passing channel.
    #[error("worker channel error: {0}")]
    Channel(#[source] nix::errno::Errno),

    /// The worker's channel to the master is gone; the worker should shut down.
    #[error("master channel closed")]
    ChannelClosed,

    /// A generic I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The access log could not be written or rotated.
    #[error("access log error: {0}")]
    Log(String),

    /// The configuration file could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A `Result` defaulting to [`ServerError`].
pub type Result<T> = std::result::Result<T, ServerError>;
