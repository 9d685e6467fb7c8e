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

//! Shared, cross-process request counters.

use std::io::Write;
use std::sync::Arc;

use crate::error::Result;
use crate::ipc::{NamedSemaphore, SharedRegion};

pub(crate) const STATS_MUTEX_SEM: &str = "/staticd_stats_mutex";

/// A consistent snapshot of the shared counters, taken under the stats mutex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests served since startup.
    pub total_requests: i64,
    /// Response body bytes sent since startup.
    pub bytes_transferred: i64,
    /// Count of `200` responses.
    pub status_200: i64,
    /// Count of `404` responses.
    pub status_404: i64,
    /// Count of `500` responses.
    pub status_500: i64,
    /// Connections currently being served.
    pub active_connections: i64,
    /// Sum of per-request handling durations, in milliseconds.
    pub total_response_time_ms: i64,
}

impl StatsSnapshot {
    /// Mean response time across all recorded requests, or `0.0` if none have been recorded.
    pub fn avg_response_time_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_response_time_ms as f64 / self.total_requests as f64
        }
    }
}

/// A handle to the shared statistics counters.
#[derive(Debug)]
pub struct Stats {
    region: Arc<SharedRegion>,
    mutex: NamedSemaphore,
}

impl Stats {
    /// Builds a `Stats` handle over an already-initialized shared region (created by the
    /// master before fork, or attached to by name via [`Stats::attach`]).
    pub fn new(region: Arc<SharedRegion>) -> Result<Self> {
        let mutex = NamedSemaphore::open(STATS_MUTEX_SEM, 1)?;
        Ok(Self { region, mutex })
    }

    /// Attaches to the shared region by name; used by the stats-reader utility, which is
    /// not a fork child of the master.
    pub fn attach() -> Result<Self> {
        Self::new(Arc::new(SharedRegion::attach()?))
    }

    /// Records one completed request: increments `total_requests`, adds to
    /// `bytes_transferred` and `total_response_time_ms`, and bumps the matching status
    /// family counter, all as one critical section.
    pub fn record_request(&self, status: u16, bytes_sent: u64, duration_ms: i64) -> Result<()> {
        self.mutex.wait()?;
        // SAFETY: `mutex` is held; this is the only field group it protects.
        unsafe {
            let data = self.region.data_mut();
            (*data).stats.total_requests += 1;
            (*data).stats.bytes_transferred += bytes_sent as i64;
            (*data).stats.total_response_time_ms += duration_ms;
            match status {
                200 => (*data).stats.status_200 += 1,
                404 => (*data).stats.status_404 += 1,
                500 => (*data).stats.status_500 += 1,
                _ => {}
            }
        }
        self.mutex.post()
    }

    /// Increments or decrements `active_connections`.
    pub fn set_active_delta(&self, delta: i64) -> Result<()> {
        self.mutex.wait()?;
        // SAFETY: as above.
        unsafe {
            let data = self.region.data_mut();
            (*data).stats.active_connections += delta;
        }
        self.mutex.post()
    }

    /// Takes a consistent snapshot of all counters.
    pub fn snapshot(&self) -> Result<StatsSnapshot> {
        self.mutex.wait()?;
        let snapshot = {
            let data = self.region.data();
            StatsSnapshot {
                total_requests: data.stats.total_requests,
                bytes_transferred: data.stats.bytes_transferred,
                status_200: data.stats.status_200,
                status_404: data.stats.status_404,
                status_500: data.stats.status_500,
                active_connections: data.stats.active_connections,
                total_response_time_ms: data.stats.total_response_time_ms,
            }
        };
        self.mutex.post()?;
        Ok(snapshot)
    }

    /// Prints a human-readable statistics block to `out`, as the periodic stats timer does.
    pub fn print(&self, out: &mut dyn Write) -> Result<()> {
        let snap = self.snapshot()?;
        writeln!(out, "\n--- Server Statistics ---")?;
        writeln!(out, "Total Requests: {}", snap.total_requests)?;
        writeln!(out, "Bytes Transferred: {}", snap.bytes_transferred)?;
        writeln!(
            out,
            "Average Response Time: {:.2} ms",
            snap.avg_response_time_ms()
        )?;
        writeln!(
            out,
            "Status Codes: [200: {}] [404: {}] [500: {}]",
            snap.status_200, snap.status_404, snap.status_500
        )?;
        writeln!(out, "Active Connections: {}", snap.active_connections)?;
        writeln!(out, "-------------------------")?;
        Ok(())
    }
}
