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

//! Cooperative shutdown and the periodic statistics timer.
//!
//! Signal handlers here do nothing but flip an atomic flag (via `signal_hook`, which
//! installs the actual handler); every blocking wait elsewhere in the server either
//! observes that flag directly or treats interruption as a cue to re-check it. There is
//! deliberately no `SIGALRM`-driven stats printer: the periodic print runs on an ordinary
//! background thread instead, keeping "signal handlers only touch a flag" uniform across
//! the whole process.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::warn;

use crate::stats::Stats;

/// Registers `SIGTERM` and `SIGINT` handlers that set the returned flag to `true`.
///
/// Every accept/dispatch loop in the master and workers should treat this flag as the
/// sole source of truth for "please shut down".
pub fn install_shutdown_flag() -> io::Result<Arc<AtomicBool>> {
    let terminate = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, terminate.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, terminate.clone())?;
    Ok(terminate)
}

/// Spawns a background thread that prints the shared statistics every `interval`, checking
/// the shutdown flag every second so it does not delay process exit by a full interval.
pub fn spawn_stats_timer(
    stats: Arc<Stats>,
    terminate: Arc<AtomicBool>,
    interval: Duration,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("stats-timer".into())
        .spawn(move || {
            let tick = Duration::from_secs(1);
            let mut elapsed = Duration::ZERO;
            while !terminate.load(Ordering::SeqCst) {
                thread::sleep(tick);
                elapsed += tick;
                if elapsed < interval {
                    continue;
                }
                elapsed = Duration::ZERO;
                if let Err(err) = stats.print(&mut io::stderr()) {
                    warn!("periodic stats print failed: {err}");
                }
            }
        })
        .expect("failed to spawn stats timer thread")
}
