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

//! A standalone utility that attaches to the running server's shared statistics region
//! and prints it as `key=value` lines, without being a child process of the master.

use std::process::ExitCode;

use staticd::stats::Stats;

fn main() -> ExitCode {
    env_logger::init();

    let stats = match Stats::attach() {
        Ok(stats) => stats,
        Err(err) => {
            eprintln!("failed to attach to shared stats region: {err}");
            eprintln!("is the server running?");
            return ExitCode::FAILURE;
        }
    };

    let snapshot = match stats.snapshot() {
        Ok(snapshot) => snapshot,
        Err(err) => {
            eprintln!("failed to read stats: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("total_requests={}", snapshot.total_requests);
    println!("bytes_transferred={}", snapshot.bytes_transferred);
    println!("status_200={}", snapshot.status_200);
    println!("status_404={}", snapshot.status_404);
    println!("status_500={}", snapshot.status_500);
    println!("active_connections={}", snapshot.active_connections);
    println!("total_response_time_ms={}", snapshot.total_response_time_ms);
    println!(
        "avg_response_time_ms={:.2}",
        snapshot.avg_response_time_ms()
    );

    ExitCode::SUCCESS
}
