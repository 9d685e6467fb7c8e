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

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms, unused_imports)]
#![allow(dead_code)]

//! A concurrent static-file HTTP/1.1 server: one acceptor process distributing connections
//! to a fixed pool of worker processes over file-descriptor-passing channels, each worker
//! running an internal thread pool backed by a per-worker LRU file cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod ipc;
pub mod logwriter;
pub mod master;
pub mod pool;
pub mod queue;
pub mod signals;
pub mod stats;
pub mod worker;
