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

//! Cross-process primitives: named shared memory, named semaphores, and descriptor passing.

pub mod fd_channel;
pub mod semaphore;
pub mod shared;

pub use fd_channel::{channel_pair, ChannelEnd};
pub use semaphore::NamedSemaphore;
pub use shared::SharedRegion;
