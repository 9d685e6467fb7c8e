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

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(test(attr(deny(warnings))))]

//! HTTP/1.1 request parsing, response building, range handling, and MIME lookup.
//!
//! This crate is intentionally narrow: it understands exactly as much of HTTP/1.1 as a
//! static file server needs, and nothing else (no chunked encoding, no trailers, no bodies
//! on the request side).

pub mod error;
pub mod method;
pub mod mime;
pub mod range;
pub mod request;
pub mod response;
pub mod status;

pub use error::ParseError;
pub use method::Method;
pub use request::Request;
pub use status::Status;
pub use version::Version;

mod version;
