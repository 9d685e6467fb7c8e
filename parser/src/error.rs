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

//! Errors produced while parsing a request line or its headers.

/// Reasons a request could not be parsed.
///
/// Every variant maps to a `400 Bad Request` at the call site; the variant only exists to
/// make that decision debuggable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The request line had fewer than three space-separated parts.
    #[error("malformed request line")]
    RequestLine,
    /// The method token is not one this collaborator recognizes.
    #[error("unrecognized method")]
    Method,
    /// The request target did not start with `/`.
    #[error("malformed request target")]
    Target,
    /// The version token was not `HTTP/1.0` or `HTTP/1.1`.
    #[error("unsupported HTTP version")]
    Version,
    /// A header line had no `:` separator.
    #[error("malformed header line")]
    Header,
    /// The `Range` header value was not a single `bytes=` range.
    #[error("malformed Range header")]
    Range,
}
