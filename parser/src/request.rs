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

//! HTTP/1.1 request-line and header parsing.
//!
//! The collaborator is line-oriented and zero-copy: every `&str` in a parsed [`Request`]
//! borrows from the caller's receive buffer. It does not attempt to support chunked transfer
//! encoding, trailers, or a request body, since the server only ever serves `GET`/`HEAD`.

use crate::error::ParseError;
use crate::method::Method;
use crate::range::ByteRange;
use crate::version::Version;

/// A parsed HTTP/1.1 request line plus the headers this server cares about.
#[derive(Debug)]
pub struct Request<'a> {
    /// The request method.
    pub method: Method,
    /// The request target, always starting with `/`. Never percent-decoded.
    pub target: &'a str,
    /// The declared HTTP version.
    pub version: Version,
    /// The parsed `Range` header, if present and well-formed.
    ///
    /// A `Range` header that fails to parse is treated as absent rather than as a parse
    /// error for the whole request, matching how most servers ignore a malformed range.
    pub range: Option<ByteRange>,
}

impl<'a> Request<'a> {
    /// Parses a request out of `buf`, which must contain at least the full request line and
    /// header block (i.e. up through the blank line terminating the headers).
    ///
    /// # Example
    /// ```
    /// # use staticd_proto::request::Request;
    /// # use staticd_proto::method::Method;
    /// let req = Request::parse(b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
    /// assert_eq!(req.method, Method::Get);
    /// assert_eq!(req.target, "/index.html");
    /// ```
    pub fn parse(buf: &'a [u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(buf).map_err(|_| ParseError::RequestLine)?;
        let mut lines = text.split("\r\n");
        let request_line = lines.next().ok_or(ParseError::RequestLine)?;

        let mut parts = request_line.split(' ');
        let method = parts.next().ok_or(ParseError::RequestLine)?;
        let target = parts.next().ok_or(ParseError::RequestLine)?;
        let version = parts.next().ok_or(ParseError::RequestLine)?;
        if parts.next().is_some() {
            return Err(ParseError::RequestLine);
        }

        let method = Method::from_bytes(method.as_bytes()).ok_or(ParseError::Method)?;
        if !target.starts_with('/') {
            return Err(ParseError::Target);
        }
        let version = Version::from_bytes(version.as_bytes()).ok_or(ParseError::Version)?;

        let mut range = None;
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or(ParseError::Header)?;
            if name.trim().eq_ignore_ascii_case("range") {
                range = ByteRange::parse(value.trim()).ok();
            }
        }

        Ok(Self {
            method,
            target,
            version,
            range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let req = Request::parse(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.target, "/");
        assert_eq!(req.version, Version::H1_1);
        assert!(req.range.is_none());
    }

    #[test]
    fn parses_range_header() {
        let req =
            Request::parse(b"GET /movie.mp4 HTTP/1.1\r\nRange: bytes=0-499\r\n\r\n").unwrap();
        assert!(req.range.is_some());
    }

    #[test]
    fn rejects_target_without_leading_slash() {
        let err = Request::parse(b"GET index.html HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(err, ParseError::Target);
    }

    #[test]
    fn rejects_unknown_version() {
        let err = Request::parse(b"GET / HTTP/2.0\r\n\r\n").unwrap_err();
        assert_eq!(err, ParseError::Version);
    }

    #[test]
    fn malformed_range_is_ignored_not_rejected() {
        let req = Request::parse(b"GET / HTTP/1.1\r\nRange: nonsense\r\n\r\n").unwrap();
        assert!(req.range.is_none());
    }
}
