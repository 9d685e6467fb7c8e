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

//! Response building: full bodies, single-range partial bodies, and error pages.
//!
//! Every connection is answered with `Connection: close`; this server never does
//! keep-alive, so there is no need to track it on the response side either.

use std::io::{self, Write};

use chrono::Utc;

use crate::status::Status;

const SERVER_HEADER: &str = concat!("staticd/", env!("CARGO_PKG_VERSION"));

fn write_status_line<W: Write>(w: &mut W, status: Status) -> io::Result<()> {
    write!(w, "HTTP/1.1 {}\r\n", status)
}

fn write_common_headers<W: Write>(w: &mut W) -> io::Result<()> {
    write!(
        w,
        "Date: {}\r\nServer: {}\r\nConnection: close\r\n",
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT"),
        SERVER_HEADER,
    )
}

/// Writes a full (non-ranged) response and returns the number of body bytes sent.
pub fn write_full<W: Write>(
    w: &mut W,
    status: Status,
    content_type: &str,
    body: &[u8],
    include_body: bool,
) -> io::Result<(u16, u64)> {
    write_status_line(w, status)?;
    write_common_headers(w)?;
    write!(
        w,
        "Content-Type: {}\r\nContent-Length: {}\r\n\r\n",
        content_type,
        body.len()
    )?;
    if include_body {
        w.write_all(body)?;
    }
    Ok((status.code(), body.len() as u64))
}

/// Writes a `206 Partial Content` response for the inclusive range `[first, last]` of a
/// resource whose full length is `total_len`, and returns the number of body bytes sent.
#[allow(clippy::too_many_arguments)]
pub fn write_partial<W: Write>(
    w: &mut W,
    content_type: &str,
    range_body: &[u8],
    first: usize,
    last: usize,
    total_len: usize,
    include_body: bool,
) -> io::Result<(u16, u64)> {
    write_status_line(w, Status::PartialContent)?;
    write_common_headers(w)?;
    write!(
        w,
        "Content-Type: {}\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
        content_type,
        range_body.len(),
        first,
        last,
        total_len,
    )?;
    if include_body {
        w.write_all(range_body)?;
    }
    Ok((Status::PartialContent.code(), range_body.len() as u64))
}

/// Writes a minimal error page for `status` and returns the number of body bytes sent.
///
/// `resource_len`, when given, is reported in the `Content-Range` header of a `416`
/// response, per RFC 9110 §15.5.17.
pub fn write_error<W: Write>(
    w: &mut W,
    status: Status,
    resource_len: Option<usize>,
) -> io::Result<(u16, u64)> {
    let body = format!(
        "<html><head><title>{code} {reason}</title></head>\
         <body><h1>{code} {reason}</h1></body></html>",
        code = status.code(),
        reason = status.reason_phrase(),
    );

    write_status_line(w, status)?;
    write_common_headers(w)?;
    write!(w, "Content-Type: text/html\r\nContent-Length: {}\r\n", body.len())?;
    if status == Status::RangeNotSatisfiable {
        if let Some(len) = resource_len {
            write!(w, "Content-Range: bytes */{}\r\n", len)?;
        }
    }
    write!(w, "\r\n")?;
    w.write_all(body.as_bytes())?;
    Ok((status.code(), body.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_response_includes_content_length_and_body() {
        let mut out = Vec::new();
        let (status, sent) =
            write_full(&mut out, Status::Ok, "text/plain", b"hello", true).unwrap();
        assert_eq!(status, 200);
        assert_eq!(sent, 5);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("hello"));
    }

    #[test]
    fn head_response_omits_body() {
        let mut out = Vec::new();
        write_full(&mut out, Status::Ok, "text/plain", b"hello", false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.ends_with("hello"));
        assert!(text.contains("Content-Length: 5\r\n"));
    }

    #[test]
    fn partial_response_reports_content_range() {
        let mut out = Vec::new();
        let (status, sent) =
            write_partial(&mut out, "video/mp4", b"abc", 0, 2, 100, true).unwrap();
        assert_eq!(status, 206);
        assert_eq!(sent, 3);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Range: bytes 0-2/100\r\n"));
    }

    #[test]
    fn error_response_is_html() {
        let mut out = Vec::new();
        write_error(&mut out, Status::NotFound, None).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
    }
}
