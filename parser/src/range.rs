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

//! Single-range `Range: bytes=...` parsing, per RFC 9110 §14.

use crate::error::ParseError;

/// A parsed `bytes=first-last` range, with either bound possibly absent.
///
/// Only the single-range form is understood; a `Range` header naming more than one
/// range is rejected by [`ByteRange::parse`] with [`ParseError::Range`], which the
/// caller should treat the same as if no `Range` header had been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    first: Option<u64>,
    last: Option<u64>,
}

/// Why a range, though syntactically valid, does not apply to a resource of a given length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsatisfiable;

impl ByteRange {
    /// Parses the value of a `Range` header, e.g. `bytes=0-499` or `bytes=500-`.
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let suffix = value.trim().strip_prefix("bytes=").ok_or(ParseError::Range)?;
        let (first, last) = suffix.split_once('-').ok_or(ParseError::Range)?;
        if first.contains(',') || last.contains(',') {
            return Err(ParseError::Range);
        }
        let first = if first.is_empty() {
            None
        } else {
            Some(first.parse::<u64>().map_err(|_| ParseError::Range)?)
        };
        let last = if last.is_empty() {
            None
        } else {
            Some(last.parse::<u64>().map_err(|_| ParseError::Range)?)
        };
        if first.is_none() && last.is_none() {
            return Err(ParseError::Range);
        }
        Ok(Self { first, last })
    }

    /// Resolves this range against a resource of `len` bytes, returning the inclusive
    /// `(first, last)` byte offsets to serve, or [`Unsatisfiable`] if the range is out of bounds.
    ///
    /// A suffix range (`bytes=-500`, i.e. `first` absent) asks for the last `last` bytes.
    pub fn resolve(&self, len: usize) -> Result<(usize, usize), Unsatisfiable> {
        if len == 0 {
            return Err(Unsatisfiable);
        }
        let len = len as u64;
        let (first, last) = match (self.first, self.last) {
            (Some(first), Some(last)) => (first, last.min(len - 1)),
            (Some(first), None) => (first, len - 1),
            (None, Some(suffix_len)) => {
                if suffix_len == 0 {
                    return Err(Unsatisfiable);
                }
                let suffix_len = suffix_len.min(len);
                (len - suffix_len, len - 1)
            }
            (None, None) => unreachable!("ByteRange::parse never produces an empty range"),
        };
        if first >= len || first > last {
            return Err(Unsatisfiable);
        }
        Ok((first as usize, last as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_closed_range() {
        let range = ByteRange::parse("bytes=0-499").unwrap();
        assert_eq!(range.resolve(1000), Ok((0, 499)));
    }

    #[test]
    fn parses_open_ended_range() {
        let range = ByteRange::parse("bytes=500-").unwrap();
        assert_eq!(range.resolve(1000), Ok((500, 999)));
    }

    #[test]
    fn parses_suffix_range() {
        let range = ByteRange::parse("bytes=-100").unwrap();
        assert_eq!(range.resolve(1000), Ok((900, 999)));
    }

    #[test]
    fn clamps_last_to_resource_length() {
        let range = ByteRange::parse("bytes=0-999999").unwrap();
        assert_eq!(range.resolve(1000), Ok((0, 999)));
    }

    #[test]
    fn rejects_range_beyond_resource() {
        let range = ByteRange::parse("bytes=1000-2000").unwrap();
        assert_eq!(range.resolve(1000), Err(Unsatisfiable));
    }

    #[test]
    fn rejects_multi_range() {
        assert_eq!(ByteRange::parse("bytes=0-1,2-3"), Err(ParseError::Range));
    }

    #[test]
    fn rejects_empty_spec() {
        assert_eq!(ByteRange::parse("bytes=-"), Err(ParseError::Range));
    }
}
