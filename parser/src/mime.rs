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

//! Extension-based MIME type lookup.

/// Default MIME type for an extension this table does not recognize.
pub const DEFAULT: &str = "application/octet-stream";

const TABLE: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("xml", "application/xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("webp", "image/webp"),
    ("pdf", "application/pdf"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mp3", "audio/mpeg"),
    ("wasm", "application/wasm"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
];

/// Looks up the MIME type for `path` by its extension, falling back to [`DEFAULT`].
pub fn lookup(path: &str) -> &'static str {
    let Some(ext) = path.rsplit('.').next() else {
        return DEFAULT;
    };
    if ext == path {
        // no '.' in the path at all
        return DEFAULT;
    }
    let ext_lower = ext.to_ascii_lowercase();
    TABLE
        .iter()
        .find(|(key, _)| *key == ext_lower)
        .map(|(_, value)| *value)
        .unwrap_or(DEFAULT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_known_extension() {
        assert_eq!(lookup("/index.html"), "text/html");
        assert_eq!(lookup("/archive.TAR.GZ".to_lowercase().as_str()), DEFAULT);
    }

    #[test]
    fn falls_back_for_unknown_extension() {
        assert_eq!(lookup("/data.xyz"), DEFAULT);
        assert_eq!(lookup("/no-extension"), DEFAULT);
    }
}
