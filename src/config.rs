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

//! `KEY=VALUE` configuration file parsing.
//!
//! This is a hand-rolled format rather than a delegated one (no `toml`/`serde` here):
//! the format itself, not just its contents, is part of what this server is.

use std::path::{Path, PathBuf};

use log::warn;

/// Typed view of the server's configuration, with built-in defaults for every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP port to bind.
    pub port: u16,
    /// File-system root prepended to request paths.
    pub document_root: PathBuf,
    /// Number of worker processes.
    pub num_workers: usize,
    /// Size of each worker's thread pool.
    pub threads_per_worker: usize,
    /// Admission-queue capacity.
    pub max_queue_size: usize,
    /// Access-log path.
    pub log_file: PathBuf,
    /// Cache capacity, in megabytes, divided evenly across workers.
    pub cache_size_mb: usize,
    /// Declared but not consumed by the core; see the design notes.
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            document_root: PathBuf::from("www"),
            num_workers: 2,
            threads_per_worker: 10,
            max_queue_size: 100,
            log_file: PathBuf::from("logs/access.log"),
            cache_size_mb: 64,
            timeout_seconds: 30,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from `path`, falling back to [`ServerConfig::default`] for any
    /// key that is absent, and to all defaults if `path` cannot be read at all.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    "could not read config file {}: {err}; using defaults",
                    path.display()
                );
                return Self::default();
            }
        };

        let mut config = Self::default();
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("{}:{}: ignoring malformed line", path.display(), lineno + 1);
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "PORT" => config.port = parse_or_warn(path, lineno, key, value, config.port),
                "DOCUMENT_ROOT" => config.document_root = PathBuf::from(value),
                "NUM_WORKERS" => {
                    config.num_workers = parse_or_warn(path, lineno, key, value, config.num_workers)
                }
                "THREADS_PER_WORKER" => {
                    config.threads_per_worker =
                        parse_or_warn(path, lineno, key, value, config.threads_per_worker)
                }
                "MAX_QUEUE_SIZE" => {
                    config.max_queue_size =
                        parse_or_warn(path, lineno, key, value, config.max_queue_size)
                }
                "LOG_FILE" => config.log_file = PathBuf::from(value),
                "CACHE_SIZE_MB" => {
                    config.cache_size_mb =
                        parse_or_warn(path, lineno, key, value, config.cache_size_mb)
                }
                "TIMEOUT_SECONDS" => {
                    config.timeout_seconds =
                        parse_or_warn(path, lineno, key, value, config.timeout_seconds)
                }
                other => warn!("{}:{}: unknown key '{other}', ignoring", path.display(), lineno + 1),
            }
        }
        config
    }

    /// The per-worker cache capacity in bytes: `cache_size_mb` divided across `num_workers`,
    /// with a 1 MiB floor.
    pub fn per_worker_cache_bytes(&self) -> usize {
        const MIB: usize = 1024 * 1024;
        let total = self.cache_size_mb.saturating_mul(MIB);
        let workers = self.num_workers.max(1);
        (total / workers).max(MIB)
    }
}

fn parse_or_warn<T>(path: &Path, lineno: usize, key: &str, value: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    value.parse().unwrap_or_else(|_| {
        warn!(
            "{}:{}: invalid value for {key} ('{value}'), keeping default",
            path.display(),
            lineno + 1
        );
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = ServerConfig::load(Path::new("/nonexistent/path/to/config"));
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn parses_recognized_keys_and_ignores_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# comment\nPORT=9090\nNUM_WORKERS=4\n\nDOCUMENT_ROOT=/srv/www\nUNKNOWN=ignored\n"
        )
        .unwrap();

        let config = ServerConfig::load(file.path());
        assert_eq!(config.port, 9090);
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.document_root, PathBuf::from("/srv/www"));
        // untouched keys still fall back to defaults
        assert_eq!(config.threads_per_worker, 10);
    }

    #[test]
    fn invalid_value_falls_back_to_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "PORT=not-a-number").unwrap();
        let config = ServerConfig::load(file.path());
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn per_worker_cache_bytes_has_a_one_mebibyte_floor() {
        let mut config = ServerConfig::default();
        config.cache_size_mb = 1;
        config.num_workers = 8;
        assert_eq!(config.per_worker_cache_bytes(), 1024 * 1024);
    }
}
