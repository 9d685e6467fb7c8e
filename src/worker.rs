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

//! The worker process: a dispatch loop pairing admission-queue slots with descriptors
//! received from the master, and the per-connection request handler running inside the
//! worker's thread pool.

use std::io::Read;
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};

use staticd_proto::status::Status;
use staticd_proto::{mime, range::Unsatisfiable, request::Request, response};

use crate::cache::Cache;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::ipc::ChannelEnd;
use crate::logwriter::LogWriter;
use crate::pool::ThreadPool;
use crate::queue::AdmissionQueue;
use crate::stats::Stats;

const MAX_REQUEST_HEAD_BYTES: usize = 64 * 1024;

struct WorkerContext {
    id: usize,
    docroot: PathBuf,
    cache: Cache,
    log: LogWriter,
    stats: Stats,
}

/// Runs one worker: opens this worker's cache and log, starts its thread pool, then loops
/// pairing an admission-queue slot with a received descriptor until told to shut down.
///
/// For every `take()` from the admission queue, exactly one `recv_fd()` is attempted; the
/// result is either submitted to the pool or dropped (closing it), so the queue and the
/// channel never drift out of lockstep.
pub fn run(
    id: usize,
    channel: ChannelEnd,
    queue: AdmissionQueue,
    config: ServerConfig,
    terminate: Arc<AtomicBool>,
) -> Result<()> {
    let cache_bytes = config.per_worker_cache_bytes();
    let context = Arc::new(WorkerContext {
        id,
        docroot: config.document_root.clone(),
        cache: Cache::new(cache_bytes),
        log: LogWriter::open(&config.log_file)?,
        stats: Stats::new(queue.region())?,
    });

    info!(
        "worker {id}: ready (cache={cache_bytes} bytes, docroot={})",
        context.docroot.display()
    );

    let pool_context = context.clone();
    let pool = ThreadPool::new(config.threads_per_worker, move |stream| {
        handle_connection(&pool_context, stream);
    });

    while !terminate.load(Ordering::SeqCst) {
        match queue.take(&terminate) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                error!("worker {id}: admission queue error: {err}");
                continue;
            }
        }

        match channel.recv_fd() {
            Ok(fd) => {
                // SAFETY: `fd` was just received via SCM_RIGHTS and is uniquely owned here.
                let stream = unsafe { ChannelEnd::fd_into_tcp_stream(fd) };
                if pool.submit(stream).is_err() {
                    warn!("worker {id}: thread pool not accepting work, dropping connection");
                }
            }
            Err(crate::error::ServerError::ChannelClosed) => {
                info!("worker {id}: master channel closed, shutting down");
                break;
            }
            Err(err) => {
                if !terminate.load(Ordering::SeqCst) {
                    warn!("worker {id}: transient error receiving descriptor: {err}");
                }
            }
        }
    }

    info!("worker {id}: draining thread pool");
    pool.stop();
    context.log.close()?;
    Ok(())
}

struct RequestOutcome {
    status: u16,
    bytes_sent: u64,
    method: String,
    path: String,
}

fn handle_connection(ctx: &WorkerContext, mut stream: TcpStream) {
    let start = Instant::now();
    let peer_ip = stream
        .peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string());

    if let Err(err) = ctx.stats.set_active_delta(1) {
        warn!("worker {}: failed to bump active_connections: {err}", ctx.id);
    }

    let outcome = serve_request(ctx, &mut stream, &peer_ip);

    if let Err(err) = ctx.stats.set_active_delta(-1) {
        warn!("worker {}: failed to drop active_connections: {err}", ctx.id);
    }

    let duration_ms = start.elapsed().as_millis();
    if let Err(err) = ctx
        .stats
        .record_request(outcome.status, outcome.bytes_sent, duration_ms as i64)
    {
        warn!("worker {}: failed to update stats: {err}", ctx.id);
    }
    if let Err(err) = ctx.log.write_entry(
        &peer_ip,
        &outcome.method,
        &outcome.path,
        outcome.status,
        outcome.bytes_sent,
        duration_ms,
    ) {
        warn!("worker {}: failed to write access log entry: {err}", ctx.id);
    }
}

fn serve_request(ctx: &WorkerContext, stream: &mut TcpStream, peer_ip: &str) -> RequestOutcome {
    let mut buf = Vec::with_capacity(8192);
    if let Err(err) = read_request_head(stream, &mut buf) {
        debug!("worker {}: reading request from {peer_ip}: {err}", ctx.id);
        return respond_error(stream, Status::BadRequest, "-", "-");
    }

    let request = match Request::parse(&buf) {
        Ok(request) => request,
        Err(_) => return respond_error(stream, Status::BadRequest, "-", "-"),
    };
    let method_str = request.method.to_string();

    if request.method != staticd_proto::method::Method::Get
        && request.method != staticd_proto::method::Method::Head
    {
        return respond_error(stream, Status::MethodNotAllowed, &method_str, request.target);
    }

    if has_traversal_segment(request.target) {
        return respond_error(stream, Status::Forbidden, &method_str, request.target);
    }

    let resolved: &str = if request.target == "/" {
        "/index.html"
    } else {
        request.target
    };
    let absolute = ctx.docroot.join(resolved.trim_start_matches('/'));

    let handle = match ctx.cache.pin_or_load(resolved, &absolute) {
        Ok(handle) => handle,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return respond_error(stream, Status::NotFound, &method_str, resolved);
        }
        Err(err) => {
            warn!("worker {}: reading {}: {err}", ctx.id, absolute.display());
            return respond_error(stream, Status::InternalServerError, &method_str, resolved);
        }
    };

    let body = handle.bytes();
    let content_type = mime::lookup(resolved);
    let send_body = request.method == staticd_proto::method::Method::Get;

    let write_result = match request.range {
        Some(byte_range) => match byte_range.resolve(body.len()) {
            Ok((first, last)) => response::write_partial(
                stream,
                content_type,
                &body[first..=last],
                first,
                last,
                body.len(),
                send_body,
            ),
            Err(Unsatisfiable) => {
                response::write_error(stream, Status::RangeNotSatisfiable, Some(body.len()))
            }
        },
        None => response::write_full(stream, Status::Ok, content_type, body, send_body),
    };

    match write_result {
        Ok((status, bytes_sent)) => RequestOutcome {
            status,
            bytes_sent,
            method: method_str,
            path: resolved.to_string(),
        },
        Err(err) => {
            debug!("worker {}: writing response to {peer_ip}: {err}", ctx.id);
            RequestOutcome {
                status: 0,
                bytes_sent: 0,
                method: method_str,
                path: resolved.to_string(),
            }
        }
    }
    // `handle` drops here on every path through this function, unpinning its cache entry
    // exactly once.
}

fn respond_error(stream: &mut TcpStream, status: Status, method: &str, path: &str) -> RequestOutcome {
    let bytes_sent = response::write_error(stream, status, None)
        .map(|(_, n)| n)
        .unwrap_or(0);
    RequestOutcome {
        status: status.code(),
        bytes_sent,
        method: method.to_string(),
        path: path.to_string(),
    }
}

fn read_request_head(stream: &mut TcpStream, buf: &mut Vec<u8>) -> std::io::Result<()> {
    let mut chunk = [0u8; 4096];
    loop {
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            return Ok(());
        }
        if buf.len() >= MAX_REQUEST_HEAD_BYTES {
            // Buffer exhausted without a full header block; hand back what we have and
            // let the parser reject it.
            return Ok(());
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before a full request was received",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn has_traversal_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_traversal_segments() {
        assert!(has_traversal_segment("/../etc/passwd"));
        assert!(has_traversal_segment("/a/../../b"));
        assert!(!has_traversal_segment("/a/b.html"));
        assert!(!has_traversal_segment("/..hidden"));
    }
}
