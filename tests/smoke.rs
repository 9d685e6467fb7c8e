//! End-to-end smoke tests: spawn the real `staticd` binary against a temporary document
//! root and configuration file, then drive it over raw TCP the way a client would.
//!
//! Deliberately a single `#[test]` function: the server binds fixed, process-wide named
//! shared memory and semaphores (`/staticd_shm`, `/staticd_empty`, ...), so two instances
//! running at once inside the same test binary would stomp on each other's state.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

struct ServerProcess {
    child: Child,
    port: u16,
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn spawn_server(docroot: &Path, log_dir: &Path, config_path: &Path) -> ServerProcess {
    let port = free_port();
    std::fs::write(
        config_path,
        format!(
            "PORT={port}\n\
             DOCUMENT_ROOT={}\n\
             NUM_WORKERS=2\n\
             THREADS_PER_WORKER=4\n\
             MAX_QUEUE_SIZE=32\n\
             LOG_FILE={}\n\
             CACHE_SIZE_MB=8\n\
             TIMEOUT_SECONDS=30\n",
            docroot.display(),
            log_dir.join("access.log").display(),
        ),
    )
    .unwrap();

    let child = Command::new(env!("CARGO_BIN_EXE_staticd"))
        .arg(config_path)
        .spawn()
        .expect("failed to spawn staticd");

    let server = ServerProcess { child, port };
    wait_for_listener(server.port);
    server
}

fn wait_for_listener(port: u16) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return;
        }
        if Instant::now() > deadline {
            panic!("server never started listening on port {port}");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn raw_request(port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).ok();
    String::from_utf8_lossy(&response).into_owned()
}

fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or("")
}

#[test]
fn end_to_end_scenarios() {
    let docroot = tempfile::tempdir().unwrap();
    let log_dir = tempfile::tempdir().unwrap();
    let config_file = tempfile::NamedTempFile::new().unwrap();

    std::fs::write(docroot.path().join("index.html"), b"<h1>home</h1>").unwrap();
    std::fs::write(docroot.path().join("hello.txt"), b"hello, world").unwrap();
    let video_bytes: Vec<u8> = (0..1000u32).map(|n| (n % 256) as u8).collect();
    std::fs::write(docroot.path().join("movie.bin"), &video_bytes).unwrap();

    let server = spawn_server(docroot.path(), log_dir.path(), config_file.path());

    // Scenario: GET an existing file serves 200 with the exact bytes.
    let response = raw_request(
        server.port,
        "GET /hello.txt HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(response.ends_with("hello, world"));

    // Scenario: GET "/" maps to index.html.
    let response = raw_request(
        server.port,
        "GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(response.ends_with("<h1>home</h1>"));

    // Scenario: GET a missing file serves 404 without touching the filesystem badly.
    let response = raw_request(
        server.port,
        "GET /does-not-exist.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(status_line(&response), "HTTP/1.1 404 Not Found");

    // Scenario: a single-range request serves 206 with only the requested bytes.
    let response = raw_request(
        server.port,
        "GET /movie.bin HTTP/1.1\r\nHost: localhost\r\nRange: bytes=0-99\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(status_line(&response), "HTTP/1.1 206 Partial Content");
    assert!(response.contains("Content-Range: bytes 0-99/1000"));
    let body_start = response.find("\r\n\r\n").unwrap() + 4;
    let body = response[body_start..].as_bytes();
    assert_eq!(body, &video_bytes[0..100]);

    // Scenario: a range with only a suffix length serves the tail of the resource.
    let response = raw_request(
        server.port,
        "GET /movie.bin HTTP/1.1\r\nHost: localhost\r\nRange: bytes=-10\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(status_line(&response), "HTTP/1.1 206 Partial Content");
    assert!(response.contains("Content-Range: bytes 990-999/1000"));

    // Scenario: an out-of-bounds range is rejected with 416.
    let response = raw_request(
        server.port,
        "GET /movie.bin HTTP/1.1\r\nHost: localhost\r\nRange: bytes=5000-6000\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(status_line(&response), "HTTP/1.1 416 Range Not Satisfiable");

    // Scenario: a parent-directory traversal attempt is forbidden, never touching the fs.
    let response = raw_request(
        server.port,
        "GET /../../../etc/passwd HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(status_line(&response), "HTTP/1.1 403 Forbidden");

    // Scenario: an unsupported method is rejected with 405 rather than attempted.
    let response = raw_request(
        server.port,
        "POST /hello.txt HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(status_line(&response), "HTTP/1.1 405 Method Not Allowed");

    // Scenario: HEAD returns headers sized for the body, but no body bytes.
    let response = raw_request(
        server.port,
        "HEAD /hello.txt HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(response.contains("Content-Length: 12"));
    assert!(!response.ends_with("hello, world"));

    // Scenario: a malformed request line gets 400 rather than a crash.
    let response = raw_request(server.port, "NOT A REQUEST\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 400 Bad Request");

    // The access log should now contain at least one recorded line per request above.
    std::thread::sleep(Duration::from_millis(200));
    drop(server);
    let log_contents = std::fs::read_to_string(log_dir.path().join("access.log")).unwrap_or_default();
    assert!(log_contents.contains("\"GET /hello.txt\" 200"));
}
