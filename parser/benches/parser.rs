use criterion::{black_box, criterion_group, criterion_main, Criterion};
use staticd_proto::request::Request;

fn parse_simple_get(c: &mut Criterion) {
    let buf = b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n";
    c.bench_function("parse_simple_get", |b| {
        b.iter(|| Request::parse(black_box(buf)).unwrap())
    });
}

fn parse_with_range(c: &mut Criterion) {
    let buf = b"GET /video.mp4 HTTP/1.1\r\nHost: localhost\r\nRange: bytes=0-1023\r\n\r\n";
    c.bench_function("parse_with_range", |b| {
        b.iter(|| Request::parse(black_box(buf)).unwrap())
    });
}

criterion_group!(benches, parse_simple_get, parse_with_range);
criterion_main!(benches);
