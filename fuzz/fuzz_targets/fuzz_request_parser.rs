#![no_main]

use libfuzzer_sys::fuzz_target;
use staticd_proto::request::Request;

fuzz_target!(|data: &[u8]| {
    let _ = Request::parse(data);
});
