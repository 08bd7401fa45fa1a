//! Fuzz target: `decode_version_response`
//!
//! Arbitrary server bytes must decode to a version or an error, never a
//! panic, and a successful decode must survive a display round-trip.
//!
//! cargo fuzz run fuzz_response_decoder

#![no_main]

use fota::proto::response;
use fota::version;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(v) = response::decode_version_response(data) {
        assert_eq!(version::parse(&v.to_string()), Ok(v));
    }
    if let Ok(text) = core::str::from_utf8(data) {
        let _ = version::parse(text);
    }
});
