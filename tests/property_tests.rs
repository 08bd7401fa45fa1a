//! Property and fuzz-style tests for the version codec and response decoder.
//!
//! Runs on host (x86_64) only; proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use fota::ParseError;
use fota::proto::response;
use fota::version::{self, Version};
use proptest::prelude::*;

fn any_version() -> impl Strategy<Value = Version> {
    (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(a, b, c)| Version::new(a, b, c))
}

// ── Version codec ─────────────────────────────────────────────

proptest! {
    #[test]
    fn display_then_parse_is_identity(v in any_version()) {
        prop_assert_eq!(version::parse(&v.to_string()), Ok(v));
    }

    /// A component above 255 is rejected, never truncated.
    #[test]
    fn oversized_component_is_malformed(
        big in 256u32..100_000,
        pos in 0usize..3,
        v in any_version(),
    ) {
        let mut parts = [v.major as u32, v.minor as u32, v.patch as u32];
        parts[pos] = big;
        let text = format!("{}.{}.{}", parts[0], parts[1], parts[2]);
        prop_assert_eq!(version::parse(&text), Err(ParseError::Malformed));
    }

    #[test]
    fn wrong_component_count_is_malformed(
        parts in proptest::collection::vec(any::<u8>(), 0..8)
            .prop_filter("three parts is valid", |p| p.len() != 3),
    ) {
        let text = parts.iter().map(u8::to_string).collect::<Vec<_>>().join(".");
        prop_assert_eq!(version::parse(&text), Err(ParseError::Malformed));
    }

    /// Ordering agrees with the packed 24-bit form.
    #[test]
    fn ordering_matches_packed_form(a in any_version(), b in any_version()) {
        prop_assert_eq!(version::compare(&a, &b), a.to_packed().cmp(&b.to_packed()));
        prop_assert_eq!(Version::from_packed(a.to_packed()), Some(a));
    }

    #[test]
    fn compare_is_a_total_order(x in any_version(), y in any_version(), z in any_version()) {
        use core::cmp::Ordering;
        prop_assert_eq!(version::compare(&x, &y), version::compare(&y, &x).reverse());
        prop_assert_eq!(version::compare(&x, &y) == Ordering::Equal, x == y);
        if version::compare(&x, &y) == Ordering::Less && version::compare(&y, &z) == Ordering::Less {
            prop_assert_eq!(version::compare(&x, &z), Ordering::Less);
        }
    }

    #[test]
    fn parse_never_panics(s in "\\PC{0,24}") {
        let _ = version::parse(&s);
    }
}

// ── Response decoding ─────────────────────────────────────────

proptest! {
    /// Arbitrary server bytes never panic the decoder.
    #[test]
    fn decoder_survives_arbitrary_bytes(
        raw in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let _ = response::decode_version_response(&raw);
    }

    #[test]
    fn well_formed_answer_decodes(v in any_version(), pad in 0usize..16) {
        let body = format!("{{{}\"version\":\"{}\"}}", " ".repeat(pad), v);
        let raw = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        prop_assert_eq!(response::decode_version_response(raw.as_bytes()), Ok(v));
    }

    #[test]
    fn non_success_status_is_reported(code in 300u16..600, v in any_version()) {
        let raw = format!("HTTP/1.1 {} X\r\n\r\n{{\"version\":\"{}\"}}", code, v);
        prop_assert_eq!(
            response::decode_version_response(raw.as_bytes()),
            Err(ParseError::HttpStatus(code))
        );
    }
}
