#![no_main]

//! Fuzz target for checksum framing and field sanitization.
//!
//! Verifies the codec's total-function contracts on arbitrary input:
//! `verify` never panics, `append` output always re-verifies, and
//! sanitization is idempotent and strips every reserved byte.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use sip2gate::protocol::checksum;
use sip2gate::protocol::sanitize::{sanitize, to_ascii};

#[derive(Arbitrary, Debug)]
struct FuzzCodecInput {
    body: String,
    seq: u8,
    raw: Vec<u8>,
}

fuzz_target!(|input: FuzzCodecInput| {
    // verify is total over arbitrary (ISO-8859-1 decoded) bytes.
    let frame: String = input.raw.iter().map(|&b| b as char).collect();
    let _ = checksum::verify(&frame);

    // append either rejects the sequence or produces a verifying frame.
    match checksum::append(&input.body, input.seq) {
        Ok(framed) => {
            assert!(input.seq <= 9);
            assert_eq!(checksum::verify(&framed), Ok(true), "{framed:?}");
        }
        Err(_) => assert!(input.seq > 9),
    }

    // Sanitization: idempotent, reserved bytes gone.
    let clean = sanitize(&input.body);
    assert_eq!(sanitize(&clean), clean);
    assert!(!clean.contains('|'));
    assert!(clean.chars().all(|c| c >= '\u{20}'));

    // Transliteration always yields 7-bit output.
    assert!(to_ascii(&input.body).bytes().all(|b| b < 0x80));
});
