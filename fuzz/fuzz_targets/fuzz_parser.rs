#![no_main]

//! Fuzz target for SIP2 response parsing.
//!
//! Attack surface: truncated fixed headers, garbled segment boundaries,
//! hostile tag runs, mixed-case trailers, embedded control bytes.
//!
//! The parser contract is total leniency behind a known command code:
//! arbitrary bytes must never cause a panic, and must yield a record with
//! defaulted fields rather than an error.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use sip2gate::protocol::parser;

/// Response codes the dispatch table accepts.
const KNOWN_CODES: &[&str] = &[
    "24", "26", "12", "30", "10", "18", "38", "64", "16", "66", "36", "98", "20",
];

#[derive(Arbitrary, Debug)]
struct FuzzFrame {
    /// Index into the known-code table; wrapped, so any u8 is valid.
    code_index: u8,
    /// Whether to prefix the known code at all.
    prefix_code: bool,
    /// Arbitrary frame tail.
    tail: Vec<u8>,
}

fuzz_target!(|input: FuzzFrame| {
    // Interpret the tail as ISO-8859-1, the same way the client does.
    let tail: String = input.tail.iter().map(|&b| b as char).collect();

    let frame = if input.prefix_code {
        let code = KNOWN_CODES[input.code_index as usize % KNOWN_CODES.len()];
        format!("{code}{tail}")
    } else {
        tail
    };

    // Dispatch never panics; with a known code it never errors either.
    let result = parser::parse_response(&frame);
    if input.prefix_code {
        assert!(result.is_ok(), "known code must parse: {frame:?}");
    }

    // Sequence extraction is total.
    let _ = parser::extract_sequence(&frame);
});
