//! Property-based invariants for the SIP2 codec.

use proptest::prelude::*;

use sip2gate::protocol::checksum;
use sip2gate::protocol::formatter::{self, HoldMode, PatronInfoSummary};
use sip2gate::protocol::parser;
use sip2gate::protocol::sanitize::{sanitize, to_ascii};

use chrono::{TimeZone, Utc};

// ─────────────────────────────────────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────────────────────────────────────

/// Arbitrary printable-ASCII field values, pipes and all; the formatter is
/// expected to sanitize them.
fn arb_field() -> impl Strategy<Value = String> {
    "[ -~]{0,24}"
}

/// Barcode-shaped identifiers for round-trip checks.
fn arb_barcode() -> impl Strategy<Value = String> {
    "[A-Za-z0-9]{1,16}"
}

/// Name-shaped values: printable, no pipe (pipes cannot survive a frame).
fn arb_name() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 .'-]{0,24}"
}

fn arb_seq() -> impl Strategy<Value = u8> {
    0u8..=9
}

/// Completely arbitrary (unicode) strings for sanitizer properties.
fn arb_any() -> impl Strategy<Value = String> {
    "\\PC{0,64}"
}

fn fixed_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
}

/// Response command codes the parser knows.
const KNOWN_RESPONSE_CODES: &[&str] = &[
    "24", "26", "12", "30", "10", "18", "38", "64", "16", "66", "36", "98", "20",
];

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn formatted_frames_always_verify(
        inst in arb_field(),
        patron in arb_field(),
        item in arb_field(),
        seq in arb_seq(),
    ) {
        let now = fixed_now();
        let frames = vec![
            formatter::patron_status(&inst, &patron, None, now, seq).unwrap(),
            formatter::checkout(&inst, &patron, &item, None, now, seq).unwrap(),
            formatter::checkin(&inst, &item, now, seq).unwrap(),
            formatter::hold(&inst, &patron, HoldMode::Add, Some(&item), None, None, None, now, seq)
                .unwrap(),
            formatter::renew_all(&inst, &patron, now, seq).unwrap(),
            formatter::patron_information(
                &inst, &patron, PatronInfoSummary::default(), None, None, None, now, seq,
            )
            .unwrap(),
        ];
        for frame in frames {
            prop_assert_eq!(checksum::verify(&frame), Ok(true));
        }
    }

    #[test]
    fn sanitize_is_idempotent_and_clean(input in arb_any()) {
        let once = sanitize(&input);
        prop_assert_eq!(&sanitize(&once), &once);
        prop_assert!(!once.contains('|'));
        prop_assert!(!once.contains('\r'));
        prop_assert!(!once.contains('\n'));
        prop_assert!(once.chars().all(|c| c >= ' '));
    }

    #[test]
    fn transliteration_is_seven_bit(input in arb_any()) {
        prop_assert!(to_ascii(&input).bytes().all(|b| b < 0x80));
    }

    #[test]
    fn checksum_hex_is_case_insensitive(body in "[ -~]{0,40}", seq in arb_seq()) {
        let frame = checksum::append(&body, seq).unwrap();
        let stripped = frame.strip_suffix('\r').unwrap();
        let (prefix, hex) = stripped.split_at(stripped.len() - 4);
        let lowered = format!("{prefix}{}", hex.to_lowercase());
        prop_assert_eq!(checksum::verify(&lowered), Ok(true));
        prop_assert_eq!(checksum::verify(&frame), Ok(true));
    }

    #[test]
    fn parser_never_panics_on_known_codes(
        code_idx in 0..KNOWN_RESPONSE_CODES.len(),
        junk in "\\PC{0,80}",
    ) {
        let frame = format!("{}{junk}", KNOWN_RESPONSE_CODES[code_idx]);
        // Any byte string behind a known code yields a record, never a panic
        // and never an error.
        prop_assert!(parser::parse_response(&frame).is_ok());
    }

    #[test]
    fn patron_status_reference_frames_round_trip(
        barcode in arb_barcode(),
        name in arb_name(),
        seq in arb_seq(),
        holds in 0u32..100,
    ) {
        let body = format!(
            "24              00120240115    093000AOMAIN|AA{barcode}|AE{name}|BLY|BZ{holds:04}|CA0000|CB0000|"
        );
        let frame = checksum::append(&body, seq).unwrap();
        prop_assert_eq!(checksum::verify(&frame), Ok(true));

        let record = parser::parse_patron_status(&frame).unwrap();
        prop_assert_eq!(&record.patron_barcode, &barcode);
        prop_assert_eq!(&record.patron_name, &name);
        prop_assert_eq!(record.hold_items_count, holds);
        prop_assert!(record.valid_patron);
        prop_assert!(record.extensions.is_none(), "no extensions for reference frames");
        prop_assert_eq!(record.sequence, Some(seq));
    }

    #[test]
    fn checkout_reference_frames_round_trip(
        patron in arb_barcode(),
        item in arb_barcode(),
        title in arb_name(),
        seq in arb_seq(),
    ) {
        let body = format!(
            "121NUY20240115    093000AOMAIN|AA{patron}|AB{item}|AJ{title}|AH20240301    235900|"
        );
        let frame = checksum::append(&body, seq).unwrap();
        let record = parser::parse_checkout(&frame).unwrap();
        prop_assert!(record.ok);
        prop_assert_eq!(&record.patron_barcode, &patron);
        prop_assert_eq!(&record.item_barcode, &item);
        prop_assert_eq!(&record.title_identifier, &title);
        prop_assert!(record.extensions.is_none());
    }

    #[test]
    fn formatted_requests_stay_ascii_after_transliteration(
        inst in arb_any(),
        patron in arb_any(),
        seq in arb_seq(),
    ) {
        let frame = formatter::patron_status(&inst, &patron, None, fixed_now(), seq).unwrap();
        let wire = to_ascii(&frame);
        prop_assert!(wire.bytes().all(|b| b < 0x80));
        prop_assert!(wire.ends_with('\r'));
    }
}
