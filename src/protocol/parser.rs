//! Inbound SIP2 frame decoding.
//!
//! The two-byte command code selects the variant; the variant fixes how many
//! bytes of positional header follow and which variable tags are "known".
//! Parsing is deliberately lenient: truncated or garbled input never panics
//! and never errors — absent fields fall back to empty strings, zero, or
//! `false`. The only parser error is a command-code mismatch.
//!
//! Unknown tags are passed through in the record's `extensions` map, which
//! is the vendor-compatibility mechanism: new tags flow to consumers without
//! a code change here.
//!
//! The first `|` segment may carry one variable field directly after the
//! fixed header. The scanner looks for the first two-uppercase-letter pair
//! at or beyond the variant's header length and treats the rest of the
//! segment as that field's value. A vendor that stuffs an uppercase pair
//! into an over-long fixed header would be misread here; no such system has
//! been observed, but the risk is inherent to the heuristic.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ProtocolError;
use crate::protocol::records::{
    AcsStatusRecord, CheckinRecord, CheckoutRecord, EndSessionRecord, FeePaidRecord, HoldRecord,
    ItemInfoRecord, ItemStatusUpdateRecord, PatronInfoRecord, PatronStatusFlags,
    PatronStatusRecord, RenewAllRecord, SipResponse,
};

/// Trailing `AY<d>AZ<hex>` trailer. Legacy systems sometimes omit the hex
/// digits entirely, so zero to four are accepted.
static TRAILER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"AY(\d)AZ[0-9A-Fa-f]{0,4}\s*$").expect("trailer regex"));

// ─────────────────────────────────────────────────────────────────────────────
// Frame scanning
// ─────────────────────────────────────────────────────────────────────────────

/// A frame decomposed into fixed header, ordered variable fields, and the
/// trailer sequence digit.
#[derive(Debug)]
struct ScannedFrame {
    header: Vec<char>,
    fields: Vec<(String, String)>,
    sequence: Option<u8>,
}

fn is_tag_pair(a: char, b: char) -> bool {
    a.is_ascii_uppercase() && b.is_ascii_uppercase()
}

/// Splits a frame into header, variable fields, and trailer sequence.
///
/// `threshold` is the variant's fixed header length (including the two-byte
/// command code); tag discovery in the first segment starts there.
fn scan(frame: &str, threshold: usize) -> ScannedFrame {
    let trimmed = frame.trim_end_matches(['\r', '\n']);

    let (body, sequence) = match TRAILER_RE.find(trimmed) {
        Some(m) => {
            let seq = TRAILER_RE
                .captures(trimmed)
                .and_then(|c| c.get(1))
                .and_then(|d| d.as_str().parse::<u8>().ok());
            (&trimmed[..m.start()], seq)
        }
        None => (trimmed, None),
    };

    let mut segments = body.split('|');
    let first: Vec<char> = segments.next().unwrap_or_default().chars().collect();

    let mut fields = Vec::new();
    let mut header_len = first.len().min(threshold);

    // First segment: one trailing variable field may follow the fixed header.
    if first.len() > threshold {
        let tail = &first[threshold..];
        let tag_at = (0..tail.len().saturating_sub(1))
            .find(|&i| is_tag_pair(tail[i], tail[i + 1]));
        if let Some(i) = tag_at {
            header_len = threshold + i;
            let tag: String = tail[i..i + 2].iter().collect();
            let value: String = tail[i + 2..].iter().collect();
            fields.push((tag, value));
        } else {
            header_len = first.len();
        }
    }
    let header = first[..header_len].to_vec();

    // Every later segment is `TT<value>` through end-of-segment.
    for segment in segments {
        let chars: Vec<char> = segment.chars().collect();
        if chars.len() >= 2 && is_tag_pair(chars[0], chars[1]) {
            let tag: String = chars[..2].iter().collect();
            let value: String = chars[2..].iter().collect();
            fields.push((tag, value));
        }
        // Segments without a leading tag are garbage; skip them.
    }

    ScannedFrame {
        header,
        fields,
        sequence,
    }
}

impl ScannedFrame {
    /// First occurrence of a tag.
    fn first(&self, tag: &str) -> Option<String> {
        self.fields
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.clone())
    }

    /// First occurrence, defaulting to the empty string.
    fn first_or_empty(&self, tag: &str) -> String {
        self.first(tag).unwrap_or_default()
    }

    /// Every occurrence of a tag, in frame order.
    fn all(&self, tag: &str) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(t, _)| t == tag)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// First occurrence parsed as a count (space-trimmed), default 0.
    fn count(&self, tag: &str) -> u32 {
        self.first(tag)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Unknown-tag passthrough: everything outside the variant's known set
    /// and the trailer pair. Repeated unknown tags keep the first value.
    fn extensions(&self, known: &[&str]) -> Option<BTreeMap<String, String>> {
        let mut map = BTreeMap::new();
        for (tag, value) in &self.fields {
            if tag == "AY" || tag == "AZ" || known.contains(&tag.as_str()) {
                continue;
            }
            map.entry(tag.clone()).or_insert_with(|| value.clone());
        }
        (!map.is_empty()).then_some(map)
    }

    // Fixed-header accessors; all tolerate truncation.

    fn chr(&self, idx: usize) -> char {
        self.header.get(idx).copied().unwrap_or(' ')
    }

    /// `Y`/`N` boolean flag.
    fn flag(&self, idx: usize) -> bool {
        self.chr(idx) == 'Y'
    }

    /// `0`/`1` ok flag.
    fn ok_flag(&self, idx: usize) -> bool {
        self.chr(idx) == '1'
    }

    fn text(&self, start: usize, len: usize) -> String {
        if start >= self.header.len() {
            return String::new();
        }
        let end = (start + len).min(self.header.len());
        self.header[start..end].iter().collect()
    }

    /// Fixed-width decimal, space-trimmed, default 0.
    fn num(&self, start: usize, len: usize) -> u32 {
        self.text(start, len).trim().parse().unwrap_or(0)
    }

    fn patron_flags(&self, start: usize) -> PatronStatusFlags {
        PatronStatusFlags {
            charge_privileges_denied: self.flag(start),
            renewal_privileges_denied: self.flag(start + 1),
            recall_privileges_denied: self.flag(start + 2),
            hold_privileges_denied: self.flag(start + 3),
            card_reported_lost: self.flag(start + 4),
            too_many_items_charged: self.flag(start + 5),
            too_many_items_overdue: self.flag(start + 6),
            too_many_renewals: self.flag(start + 7),
            too_many_claims_of_items_returned: self.flag(start + 8),
            too_many_items_lost: self.flag(start + 9),
            excessive_outstanding_fines: self.flag(start + 10),
            excessive_outstanding_fees: self.flag(start + 11),
            recall_overdue: self.flag(start + 12),
            too_many_items_billed: self.flag(start + 13),
        }
    }
}

/// Checks the two-byte command code of a frame against the parser's
/// expectation.
fn expect_code(frame: &str, expected: &str) -> Result<(), ProtocolError> {
    let actual: String = frame.chars().take(2).collect();
    if actual == expected {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedResponseCode {
            expected: expected.to_string(),
            actual,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Variant parsers
// ─────────────────────────────────────────────────────────────────────────────

const PATRON_STATUS_KNOWN: &[&str] = &[
    "AO", "AA", "AE", "BL", "BZ", "CA", "CB", "AU", "CD", "AS", "AF", "AG",
];

fn parse_patron_status_like(
    frame: &str,
    expected: &str,
) -> Result<PatronStatusRecord, ProtocolError> {
    expect_code(frame, expected)?;
    let f = scan(frame, 37);
    Ok(PatronStatusRecord {
        flags: f.patron_flags(2),
        language: f.text(16, 3),
        transaction_date: f.text(19, 18),
        institution_id: f.first_or_empty("AO"),
        patron_barcode: f.first_or_empty("AA"),
        patron_name: f.first_or_empty("AE"),
        valid_patron: f.first("BL").is_some_and(|v| v == "Y"),
        hold_items_count: f.count("BZ"),
        overdue_items_count: f.count("CA"),
        charged_items_count: f.count("CB"),
        hold_items: f.first("AS"),
        charged_items: f.all("AU"),
        unavailable_holds_count: f.first("CD"),
        print_line: f.first("AG"),
        screen_messages: f.all("AF"),
        extensions: f.extensions(PATRON_STATUS_KNOWN),
        sequence: f.sequence,
    })
}

/// Parses a Patron Status response (`24`).
pub fn parse_patron_status(frame: &str) -> Result<PatronStatusRecord, ProtocolError> {
    parse_patron_status_like(frame, "24")
}

/// Parses a Patron Enable response (`26`), which shares the Patron Status
/// layout.
pub fn parse_patron_enable(frame: &str) -> Result<PatronStatusRecord, ProtocolError> {
    parse_patron_status_like(frame, "26")
}

const CHECKOUT_KNOWN: &[&str] = &["AO", "AA", "AB", "AJ", "AH", "BV", "AF", "AG"];

fn parse_checkout_like(frame: &str, expected: &str) -> Result<CheckoutRecord, ProtocolError> {
    expect_code(frame, expected)?;
    let f = scan(frame, 24);
    Ok(CheckoutRecord {
        ok: f.ok_flag(2),
        renewal_ok: f.flag(3),
        magnetic_media: f.chr(4),
        desensitize: f.chr(5),
        transaction_date: f.text(6, 18),
        institution_id: f.first_or_empty("AO"),
        patron_barcode: f.first_or_empty("AA"),
        item_barcode: f.first_or_empty("AB"),
        title_identifier: f.first_or_empty("AJ"),
        due_date: f.first_or_empty("AH"),
        fee_amount: f.first("BV"),
        print_line: f.first("AG"),
        screen_messages: f.all("AF"),
        extensions: f.extensions(CHECKOUT_KNOWN),
        sequence: f.sequence,
    })
}

/// Parses a Checkout response (`12`).
pub fn parse_checkout(frame: &str) -> Result<CheckoutRecord, ProtocolError> {
    parse_checkout_like(frame, "12")
}

/// Parses a Renew response (`30`), which shares the Checkout layout.
pub fn parse_renew(frame: &str) -> Result<CheckoutRecord, ProtocolError> {
    parse_checkout_like(frame, "30")
}

const CHECKIN_KNOWN: &[&str] = &["AO", "AB", "AJ", "AQ", "AF", "AG"];

/// Parses a Checkin response (`10`).
pub fn parse_checkin(frame: &str) -> Result<CheckinRecord, ProtocolError> {
    expect_code(frame, "10")?;
    let f = scan(frame, 24);
    Ok(CheckinRecord {
        ok: f.ok_flag(2),
        resensitize: f.flag(3),
        magnetic_media: f.chr(4),
        alert: f.flag(5),
        transaction_date: f.text(6, 18),
        institution_id: f.first_or_empty("AO"),
        item_barcode: f.first_or_empty("AB"),
        title_identifier: f.first_or_empty("AJ"),
        permanent_location: f.first("AQ"),
        print_line: f.first("AG"),
        screen_messages: f.all("AF"),
        extensions: f.extensions(CHECKIN_KNOWN),
        sequence: f.sequence,
    })
}

const ITEM_INFO_KNOWN: &[&str] = &["AO", "AB", "AJ", "BG", "BH", "CK", "AF"];

/// Parses an Item Information response (`18`).
pub fn parse_item_information(frame: &str) -> Result<ItemInfoRecord, ProtocolError> {
    expect_code(frame, "18")?;
    let f = scan(frame, 26);
    Ok(ItemInfoRecord {
        circulation_status: f.num(2, 2),
        security_marker: f.num(4, 2),
        fee_type: f.num(6, 2),
        transaction_date: f.text(8, 18),
        institution_id: f.first_or_empty("AO"),
        item_barcode: f.first_or_empty("AB"),
        title_identifier: f.first_or_empty("AJ"),
        owner: f.first("BG"),
        currency_type: f.first("BH"),
        media_type: f.first("CK"),
        screen_messages: f.all("AF"),
        extensions: f.extensions(ITEM_INFO_KNOWN),
        sequence: f.sequence,
    })
}

const FEE_PAID_KNOWN: &[&str] = &["AO", "AA", "BK", "BH", "AF"];

/// Parses a Fee Paid response (`38`).
pub fn parse_fee_paid(frame: &str) -> Result<FeePaidRecord, ProtocolError> {
    expect_code(frame, "38")?;
    let f = scan(frame, 21);
    Ok(FeePaidRecord {
        payment_accepted: f.flag(2),
        transaction_date: f.text(3, 18),
        institution_id: f.first_or_empty("AO"),
        patron_barcode: f.first_or_empty("AA"),
        transaction_id: f.first_or_empty("BK"),
        currency_type: f.first("BH"),
        screen_messages: f.all("AF"),
        extensions: f.extensions(FEE_PAID_KNOWN),
        sequence: f.sequence,
    })
}

const PATRON_INFO_KNOWN: &[&str] = &[
    "AO", "AA", "AE", "BL", "BE", "BF", "BD", "AF", "AT", "AU", "AV", "BU", "BJ", "BP", "BQ",
];

/// Parses a Patron Information response (`64`).
pub fn parse_patron_information(frame: &str) -> Result<PatronInfoRecord, ProtocolError> {
    expect_code(frame, "64")?;
    let f = scan(frame, 61);
    Ok(PatronInfoRecord {
        flags: f.patron_flags(2),
        language: f.text(16, 3),
        transaction_date: f.text(19, 18),
        hold_items_count: f.num(37, 4),
        overdue_items_count: f.num(41, 4),
        charged_items_count: f.num(45, 4),
        fine_items_count: f.num(49, 4),
        recall_items_count: f.num(53, 4),
        unavailable_holds_count: f.num(57, 4),
        institution_id: f.first_or_empty("AO"),
        patron_barcode: f.first_or_empty("AA"),
        patron_name: f.first_or_empty("AE"),
        valid_patron: f.first("BL").is_some_and(|v| v == "Y"),
        email_address: f.first("BE"),
        home_phone: f.first("BF"),
        home_address: f.first("BD"),
        hold_items: f.all("BJ"),
        overdue_items: f.all("AT"),
        charged_items: f.all("AU"),
        fine_items: f.all("AV"),
        recall_items: f.all("BU"),
        start_item: f.first("BP"),
        end_item: f.first("BQ"),
        screen_messages: f.all("AF"),
        extensions: f.extensions(PATRON_INFO_KNOWN),
        sequence: f.sequence,
    })
}

const HOLD_KNOWN: &[&str] = &["AO", "AA", "AB", "AJ", "BW", "BS", "MN", "AF", "AG"];

/// Parses a Hold response (`16`).
pub fn parse_hold(frame: &str) -> Result<HoldRecord, ProtocolError> {
    expect_code(frame, "16")?;
    let f = scan(frame, 22);
    Ok(HoldRecord {
        ok: f.ok_flag(2),
        available: f.flag(3),
        transaction_date: f.text(4, 18),
        institution_id: f.first_or_empty("AO"),
        patron_barcode: f.first_or_empty("AA"),
        item_barcode: f.first_or_empty("AB"),
        title_identifier: f.first_or_empty("AJ"),
        expiration_date: f.first("BW"),
        pickup_location: f.first("BS"),
        queue_position: f.first("MN"),
        print_line: f.first("AG"),
        screen_messages: f.all("AF"),
        extensions: f.extensions(HOLD_KNOWN),
        sequence: f.sequence,
    })
}

const RENEW_ALL_KNOWN: &[&str] = &["AO", "AA", "BM", "BN", "AF"];

/// Parses a Renew All response (`66`).
pub fn parse_renew_all(frame: &str) -> Result<RenewAllRecord, ProtocolError> {
    expect_code(frame, "66")?;
    let f = scan(frame, 29);
    Ok(RenewAllRecord {
        ok: f.ok_flag(2),
        renewed_count: f.num(3, 4),
        unrenewed_count: f.num(7, 4),
        transaction_date: f.text(11, 18),
        institution_id: f.first_or_empty("AO"),
        patron_barcode: f.first_or_empty("AA"),
        renewed_items: f.all("BM"),
        unrenewed_items: f.all("BN"),
        screen_messages: f.all("AF"),
        extensions: f.extensions(RENEW_ALL_KNOWN),
        sequence: f.sequence,
    })
}

const END_SESSION_KNOWN: &[&str] = &["AO", "AA", "AF", "AG"];

/// Parses an End Session response (`36`).
pub fn parse_end_session(frame: &str) -> Result<EndSessionRecord, ProtocolError> {
    expect_code(frame, "36")?;
    let f = scan(frame, 21);
    Ok(EndSessionRecord {
        end_session: f.flag(2),
        transaction_date: f.text(3, 18),
        institution_id: f.first_or_empty("AO"),
        patron_barcode: f.first_or_empty("AA"),
        print_line: f.first("AG"),
        screen_messages: f.all("AF"),
        extensions: f.extensions(END_SESSION_KNOWN),
        sequence: f.sequence,
    })
}

const ACS_STATUS_KNOWN: &[&str] = &["AO", "AM", "BX", "AN", "AF"];

/// Parses an ACS Status response (`98`).
pub fn parse_acs_status(frame: &str) -> Result<AcsStatusRecord, ProtocolError> {
    expect_code(frame, "98")?;
    let f = scan(frame, 36);
    Ok(AcsStatusRecord {
        on_line: f.flag(2),
        checkin_ok: f.flag(3),
        checkout_ok: f.flag(4),
        acs_renewal_policy: f.flag(5),
        status_update_ok: f.flag(6),
        offline_ok: f.flag(7),
        timeout_period: f.num(8, 3),
        retries_allowed: f.num(11, 3),
        date_time_sync: f.text(14, 18),
        protocol_version: f.text(32, 4),
        institution_id: f.first_or_empty("AO"),
        library_name: f.first("AM"),
        supported_messages: f.first("BX"),
        terminal_location: f.first("AN"),
        screen_messages: f.all("AF"),
        extensions: f.extensions(ACS_STATUS_KNOWN),
        sequence: f.sequence,
    })
}

const ITEM_STATUS_UPDATE_KNOWN: &[&str] = &["AO", "AB", "AJ", "AF", "AG"];

/// Parses an Item Status Update response (`20`).
pub fn parse_item_status_update(frame: &str) -> Result<ItemStatusUpdateRecord, ProtocolError> {
    expect_code(frame, "20")?;
    let f = scan(frame, 21);
    Ok(ItemStatusUpdateRecord {
        item_properties_ok: f.ok_flag(2) || f.flag(2),
        transaction_date: f.text(3, 18),
        institution_id: f.first_or_empty("AO"),
        item_barcode: f.first_or_empty("AB"),
        title_identifier: f.first_or_empty("AJ"),
        print_line: f.first("AG"),
        screen_messages: f.all("AF"),
        extensions: f.extensions(ITEM_STATUS_UPDATE_KNOWN),
        sequence: f.sequence,
    })
}

/// Parses any supported response frame, dispatching on the command code.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedResponseCode`] for codes this gateway
/// does not handle.
pub fn parse_response(frame: &str) -> Result<SipResponse, ProtocolError> {
    let code: String = frame.chars().take(2).collect();
    match code.as_str() {
        "24" => parse_patron_status(frame).map(SipResponse::PatronStatus),
        "26" => parse_patron_enable(frame).map(SipResponse::PatronStatus),
        "12" => parse_checkout(frame).map(SipResponse::Checkout),
        "30" => parse_renew(frame).map(SipResponse::Checkout),
        "10" => parse_checkin(frame).map(SipResponse::Checkin),
        "18" => parse_item_information(frame).map(SipResponse::ItemInfo),
        "38" => parse_fee_paid(frame).map(SipResponse::FeePaid),
        "64" => parse_patron_information(frame).map(SipResponse::PatronInfo),
        "16" => parse_hold(frame).map(SipResponse::Hold),
        "66" => parse_renew_all(frame).map(SipResponse::RenewAll),
        "36" => parse_end_session(frame).map(SipResponse::EndSession),
        "98" => parse_acs_status(frame).map(SipResponse::AcsStatus),
        "20" => parse_item_status_update(frame).map(SipResponse::ItemStatusUpdate),
        _ => Err(ProtocolError::UnexpectedResponseCode {
            expected: "a supported response code".to_string(),
            actual: code,
        }),
    }
}

/// Extracts the trailer sequence digit from a raw frame, if present.
///
/// Used by the receive path to route responses to pending requests even when
/// checksum verification has already failed.
#[must_use]
pub fn extract_sequence(frame: &str) -> Option<u8> {
    let trimmed = frame.trim_end_matches(['\r', '\n']);
    TRAILER_RE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .and_then(|d| d.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum;

    fn framed(body: &str, seq: u8) -> String {
        checksum::append(body, seq).unwrap()
    }

    #[test]
    fn test_patron_status_full_frame() {
        let body = "24              00120240115    093000AOMAIN|AAVALID001|AEAlice Valid|BLY|BZ0001|CA0000|CB0003|AFWelcome back|";
        let record = parse_patron_status(&framed(body, 2)).unwrap();
        assert_eq!(record.institution_id, "MAIN");
        assert_eq!(record.patron_barcode, "VALID001");
        assert_eq!(record.patron_name, "Alice Valid");
        assert!(record.valid_patron);
        assert_eq!(record.hold_items_count, 1);
        assert_eq!(record.overdue_items_count, 0);
        assert_eq!(record.charged_items_count, 3);
        assert!(!record.flags.charge_privileges_denied);
        assert!(!record.flags.card_reported_lost);
        assert_eq!(record.language, "001");
        assert_eq!(record.transaction_date, "20240115    093000");
        assert_eq!(record.screen_messages, vec!["Welcome back"]);
        assert!(record.extensions.is_none());
        assert_eq!(record.sequence, Some(2));
    }

    #[test]
    fn test_patron_status_flags_positions() {
        // Flags 0 and 4 set: charge privileges denied, card reported lost.
        let body = "24Y   Y         00120240115    093000AOMAIN|AAP1|BLN|";
        let record = parse_patron_status(&framed(body, 0)).unwrap();
        assert!(record.flags.charge_privileges_denied);
        assert!(record.flags.card_reported_lost);
        assert!(!record.flags.renewal_privileges_denied);
        assert!(!record.valid_patron);
    }

    #[test]
    fn test_patron_status_with_repeated_charged_items() {
        let body = "24              00120240115    093000AOMAIN|AAP1|BLY|AUitem-0001|AUitem-0002|AUitem-0003|";
        let record = parse_patron_status(&framed(body, 1)).unwrap();
        assert_eq!(
            record.charged_items,
            vec!["item-0001", "item-0002", "item-0003"]
        );
        // A repeated known tag never spills into extensions.
        assert!(record.extensions.is_none());

        let empty = parse_patron_status(&framed("24", 0)).unwrap();
        assert!(empty.charged_items.is_empty());
    }

    #[test]
    fn test_patron_status_code_mismatch() {
        let err = parse_patron_status("12...").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnexpectedResponseCode {
                expected: "24".to_string(),
                actual: "12".to_string(),
            }
        );
    }

    #[test]
    fn test_checkout_denied_with_screen_message() {
        let body = "120NUN20240115    093000AOMAIN|AABLOCKED001|ABITEM789|AJ|AH|AFPatron blocked|";
        let record = parse_checkout(&framed(body, 1)).unwrap();
        assert!(!record.ok);
        assert_eq!(record.screen_message(), Some("Patron blocked"));
        assert_eq!(record.item_barcode, "ITEM789");
    }

    #[test]
    fn test_checkout_success_with_due_date() {
        let body = "121NUY20240115    093000AOMAIN|AAP1|ABI1|AJThe Rust Book|AH20240215    235900|BV0.00|";
        let record = parse_checkout(&framed(body, 3)).unwrap();
        assert!(record.ok);
        assert_eq!(record.title_identifier, "The Rust Book");
        assert_eq!(record.due_date, "20240215    235900");
        assert_eq!(record.fee_amount.as_deref(), Some("0.00"));
        assert_eq!(record.desensitize, 'Y');
    }

    #[test]
    fn test_renew_shares_checkout_layout() {
        let body = "301YUY20240115    093000AOMAIN|AAP1|ABI1|";
        let record = parse_renew(&framed(body, 4)).unwrap();
        assert!(record.ok);
        assert!(record.renewal_ok);
    }

    #[test]
    fn test_checkin_alert() {
        let body = "101YUY20240115    093000AOMAIN|ABI1|AJSome Title|AQSHELF-2|";
        let record = parse_checkin(&framed(body, 5)).unwrap();
        assert!(record.ok);
        assert!(record.resensitize);
        assert!(record.alert);
        assert_eq!(record.permanent_location.as_deref(), Some("SHELF-2"));
    }

    #[test]
    fn test_item_information_numeric_header() {
        let body = "1804000120240115    093000ABI1|AJDune|BGMAIN|CK001|";
        let record = parse_item_information(&framed(body, 6)).unwrap();
        assert_eq!(record.circulation_status, 4);
        assert_eq!(record.security_marker, 0);
        assert_eq!(record.fee_type, 1);
        assert_eq!(record.title_identifier, "Dune");
        assert_eq!(record.media_type.as_deref(), Some("001"));
    }

    #[test]
    fn test_fee_paid_accepted() {
        let body = "38Y20240115    093000AOMAIN|AAP1|BKTXN0042|";
        let record = parse_fee_paid(&framed(body, 7)).unwrap();
        assert!(record.payment_accepted);
        assert_eq!(record.transaction_id, "TXN0042");
    }

    #[test]
    fn test_patron_information_counts_and_lists() {
        let body = "64              00120240115    093000000200010000000000000000AOMAIN|AAP1|AEBob|BLY|BEbob@example.com|ATitem-overdue-1|ATitem-overdue-2|AUitem-charged|";
        let record = parse_patron_information(&framed(body, 8)).unwrap();
        assert_eq!(record.hold_items_count, 2);
        assert_eq!(record.overdue_items_count, 1);
        assert_eq!(record.charged_items_count, 0);
        assert_eq!(
            record.overdue_items,
            vec!["item-overdue-1", "item-overdue-2"]
        );
        assert_eq!(record.charged_items, vec!["item-charged"]);
        assert_eq!(record.email_address.as_deref(), Some("bob@example.com"));
        assert!(record.extensions.is_none());
    }

    #[test]
    fn test_hold_response() {
        let body = "161N20240115    093000AOMAIN|AAP1|ABI1|BW20240301    235959|BSFRONT|";
        let record = parse_hold(&framed(body, 9)).unwrap();
        assert!(record.ok);
        assert!(!record.available);
        assert_eq!(record.pickup_location.as_deref(), Some("FRONT"));
        assert_eq!(
            record.expiration_date.as_deref(),
            Some("20240301    235959")
        );
    }

    #[test]
    fn test_renew_all_item_lists() {
        let body = "6610002000120240115    093000AOMAIN|AAP1|BMitem1|BMitem2|BNitem3|";
        let record = parse_renew_all(&framed(body, 0)).unwrap();
        assert!(record.ok);
        assert_eq!(record.renewed_count, 2);
        assert_eq!(record.unrenewed_count, 1);
        assert_eq!(record.renewed_items, vec!["item1", "item2"]);
        assert_eq!(record.unrenewed_items, vec!["item3"]);
    }

    #[test]
    fn test_end_session_flag() {
        let body = "36Y20240115    093000AOMAIN|AAP1|";
        let record = parse_end_session(&framed(body, 1)).unwrap();
        assert!(record.end_session);
    }

    #[test]
    fn test_acs_status_capabilities() {
        let body = "98YYYYNN10000320240115    0930002.00AOMAIN|AMCentral Library|BXYYYYYYYYYYYYYYYY|";
        let record = parse_acs_status(&framed(body, 2)).unwrap();
        assert!(record.on_line);
        assert!(record.checkin_ok);
        assert!(record.checkout_ok);
        assert!(record.acs_renewal_policy);
        assert!(!record.status_update_ok);
        assert_eq!(record.timeout_period, 100);
        assert_eq!(record.retries_allowed, 3);
        assert_eq!(record.protocol_version, "2.00");
        assert_eq!(record.library_name.as_deref(), Some("Central Library"));
    }

    #[test]
    fn test_item_status_update_response() {
        let body = "20120240115    093000AOMAIN|ABI1|";
        let record = parse_item_status_update(&framed(body, 3)).unwrap();
        assert!(record.item_properties_ok);
    }

    #[test]
    fn test_unknown_tags_land_in_extensions() {
        let body = "24              00120240115    093000AOMAIN|AAP1|XZvendor-data|ZZ42|";
        let record = parse_patron_status(&framed(body, 0)).unwrap();
        let ext = record.extensions.unwrap();
        assert_eq!(ext.get("XZ").map(String::as_str), Some("vendor-data"));
        assert_eq!(ext.get("ZZ").map(String::as_str), Some("42"));
        // Known tags never leak into extensions.
        assert!(!ext.contains_key("AO"));
        assert!(!ext.contains_key("AA"));
    }

    #[test]
    fn test_repeated_screen_messages_preserved_in_order() {
        let body = "24              00120240115    093000AOMAIN|AFfirst|AFsecond|AFthird|";
        let record = parse_patron_status(&framed(body, 0)).unwrap();
        assert_eq!(record.screen_messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_truncated_frame_yields_defaults() {
        let record = parse_patron_status("24").unwrap();
        assert_eq!(record.patron_barcode, "");
        assert_eq!(record.hold_items_count, 0);
        assert!(!record.valid_patron);
        assert!(record.extensions.is_none());

        let record = parse_checkout("120").unwrap();
        assert!(!record.ok);
        assert_eq!(record.due_date, "");
    }

    #[test]
    fn test_frame_without_trailer_is_parsed() {
        let body = "24              00120240115    093000AOMAIN|AAP1|";
        let record = parse_patron_status(body).unwrap();
        assert_eq!(record.patron_barcode, "P1");
        assert_eq!(record.sequence, None);
    }

    #[test]
    fn test_first_segment_field_with_uppercase_value() {
        // AO value is entirely uppercase; the scan must not split it.
        let body = "36Y20240115    093000AOMAIN|AAP1|";
        let record = parse_end_session(&framed(body, 0)).unwrap();
        assert_eq!(record.institution_id, "MAIN");
    }

    #[test]
    fn test_dispatch_by_code() {
        let body = "36Y20240115    093000AOMAIN|AAP1|";
        match parse_response(&framed(body, 0)).unwrap() {
            SipResponse::EndSession(r) => assert!(r.end_session),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_unknown_code() {
        let err = parse_response("55nothing").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnexpectedResponseCode { actual, .. } if actual == "55"
        ));
    }

    #[test]
    fn test_extract_sequence() {
        let frame = framed("990", 7);
        assert_eq!(extract_sequence(&frame), Some(7));
        assert_eq!(extract_sequence("no trailer here"), None);
        // Trailer with missing hex digits still yields the sequence.
        assert_eq!(extract_sequence("98YYYYNNAY5AZ\r"), Some(5));
    }
}
