//! Outbound SIP2 frame builders.
//!
//! One function per supported command. This module is the only place that
//! knows the fixed-position layout of each request: callers hand in already
//! validated business values, every value is routed through the sanitizer,
//! and the trailer is attached via the checksum codec. Timestamps are passed
//! in as `DateTime<Utc>` so builders stay deterministic under test.
//!
//! Layouts follow SIP 2.00: a two-digit command code, fixed-position bytes,
//! then `TT<value>|` variable fields in a fixed order.

use chrono::{DateTime, Utc};

use crate::error::ProtocolError;
use crate::protocol::checksum;
use crate::protocol::sanitize::sanitize;
use crate::protocol::timestamp::{BLANK_TIMESTAMP, sip_timestamp};

/// Default language code when the caller does not specify one.
pub const DEFAULT_LANGUAGE: &str = "001";

/// Default fee type for Fee Paid (`01` = other/unknown).
pub const DEFAULT_FEE_TYPE: &str = "01";

/// Default payment type for Fee Paid (`00` = cash).
pub const DEFAULT_PAYMENT_TYPE: &str = "00";

/// Default currency for Fee Paid.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Hold operation mode, encoded as the single mode byte of command `15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldMode {
    /// `+` — place a hold
    Add,
    /// `-` — cancel a hold
    Delete,
    /// `*` — change a hold
    Change,
}

impl HoldMode {
    /// The wire byte for this mode.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Add => '+',
            Self::Delete => '-',
            Self::Change => '*',
        }
    }
}

impl TryFrom<char> for HoldMode {
    type Error = char;

    fn try_from(c: char) -> Result<Self, char> {
        match c {
            '+' => Ok(Self::Add),
            '-' => Ok(Self::Delete),
            '*' => Ok(Self::Change),
            other => Err(other),
        }
    }
}

/// Security marker byte for Item Status Update (`19`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMarker {
    /// `0` — other
    #[default]
    Other,
    /// `1` — none
    None,
    /// `2` — 3M tattle tape
    TattleTape,
    /// `3` — 3M whisper tape
    WhisperTape,
}

impl SecurityMarker {
    /// The wire byte for this marker.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Other => '0',
            Self::None => '1',
            Self::TattleTape => '2',
            Self::WhisperTape => '3',
        }
    }
}

/// Summary selector for Patron Information (`63`).
///
/// Encoded as ten bytes: positions 0–4 are `Y` or space for hold, overdue,
/// charged, fine, and recall item detail; positions 5–9 are always spaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatronInfoSummary {
    /// Request hold item detail
    pub holds: bool,
    /// Request overdue item detail
    pub overdue: bool,
    /// Request charged item detail
    pub charged: bool,
    /// Request fine item detail
    pub fines: bool,
    /// Request recall item detail
    pub recall: bool,
}

impl PatronInfoSummary {
    fn encode(self) -> String {
        let mark = |on: bool| if on { 'Y' } else { ' ' };
        format!(
            "{}{}{}{}{}     ",
            mark(self.holds),
            mark(self.overdue),
            mark(self.charged),
            mark(self.fines),
            mark(self.recall)
        )
    }
}

/// Pads a language code to exactly three digits.
fn language_field(language: Option<&str>) -> String {
    let lang = sanitize(language.unwrap_or(DEFAULT_LANGUAGE));
    let trimmed: String = lang.chars().take(3).collect();
    format!("{trimmed:0>3}")
}

/// Pads a two-byte enumerated code field.
fn code2(value: &str) -> String {
    let v: String = sanitize(value).chars().take(2).collect();
    format!("{v:0>2}")
}

/// `93` Login.
pub fn login(
    user: &str,
    password: &str,
    location: &str,
    seq: u8,
) -> Result<String, ProtocolError> {
    // UID and PWD algorithm bytes are both `0`: plain-text credentials.
    let body = format!(
        "9300CN{}|CO{}|CP{}|",
        sanitize(user),
        sanitize(password),
        sanitize(location)
    );
    checksum::append(&body, seq)
}

/// `23` Patron Status.
pub fn patron_status(
    institution: &str,
    barcode: &str,
    language: Option<&str>,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let body = format!(
        "23{}{}AO{}|AA{}|AC|",
        language_field(language),
        sip_timestamp(now),
        sanitize(institution),
        sanitize(barcode)
    );
    checksum::append(&body, seq)
}

/// `11` Checkout.
///
/// SC renewal policy is `Y`, no-block is `N`, and the no-block due date slot
/// is left blank; the ACS decides due dates.
pub fn checkout(
    institution: &str,
    patron_barcode: &str,
    item_barcode: &str,
    patron_pin: Option<&str>,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let mut body = format!(
        "11YN{}{}AO{}|AA{}|AB{}|AC|",
        sip_timestamp(now),
        BLANK_TIMESTAMP,
        sanitize(institution),
        sanitize(patron_barcode),
        sanitize(item_barcode)
    );
    if let Some(pin) = patron_pin {
        body.push_str(&format!("AD{}|", sanitize(pin)));
    }
    checksum::append(&body, seq)
}

/// `09` Checkin.
///
/// The return date is the transaction date; this gateway does not backdate
/// returns.
pub fn checkin(
    institution: &str,
    item_barcode: &str,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let ts = sip_timestamp(now);
    let body = format!(
        "09N{ts}{ts}AO{}|AB{}|AC|",
        sanitize(institution),
        sanitize(item_barcode)
    );
    checksum::append(&body, seq)
}

/// `17` Item Information.
pub fn item_information(
    institution: &str,
    item_barcode: &str,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let body = format!(
        "17{}AO{}|AB{}|",
        sip_timestamp(now),
        sanitize(institution),
        sanitize(item_barcode)
    );
    checksum::append(&body, seq)
}

/// `29` Renew.
pub fn renew(
    institution: &str,
    patron_barcode: &str,
    item_barcode: &str,
    patron_pin: Option<&str>,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let mut body = format!(
        "29YN{}{}AO{}|AA{}|AB{}|",
        sip_timestamp(now),
        BLANK_TIMESTAMP,
        sanitize(institution),
        sanitize(patron_barcode),
        sanitize(item_barcode)
    );
    if let Some(pin) = patron_pin {
        body.push_str(&format!("AD{}|", sanitize(pin)));
    }
    checksum::append(&body, seq)
}

/// `37` Fee Paid.
///
/// The fixed currency field is padded to exactly three bytes; the `BH`
/// variable copy carries the trimmed form.
#[allow(clippy::too_many_arguments)]
pub fn fee_paid(
    institution: &str,
    patron_barcode: &str,
    fee_id: &str,
    amount: &str,
    fee_type: Option<&str>,
    payment_type: Option<&str>,
    currency: Option<&str>,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let currency = sanitize(currency.unwrap_or(DEFAULT_CURRENCY));
    let currency_trim: String = currency.trim().chars().take(3).collect();
    let body = format!(
        "37{}{}{}{currency_trim:<3}AO{}|AA{}|BK{}|BV{}|BH{currency_trim}|",
        sip_timestamp(now),
        code2(fee_type.unwrap_or(DEFAULT_FEE_TYPE)),
        code2(payment_type.unwrap_or(DEFAULT_PAYMENT_TYPE)),
        sanitize(institution),
        sanitize(patron_barcode),
        sanitize(fee_id),
        sanitize(amount)
    );
    checksum::append(&body, seq)
}

/// `63` Patron Information.
#[allow(clippy::too_many_arguments)]
pub fn patron_information(
    institution: &str,
    patron_barcode: &str,
    summary: PatronInfoSummary,
    start_item: Option<u16>,
    end_item: Option<u16>,
    language: Option<&str>,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let mut body = format!(
        "63{}{}{}AO{}|AA{}|",
        language_field(language),
        sip_timestamp(now),
        summary.encode(),
        sanitize(institution),
        sanitize(patron_barcode)
    );
    if let Some(start) = start_item {
        body.push_str(&format!("BP{start:04}|"));
    }
    if let Some(end) = end_item {
        body.push_str(&format!("BQ{end:04}|"));
    }
    checksum::append(&body, seq)
}

/// `15` Hold.
#[allow(clippy::too_many_arguments)]
pub fn hold(
    institution: &str,
    patron_barcode: &str,
    mode: HoldMode,
    item_barcode: Option<&str>,
    title_id: Option<&str>,
    pickup_location: Option<&str>,
    expiry_date: Option<&str>,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let mut body = format!("15{}{}", mode.as_char(), sip_timestamp(now));
    if let Some(expiry) = expiry_date {
        body.push_str(&format!("BW{}|", sanitize(expiry)));
    }
    body.push_str(&format!(
        "AO{}|AA{}|",
        sanitize(institution),
        sanitize(patron_barcode)
    ));
    if let Some(item) = item_barcode {
        body.push_str(&format!("AB{}|", sanitize(item)));
    }
    if let Some(title) = title_id {
        body.push_str(&format!("BT{}|", sanitize(title)));
    }
    if let Some(pickup) = pickup_location {
        body.push_str(&format!("BS{}|", sanitize(pickup)));
    }
    body.push_str("AC|");
    checksum::append(&body, seq)
}

/// `65` Renew All.
pub fn renew_all(
    institution: &str,
    patron_barcode: &str,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let ts = sip_timestamp(now);
    let body = format!(
        "65{ts}{ts}AO{}|AA{}|AC|",
        sanitize(institution),
        sanitize(patron_barcode)
    );
    checksum::append(&body, seq)
}

/// `35` End Session.
pub fn end_session(
    institution: &str,
    patron_barcode: &str,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let body = format!(
        "35{}AO{}|AA{}|AC|",
        sip_timestamp(now),
        sanitize(institution),
        sanitize(patron_barcode)
    );
    checksum::append(&body, seq)
}

/// `99` SC Status.
///
/// Status `0` (SC ok), max print width `080`, protocol version `2.00`.
pub fn sc_status(seq: u8) -> Result<String, ProtocolError> {
    checksum::append("9900802.00", seq)
}

/// `01` Block Patron.
pub fn block_patron(
    institution: &str,
    patron_barcode: &str,
    card_retained: bool,
    message: &str,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let body = format!(
        "01{}{}AO{}|AA{}|AC|AL{}|",
        if card_retained { 'Y' } else { 'N' },
        sip_timestamp(now),
        sanitize(institution),
        sanitize(patron_barcode),
        sanitize(message)
    );
    checksum::append(&body, seq)
}

/// `19` Item Status Update.
pub fn item_status_update(
    institution: &str,
    item_barcode: &str,
    marker: SecurityMarker,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let body = format!(
        "19{}{}AO{}|AB{}|",
        marker.as_char(),
        sip_timestamp(now),
        sanitize(institution),
        sanitize(item_barcode)
    );
    checksum::append(&body, seq)
}

/// `25` Patron Enable.
pub fn patron_enable(
    institution: &str,
    patron_barcode: &str,
    patron_pin: Option<&str>,
    now: DateTime<Utc>,
    seq: u8,
) -> Result<String, ProtocolError> {
    let mut body = format!(
        "25{}AO{}|AA{}|AC|",
        sip_timestamp(now),
        sanitize(institution),
        sanitize(patron_barcode)
    );
    if let Some(pin) = patron_pin {
        body.push_str(&format!("AD{}|", sanitize(pin)));
    }
    checksum::append(&body, seq)
}
