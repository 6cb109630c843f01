//! Typed SIP2 response records.
//!
//! One struct per response variant, produced by the parser and serialized
//! (camelCase) into transaction events and API responses. Two fields are
//! universal: `screen_messages` collects every `AF` occurrence in order, and
//! `extensions` carries unknown vendor tags as a plain string map, omitted
//! when empty.
//!
//! Inbound timestamps stay opaque 18-byte strings; they are never parsed
//! into instants.

use std::collections::BTreeMap;

use serde::Serialize;

/// The fourteen fixed-position patron status flags of responses `24`, `26`,
/// and `64`. `Y` maps to `true`, anything else (including truncation) to
/// `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatronStatusFlags {
    pub charge_privileges_denied: bool,
    pub renewal_privileges_denied: bool,
    pub recall_privileges_denied: bool,
    pub hold_privileges_denied: bool,
    pub card_reported_lost: bool,
    pub too_many_items_charged: bool,
    pub too_many_items_overdue: bool,
    pub too_many_renewals: bool,
    pub too_many_claims_of_items_returned: bool,
    pub too_many_items_lost: bool,
    pub excessive_outstanding_fines: bool,
    pub excessive_outstanding_fees: bool,
    pub recall_overdue: bool,
    pub too_many_items_billed: bool,
}

/// Patron Status response (`24`), also produced by Patron Enable (`26`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatronStatusRecord {
    pub flags: PatronStatusFlags,
    pub language: String,
    pub transaction_date: String,
    pub institution_id: String,
    pub patron_barcode: String,
    pub patron_name: String,
    pub valid_patron: bool,
    pub hold_items_count: u32,
    pub overdue_items_count: u32,
    pub charged_items_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_items: Option<String>,
    /// `AU`, one entry per occurrence, in frame order.
    pub charged_items: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_holds_count: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_line: Option<String>,
    pub screen_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
    /// Trailer sequence digit, for diagnostics only.
    #[serde(skip)]
    pub sequence: Option<u8>,
}

/// Checkout response (`12`), also produced by Renew (`30`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRecord {
    pub ok: bool,
    pub renewal_ok: bool,
    /// `Y`/`N`/`U` as received.
    pub magnetic_media: char,
    /// `Y`/`N`/`U` as received.
    pub desensitize: char,
    pub transaction_date: String,
    pub institution_id: String,
    pub patron_barcode: String,
    pub item_barcode: String,
    pub title_identifier: String,
    /// Opaque due date string as sent by the LMS.
    pub due_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_line: Option<String>,
    pub screen_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub sequence: Option<u8>,
}

/// Checkin response (`10`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinRecord {
    pub ok: bool,
    pub resensitize: bool,
    /// `Y`/`N`/`U` as received.
    pub magnetic_media: char,
    pub alert: bool,
    pub transaction_date: String,
    pub institution_id: String,
    pub item_barcode: String,
    pub title_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permanent_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_line: Option<String>,
    pub screen_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub sequence: Option<u8>,
}

/// Item Information response (`18`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInfoRecord {
    pub circulation_status: u32,
    pub security_marker: u32,
    pub fee_type: u32,
    pub transaction_date: String,
    pub institution_id: String,
    pub item_barcode: String,
    pub title_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub screen_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub sequence: Option<u8>,
}

/// Fee Paid response (`38`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePaidRecord {
    pub payment_accepted: bool,
    pub transaction_date: String,
    pub institution_id: String,
    pub patron_barcode: String,
    /// LMS-assigned transaction id (`BK`).
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_type: Option<String>,
    pub screen_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub sequence: Option<u8>,
}

/// Patron Information response (`64`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatronInfoRecord {
    pub flags: PatronStatusFlags,
    pub language: String,
    pub transaction_date: String,
    pub hold_items_count: u32,
    pub overdue_items_count: u32,
    pub charged_items_count: u32,
    pub fine_items_count: u32,
    pub recall_items_count: u32,
    pub unavailable_holds_count: u32,
    pub institution_id: String,
    pub patron_barcode: String,
    pub patron_name: String,
    pub valid_patron: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_address: Option<String>,
    /// `BJ`, one entry per occurrence, in frame order.
    pub hold_items: Vec<String>,
    /// `AT`, one entry per occurrence, in frame order.
    pub overdue_items: Vec<String>,
    /// `AU`, one entry per occurrence, in frame order.
    pub charged_items: Vec<String>,
    /// `AV`, one entry per occurrence, in frame order.
    pub fine_items: Vec<String>,
    /// `BU`, one entry per occurrence, in frame order.
    pub recall_items: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_item: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_item: Option<String>,
    pub screen_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub sequence: Option<u8>,
}

/// Hold response (`16`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldRecord {
    pub ok: bool,
    pub available: bool,
    pub transaction_date: String,
    pub institution_id: String,
    pub patron_barcode: String,
    pub item_barcode: String,
    pub title_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_line: Option<String>,
    pub screen_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub sequence: Option<u8>,
}

/// Renew All response (`66`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewAllRecord {
    pub ok: bool,
    pub renewed_count: u32,
    pub unrenewed_count: u32,
    pub transaction_date: String,
    pub institution_id: String,
    pub patron_barcode: String,
    /// `BM`, one entry per renewed item.
    pub renewed_items: Vec<String>,
    /// `BN`, one entry per unrenewed item.
    pub unrenewed_items: Vec<String>,
    pub screen_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub sequence: Option<u8>,
}

/// End Session response (`36`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRecord {
    pub end_session: bool,
    pub transaction_date: String,
    pub institution_id: String,
    pub patron_barcode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_line: Option<String>,
    pub screen_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub sequence: Option<u8>,
}

/// ACS Status response (`98`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcsStatusRecord {
    pub on_line: bool,
    pub checkin_ok: bool,
    pub checkout_ok: bool,
    pub acs_renewal_policy: bool,
    pub status_update_ok: bool,
    pub offline_ok: bool,
    pub timeout_period: u32,
    pub retries_allowed: u32,
    /// Opaque ACS clock string.
    pub date_time_sync: String,
    pub protocol_version: String,
    pub institution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_messages: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_location: Option<String>,
    pub screen_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub sequence: Option<u8>,
}

/// Item Status Update response (`20`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatusUpdateRecord {
    pub item_properties_ok: bool,
    pub transaction_date: String,
    pub institution_id: String,
    pub item_barcode: String,
    pub title_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_line: Option<String>,
    pub screen_messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub sequence: Option<u8>,
}

/// Any parsed SIP2 response, tagged by command code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SipResponse {
    PatronStatus(PatronStatusRecord),
    Checkout(CheckoutRecord),
    Checkin(CheckinRecord),
    ItemInfo(ItemInfoRecord),
    FeePaid(FeePaidRecord),
    PatronInfo(PatronInfoRecord),
    Hold(HoldRecord),
    RenewAll(RenewAllRecord),
    EndSession(EndSessionRecord),
    AcsStatus(AcsStatusRecord),
    ItemStatusUpdate(ItemStatusUpdateRecord),
}

macro_rules! first_screen_message {
    ($($record:ty),+ $(,)?) => {
        $(
            impl $record {
                /// First `AF` screen message, if any.
                #[must_use]
                pub fn screen_message(&self) -> Option<&str> {
                    self.screen_messages.first().map(String::as_str)
                }
            }
        )+
    };
}

first_screen_message!(
    PatronStatusRecord,
    CheckoutRecord,
    CheckinRecord,
    ItemInfoRecord,
    FeePaidRecord,
    PatronInfoRecord,
    HoldRecord,
    RenewAllRecord,
    EndSessionRecord,
    AcsStatusRecord,
    ItemStatusUpdateRecord,
);
