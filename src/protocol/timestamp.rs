//! SIP2 transaction timestamps.
//!
//! SIP2 dates are a fixed 18-byte layout: `YYYYMMDD` + four spaces +
//! `HHMMSS`, always UTC. Inbound timestamps are opaque strings and are never
//! parsed back into instants; clock skew against the LMS must not matter.

use chrono::{DateTime, Utc};

/// Length of a SIP2 timestamp field in bytes.
pub const SIP_TIMESTAMP_LEN: usize = 18;

/// An 18-byte run of spaces, used where a command reserves a timestamp slot
/// it does not fill (no-block due dates).
pub const BLANK_TIMESTAMP: &str = "                  ";

/// Renders an instant in the fixed SIP2 layout.
///
/// Callers pass the clock value in rather than sampling it here, so frame
/// builders stay deterministic under test.
#[must_use]
pub fn sip_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d    %H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_layout_is_eighteen_bytes() {
        let ts = sip_timestamp(Utc.with_ymd_and_hms(2024, 1, 15, 9, 5, 7).unwrap());
        assert_eq!(ts.len(), SIP_TIMESTAMP_LEN);
        assert_eq!(ts, "20240115    090507");
    }

    #[test]
    fn test_blank_timestamp_width_matches() {
        assert_eq!(BLANK_TIMESTAMP.len(), SIP_TIMESTAMP_LEN);
    }

    #[test]
    fn test_zero_padding() {
        let ts = sip_timestamp(Utc.with_ymd_and_hms(2023, 12, 3, 0, 0, 9).unwrap());
        assert_eq!(ts, "20231203    000009");
    }
}
