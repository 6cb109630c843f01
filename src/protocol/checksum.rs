//! SIP2 frame checksum and trailer handling.
//!
//! A SIP2 trailer is `AY<d>AZ<HHHH>\r`: a single-digit sequence number and a
//! four-digit uppercase hex checksum. The checksum is the two's complement of
//! the 16-bit byte sum of everything up to and including `AZ`.
//!
//! These are pure functions with no I/O; the client calls [`verify`] on every
//! inbound frame and the formatter calls [`append`] on every outbound one.

use crate::error::ProtocolError;

/// Computes the SIP2 checksum over a message prefix.
///
/// Characters are summed by code point, which matches byte summing for the
/// ASCII frames we emit and for ISO-8859-1 decoded inbound frames.
fn compute(message: &str) -> u16 {
    let sum: u32 = message.chars().map(|c| c as u32).sum();
    (sum as u16).wrapping_neg()
}

/// Appends the `AY<seq>AZ<hex4>\r` trailer to a frame body.
///
/// The checksum covers `body + "AY" + seq + "AZ"`.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidSequence`] when `seq` is not a single
/// decimal digit.
pub fn append(body: &str, seq: u8) -> Result<String, ProtocolError> {
    if seq > 9 {
        return Err(ProtocolError::InvalidSequence { seq });
    }
    let mut frame = format!("{body}AY{seq}AZ");
    let checksum = compute(&frame);
    frame.push_str(&format!("{checksum:04X}"));
    frame.push('\r');
    Ok(frame)
}

/// Verifies the checksum of an inbound frame.
///
/// The frame must end (ignoring one optional trailing `\r`) with `AZ<hex4>`,
/// where the hex digits may be any case. Returns `Ok(true)` when the
/// recomputed checksum matches, `Ok(false)` when it differs.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedTrailer`] when the frame does not end
/// with an `AZ<hex4>` suffix at all.
pub fn verify(frame: &str) -> Result<bool, ProtocolError> {
    let frame = frame.strip_suffix('\r').unwrap_or(frame);
    let chars: Vec<char> = frame.chars().collect();
    if chars.len() < 6 {
        return Err(ProtocolError::MalformedTrailer);
    }

    let hex = &chars[chars.len() - 4..];
    let az = &chars[chars.len() - 6..chars.len() - 4];
    if az != ['A', 'Z'] || !hex.iter().all(char::is_ascii_hexdigit) {
        return Err(ProtocolError::MalformedTrailer);
    }

    let hex: String = hex.iter().collect();
    // The digit check above guarantees this parse succeeds.
    let declared = u16::from_str_radix(&hex, 16).map_err(|_| ProtocolError::MalformedTrailer)?;
    let prefix: String = chars[..chars.len() - 4].iter().collect();
    Ok(compute(&prefix) == declared)
}
