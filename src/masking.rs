//! PII masking for transaction events.
//!
//! Patron and item identifiers must never leave the protocol engine in the
//! clear, but operators still need to correlate events about the same
//! patron. [`MaskingService::mask`] therefore produces a deterministic
//! one-way token: HMAC-SHA-256 under a process-wide master key, truncated to
//! sixteen hex characters. Secrets (passwords, PINs) carry no correlation
//! value and are flattened to asterisks instead.
//!
//! [`MaskingService::mask_payload`] applies these rules recursively over a
//! `serde_json::Value`, returning a new value and leaving the input intact.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// Environment variable holding the hex-encoded master key.
pub const MASTER_KEY_ENV: &str = "SIP2GATE_MASTER_KEY";

/// Minimum master key length in hex digits (16 raw bytes).
const MIN_KEY_HEX_DIGITS: usize = 32;

/// Replacement for secret-category values.
const SECRET_PLACEHOLDER: &str = "********";

/// Recursion guard for hostile payloads; matches the JSON depth cap used
/// elsewhere in the gateway.
const MAX_MASK_DEPTH: usize = 64;

/// Deterministic PII masking under a process-wide master key.
///
/// The service can be constructed without a key, in which case [`mask`]
/// fails with [`GatewayError::MasterKeyMissing`]; the dashboard redaction
/// path falls back to asterisks in that case.
///
/// [`mask`]: MaskingService::mask
#[derive(Clone)]
pub struct MaskingService {
    key: Option<Vec<u8>>,
}

impl std::fmt::Debug for MaskingService {
    // The master key must never reach logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskingService")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl MaskingService {
    /// Creates a service from raw key bytes.
    #[must_use]
    pub fn with_key(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }

    /// Creates a keyless service; [`MaskingService::mask`] will fail until a
    /// key is configured.
    #[must_use]
    pub fn without_key() -> Self {
        Self { key: None }
    }

    /// Loads the master key from [`MASTER_KEY_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MasterKeyMissing`] when the variable is
    /// absent, not hex, or shorter than 32 hex digits.
    pub fn from_env() -> Result<Self, GatewayError> {
        let raw = std::env::var(MASTER_KEY_ENV).map_err(|_| GatewayError::MasterKeyMissing)?;
        let trimmed = raw.trim();
        if trimmed.len() < MIN_KEY_HEX_DIGITS {
            return Err(GatewayError::MasterKeyMissing);
        }
        let key = hex::decode(trimmed).map_err(|_| GatewayError::MasterKeyMissing)?;
        Ok(Self::with_key(key))
    }

    /// Whether a master key is configured.
    #[must_use]
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Deterministically masks an identifier.
    ///
    /// Empty input is returned unchanged; anything else becomes
    /// `MASKED_<hex16>` where the hex is the truncated HMAC-SHA-256 of the
    /// input under the master key.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MasterKeyMissing`] when no key is configured.
    pub fn mask(&self, value: &str) -> Result<String, GatewayError> {
        if value.is_empty() {
            return Ok(String::new());
        }
        let key = self.key.as_ref().ok_or(GatewayError::MasterKeyMissing)?;
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(key).map_err(|_| GatewayError::MasterKeyMissing)?;
        mac.update(value.as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        Ok(format!("MASKED_{}", &digest[..16]))
    }

    /// Recursively masks sensitive fields of a structured payload.
    ///
    /// Mapping keys are categorized case-insensitively:
    /// - secret keys (containing `password` or `pin`, or equal to `CQ`/`CO`)
    ///   have string values replaced with `********`;
    /// - identifier keys (containing `patronidentifier`, `patronbarcode`,
    ///   `itemidentifier`, `itembarcode`, `personalname`, or equal to
    ///   `AA`/`AB`/`AE`) have string values replaced with [`mask`];
    /// - everything else is recursed into.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MasterKeyMissing`] when an identifier field
    /// needs masking and no key is configured.
    ///
    /// [`mask`]: MaskingService::mask
    pub fn mask_payload(&self, payload: &Value) -> Result<Value, GatewayError> {
        self.mask_value(payload, 0)
    }

    fn mask_value(&self, value: &Value, depth: usize) -> Result<Value, GatewayError> {
        if depth > MAX_MASK_DEPTH {
            // Below the cap nothing sensitive can be named anymore; stop
            // descending rather than overflow on hostile nesting.
            return Ok(value.clone());
        }
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, v) in map {
                    out.insert(key.clone(), self.mask_entry(key, v, depth)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let masked: Result<Vec<Value>, GatewayError> = items
                    .iter()
                    .map(|v| self.mask_value(v, depth + 1))
                    .collect();
                Ok(Value::Array(masked?))
            }
            primitive => Ok(primitive.clone()),
        }
    }

    fn mask_entry(&self, key: &str, value: &Value, depth: usize) -> Result<Value, GatewayError> {
        if is_secret_key(key) {
            return Ok(match value {
                Value::String(_) => Value::String(SECRET_PLACEHOLDER.to_string()),
                other => other.clone(),
            });
        }
        if is_identifier_key(key) {
            return Ok(match value {
                Value::String(s) => Value::String(self.mask(s)?),
                other => other.clone(),
            });
        }
        self.mask_value(value, depth + 1)
    }
}

fn is_secret_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.contains("password") || lower.contains("pin") || key == "CQ" || key == "CO"
}

fn is_identifier_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.contains("patronidentifier")
        || lower.contains("patronbarcode")
        || lower.contains("itemidentifier")
        || lower.contains("itembarcode")
        || lower.contains("personalname")
        // Typed records spell the AE field `patronName`; a name is PII
        // whichever key carries it.
        || lower.contains("patronname")
        || key == "AA"
        || key == "AB"
        || key == "AE"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> MaskingService {
        MaskingService::with_key(*b"0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn test_mask_is_deterministic() {
        let svc = service();
        let a = svc.mask("P12345").unwrap();
        let b = svc.mask("P12345").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("MASKED_"));
        assert_eq!(a.len(), "MASKED_".len() + 16);
    }

    #[test]
    fn test_distinct_inputs_mask_differently() {
        let svc = service();
        assert_ne!(svc.mask("P12345").unwrap(), svc.mask("P12346").unwrap());
    }

    #[test]
    fn test_distinct_keys_mask_differently() {
        let a = MaskingService::with_key(*b"0123456789abcdef0123456789abcdef");
        let b = MaskingService::with_key(*b"fedcba9876543210fedcba9876543210");
        assert_ne!(a.mask("P12345").unwrap(), b.mask("P12345").unwrap());
    }

    #[test]
    fn test_empty_string_passes_through() {
        assert_eq!(service().mask("").unwrap(), "");
    }

    #[test]
    fn test_mask_without_key_fails() {
        let svc = MaskingService::without_key();
        assert_eq!(svc.mask("P12345"), Err(GatewayError::MasterKeyMissing));
        // Empty input short-circuits before the key check.
        assert_eq!(svc.mask(""), Ok(String::new()));
    }

    #[test]
    fn test_payload_masks_identifiers_and_secrets() {
        let svc = service();
        let payload = json!({
            "patronBarcode": "P12345",
            "password": "x",
            "patronPin": "9876",
            "note": "unrelated",
        });
        let masked = svc.mask_payload(&payload).unwrap();
        assert_eq!(masked["patronBarcode"], svc.mask("P12345").unwrap());
        assert_eq!(masked["password"], "********");
        assert_eq!(masked["patronPin"], "********");
        assert_eq!(masked["note"], "unrelated");
    }

    #[test]
    fn test_payload_masking_is_idempotent_for_secrets() {
        let svc = service();
        let payload = json!({"patronBarcode": "P12345", "password": "x"});
        let once = svc.mask_payload(&payload).unwrap();
        let twice = svc.mask_payload(&once).unwrap();
        // The already-masked barcode re-masks to a new token, but the secret
        // stays asterisks; callers mask exactly once on the emit path.
        assert_eq!(twice["password"], "********");
    }

    #[test]
    fn test_payload_recurses_into_nested_structures() {
        let svc = service();
        let payload = json!({
            "request": {"itemBarcode": "ITEM789", "list": [{"AE": "Alice Valid"}]},
            "count": 3,
        });
        let masked = svc.mask_payload(&payload).unwrap();
        assert_eq!(
            masked["request"]["itemBarcode"],
            svc.mask("ITEM789").unwrap()
        );
        assert_eq!(
            masked["request"]["list"][0]["AE"],
            svc.mask("Alice Valid").unwrap()
        );
        assert_eq!(masked["count"], 3);
    }

    #[test]
    fn test_sip_tag_keys_are_case_sensitive() {
        let svc = service();
        let payload = json!({"AA": "P1", "aa": "not-a-tag", "CO": "secret"});
        let masked = svc.mask_payload(&payload).unwrap();
        assert_eq!(masked["AA"], svc.mask("P1").unwrap());
        assert_eq!(masked["aa"], "not-a-tag");
        assert_eq!(masked["CO"], "********");
    }

    #[test]
    fn test_non_string_sensitive_values_pass_unchanged() {
        let svc = service();
        let payload = json!({"password": 1234, "patronBarcode": null});
        let masked = svc.mask_payload(&payload).unwrap();
        assert_eq!(masked["password"], 1234);
        assert_eq!(masked["patronBarcode"], Value::Null);
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let svc = service();
        let mut value = json!("leaf");
        for _ in 0..200 {
            value = json!({"inner": value});
        }
        // Must not panic; values beyond the cap are passed through.
        let masked = svc.mask_payload(&value).unwrap();
        assert!(masked.is_object());
    }

    #[test]
    fn test_payload_with_identifier_but_no_key_fails() {
        let svc = MaskingService::without_key();
        let payload = json!({"patronBarcode": "P12345"});
        assert_eq!(
            svc.mask_payload(&payload),
            Err(GatewayError::MasterKeyMissing)
        );
    }
}
