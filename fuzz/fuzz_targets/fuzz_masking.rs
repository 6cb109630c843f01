#![no_main]

//! Fuzz target for recursive payload masking.
//!
//! Attack surface: hostile key names, deep nesting, mixed value types.
//! Masking must never panic, must be deterministic, and must never let a
//! secret-category string value through unchanged.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use sip2gate::masking::MaskingService;

#[derive(Arbitrary, Debug)]
enum FuzzValue {
    Null,
    Bool(bool),
    Number(i64),
    Text(String),
    List(Vec<FuzzValue>),
    Map(Vec<(String, FuzzValue)>),
}

fn to_json(value: &FuzzValue, depth: usize) -> serde_json::Value {
    if depth > 24 {
        return serde_json::Value::Null;
    }
    match value {
        FuzzValue::Null => serde_json::Value::Null,
        FuzzValue::Bool(b) => serde_json::Value::Bool(*b),
        FuzzValue::Number(n) => serde_json::json!(n),
        FuzzValue::Text(s) => serde_json::Value::String(s.clone()),
        FuzzValue::List(items) => serde_json::Value::Array(
            items.iter().take(16).map(|v| to_json(v, depth + 1)).collect(),
        ),
        FuzzValue::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .take(16)
                .map(|(k, v)| (k.clone(), to_json(v, depth + 1)))
                .collect(),
        ),
    }
}

fuzz_target!(|input: FuzzValue| {
    let service = MaskingService::with_key(*b"0123456789abcdef0123456789abcdef");
    let payload = to_json(&input, 0);

    let Ok(masked_once) = service.mask_payload(&payload) else {
        unreachable!("keyed service never reports a missing key");
    };

    // Determinism: masking the same payload twice yields the same value.
    let masked_again = service.mask_payload(&payload).unwrap();
    assert_eq!(masked_once, masked_again);

    // No secret-category string survives verbatim.
    if let serde_json::Value::Object(map) = &masked_once {
        for (key, value) in map {
            let lower = key.to_ascii_lowercase();
            if (lower.contains("password") || lower.contains("pin")) && value.is_string() {
                assert_eq!(value, "********");
            }
        }
    }
});
