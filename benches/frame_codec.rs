//! SIP2 codec micro-benchmarks.
//!
//! Tracks the formatter and parser hot paths with small and field-heavy
//! frames.
//!
//! # Usage
//! ```bash
//! cargo bench --bench frame_codec
//! ```

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use chrono::{TimeZone, Utc};
use sip2gate::protocol::formatter::{self, PatronInfoSummary};
use sip2gate::protocol::{checksum, parser};

fn fixed_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
}

/// Minimal patron status response (~70 bytes).
fn small_response() -> String {
    let body = "24              00120240115    093000AOMAIN|AAP12345|AEAlice Valid|BLY|";
    checksum::append(body, 0).unwrap()
}

/// Patron information response with item lists (~500 bytes).
fn large_response() -> String {
    let mut body = String::from(
        "64              00120240115    093000001000050000000000000000AOMAIN|AAP12345|AEAlice Valid|BLY|BEalice@example.org|",
    );
    for i in 0..10 {
        body.push_str(&format!("AUcharged-item-{i:04}|"));
    }
    for i in 0..5 {
        body.push_str(&format!("AToverdue-item-{i:04}|"));
    }
    body.push_str("XZvendor-extension-tag|");
    checksum::append(&body, 3).unwrap()
}

fn bench_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("format");
    let now = fixed_now();

    group.bench_function("patron_status", |b| {
        b.iter(|| formatter::patron_status("MAIN", "P12345", None, now, 0).unwrap())
    });
    group.bench_function("patron_information", |b| {
        b.iter(|| {
            formatter::patron_information(
                "MAIN",
                "P12345",
                PatronInfoSummary {
                    charged: true,
                    ..Default::default()
                },
                Some(1),
                Some(50),
                None,
                now,
                4,
            )
            .unwrap()
        })
    });
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for (label, frame) in [("small", small_response()), ("large", large_response())] {
        group.bench_with_input(BenchmarkId::new("response", label), &frame, |b, frame| {
            b.iter(|| parser::parse_response(frame).unwrap())
        });
    }
    group.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let frame = large_response();
    c.bench_function("checksum_verify", |b| {
        b.iter(|| checksum::verify(&frame).unwrap())
    });
}

criterion_group!(benches, bench_format, bench_parse, bench_checksum);
criterion_main!(benches);
