//! Benchmark suite for reading presentation.
//!
//! Isolates console formatting and JSON serialization from the async runtime
//! so the per-reading cost of each sink's encoding step can be compared.

use chrono::{TimeZone, Utc};
use co2_listener::{ConsoleExporter, MacAddress, Reading, decode_at};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::io;

const TEST_MAC: MacAddress = MacAddress([0xB0, 0xE9, 0xFE, 0x58, 0x74, 0xAE]);

/// Captured broadcast: CO2 812 ppm, 27.8 °C, 60 %
const PAYLOAD: [u8; 16] = [
    0xB0, 0xE9, 0xFE, 0x58, 0x74, 0xAE, 0x46, 0x64, 0x08, 0x9B, 0x3C, 0x00, 0x11, 0x03, 0x2C,
    0x00,
];

fn reading() -> Reading {
    let observed_at = Utc.with_ymd_and_hms(2025, 6, 15, 6, 37, 52).unwrap();
    decode_at(TEST_MAC, &PAYLOAD, observed_at).unwrap()
}

fn bench_console_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("console_format");
    group.throughput(Throughput::Elements(1));

    let reading = reading();

    let plain = ConsoleExporter::with_writer(false, Box::new(io::sink()));
    group.bench_function("plain", |b| {
        b.iter(|| black_box(plain.format(black_box(&reading))))
    });

    // Verbose adds the hex-encoded payload
    let verbose = ConsoleExporter::with_writer(true, Box::new(io::sink()));
    group.bench_function("verbose", |b| {
        b.iter(|| black_box(verbose.format(black_box(&reading))))
    });

    group.finish();
}

fn bench_json_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("json_record");
    group.throughput(Throughput::Elements(1));

    let reading = reading();
    group.bench_function("to_vec", |b| {
        b.iter(|| black_box(serde_json::to_vec(black_box(&reading)).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_console_format, bench_json_record);
criterion_main!(benches);
