//! Criterion benchmarks for the CBUS ASCII codec.
//!
//! Run with:
//! ```bash
//! cargo bench --package cbus-core --bench codec_bench
//! ```

use cbus_core::protocol::codec::{decode_frame, dump, encode_frame};
use cbus_core::{Event, MajorPriority, MinorPriority, NumberBase, Opc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// ── Event fixtures ────────────────────────────────────────────────────────────

fn make_qnn() -> Event {
    Event::new(Opc::Qnn)
}

fn make_acon() -> Event {
    Event::new(Opc::Acon)
        .with_priority(MajorPriority::High, MinorPriority::High)
        .with_can_id(5)
        .with_node_number(1)
        .with_event_number(2)
}

fn make_acon3() -> Event {
    Event::new(Opc::Acon3)
        .with_can_id(0x7F)
        .with_node_number(0x0100)
        .with_event_number(0x0200)
        .with_data(4, 0xAA)
        .with_data(5, 0xBB)
        .with_data(6, 0xCC)
}

fn fixtures() -> Vec<(&'static str, Event)> {
    vec![("QNN", make_qnn()), ("ACON", make_acon()), ("ACON3", make_acon3())]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    for (name, event) in fixtures() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &event, |b, ev| {
            b.iter(|| encode_frame(black_box(ev)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");
    for (name, event) in fixtures() {
        let frame = encode_frame(&event);
        group.bench_with_input(BenchmarkId::from_parameter(name), &frame, |b, text| {
            b.iter(|| decode_frame(black_box(text)).expect("decode must succeed"))
        });
    }
    group.finish();
}

/// Dump runs on every frame when debug logging is enabled.
fn bench_dump(c: &mut Criterion) {
    let event = make_acon3();
    c.bench_function("dump_hex_ACON3", |b| {
        b.iter(|| dump(black_box(&event), NumberBase::Hex))
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_dump);
criterion_main!(benches);
