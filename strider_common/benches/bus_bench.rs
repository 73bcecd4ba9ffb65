//! Message bus and hand-off latency benchmarks.
//!
//! Measures uncontended post/receive cost and the cyclic-side hand-off
//! operations. Target: offer/take ≤ 1µs, post+receive ≤ 5µs.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use strider_common::bridge::Handoff;
use strider_common::bus::MsgBus;
use strider_common::msg::Msg;
use strider_common::telemetry::TelemetrySample;

fn bench_post_receive(c: &mut Criterion) {
    let bus = MsgBus::new();
    let payload = [0u8; 64];

    c.bench_function("bus_post_receive_64b", |b| {
        b.iter(|| {
            bus.post(Msg::with_payload(1, black_box(&payload)));
            black_box(bus.receive());
        });
    });
}

fn bench_handoff_offer_take(c: &mut Criterion) {
    let cell = Handoff::new();

    c.bench_function("handoff_offer_take_sample", |b| {
        b.iter(|| {
            cell.offer(black_box(TelemetrySample::default()));
            black_box(cell.take());
        });
    });
}

criterion_group!(benches, bench_post_receive, bench_handoff_offer_take);
criterion_main!(benches);
