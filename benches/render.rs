//! Benchmarks for wire line rendering.

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use netlog::{DEFAULT_MAX_MESSAGE_LEN, DeviceIdentity, FixedAddress, MessageFormatter, Severity};

fn formatter() -> MessageFormatter {
    let identity = DeviceIdentity::new(FixedAddress([0x3c, 0x71, 0xbf, 0x0a, 0x22, 0x44]));
    MessageFormatter::new(Arc::new(identity), DEFAULT_MAX_MESSAGE_LEN)
}

fn bench_render(c: &mut Criterion) {
    let formatter = formatter();
    let body = "wifi (connect:42) associated with access point, rssi -61 dBm";
    let host_text = "\x1b[32mI (81234) wifi: associated with access point\x1b[39m\n";

    c.bench_function("render_full_line", |b| {
        b.iter(|| {
            formatter
                .render(true, true, black_box(Severity::Info), black_box(81_234), black_box(body))
                .expect("render")
        })
    });

    c.bench_function("render_host_text", |b| {
        b.iter(|| {
            formatter
                .render(true, false, Severity::Info, 0, black_box(host_text))
                .expect("render")
        })
    });

    let long_body = "x".repeat(4 * DEFAULT_MAX_MESSAGE_LEN);
    c.bench_function("render_truncated", |b| {
        b.iter(|| {
            formatter
                .render(false, true, Severity::Error, 1, black_box(&long_body))
                .expect("render")
        })
    });
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
