//! Parser and screen model benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use gridterm::buffer::ScreenBuffer;
use gridterm::parser::EscapeProcessor;

fn bench_parse_plain_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");

    // Plain ASCII text
    let plain_text = "Hello, World! ".repeat(1000);
    group.throughput(Throughput::Bytes(plain_text.len() as u64));

    group.bench_function("plain_text", |b| {
        b.iter(|| {
            let mut processor = EscapeProcessor::new();
            for &byte in black_box(plain_text.as_bytes()) {
                black_box(processor.input(byte));
            }
        })
    });

    group.finish();
}

fn bench_parse_csi_sequences(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");

    // CSI sequences (cursor movement, SGR)
    let csi_heavy = "\x1b[1;31mRed\x1b[0m \x1b[5;10H\x1b[2J".repeat(100);
    group.throughput(Throughput::Bytes(csi_heavy.len() as u64));

    group.bench_function("csi_sequences", |b| {
        b.iter(|| {
            let mut processor = EscapeProcessor::new();
            for &byte in black_box(csi_heavy.as_bytes()) {
                black_box(processor.input(byte));
            }
        })
    });

    group.finish();
}

fn bench_screen_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("screen");

    // Mixed content (typical terminal output)
    let mixed = "Line 1: \x1b[32mOK\x1b[0m\r\nLine 2: \x1b[31mERROR\x1b[0m\r\n".repeat(500);
    group.throughput(Throughput::Bytes(mixed.len() as u64));

    group.bench_function("mixed_content", |b| {
        b.iter(|| {
            let mut buffer = ScreenBuffer::new(80, 24);
            buffer.stdout(black_box(mixed.as_bytes()));
            black_box(buffer.snapshot())
        })
    });

    group.finish();
}

fn bench_screen_utf8(c: &mut Criterion) {
    let mut group = c.benchmark_group("screen");

    // UTF-8 content with wide glyphs
    let utf8 = "Hello, 世界! 🎉 ".repeat(500);
    group.throughput(Throughput::Bytes(utf8.len() as u64));

    group.bench_function("utf8_content", |b| {
        b.iter(|| {
            let mut buffer = ScreenBuffer::new(80, 24);
            buffer.stdout(black_box(utf8.as_bytes()));
            black_box(buffer.snapshot())
        })
    });

    group.finish();
}

fn bench_screen_reflow(c: &mut Criterion) {
    let mut group = c.benchmark_group("screen");

    let content = "The quick brown fox jumps over the lazy dog. ".repeat(200);

    group.bench_function("resize_reflow", |b| {
        b.iter(|| {
            let mut buffer = ScreenBuffer::new(80, 24);
            buffer.stdout(black_box(content.as_bytes()));
            buffer.resize(47, 24);
            buffer.resize(80, 24);
            black_box(buffer.total_rows())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_plain_text,
    bench_parse_csi_sequences,
    bench_screen_mixed,
    bench_screen_utf8,
    bench_screen_reflow
);

criterion_main!(benches);
