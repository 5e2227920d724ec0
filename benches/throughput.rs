//! Throughput benchmarks

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tekcap_core::core::error::CaptureError;
use tekcap_core::core::events::ChannelSink;
use tekcap_core::core::protocol::{decode_run, PixelRun};
use tekcap_core::core::raster::Raster;
use tekcap_core::core::session::SessionControl;
use tekcap_core::core::simulator::{ScopeSimulator, TestPattern};
use tekcap_core::core::state_machine::{CaptureEngine, CaptureState, CaptureTiming};
use tekcap_core::core::transport::{MemoryFeed, MemoryOpener, PortSession, PortSettings};

fn codec_benchmark(c: &mut Criterion) {
    let raster = TestPattern::Checker.render(552, 704);
    let runs = ScopeSimulator::runs(&raster);
    let body = ScopeSimulator::encode_runs(&runs);

    let mut group = c.benchmark_group("rle");
    group.throughput(Throughput::Bytes(body.len() as u64));

    group.bench_function("decode", |b| {
        b.iter(|| {
            let mut bytes = black_box(&body).iter().copied();
            let mut decoded = 0u64;
            while let Some(first) = bytes.next() {
                let run = decode_run(first, || bytes.next().ok_or(CaptureError::Timeout)).unwrap();
                decoded += run.pixels();
            }
            black_box(decoded)
        })
    });

    group.bench_function("encode", |b| {
        b.iter(|| black_box(ScopeSimulator::encode_runs(black_box(&runs))))
    });

    group.finish();
}

fn raster_benchmark(c: &mut Criterion) {
    let runs = ScopeSimulator::runs(&TestPattern::Bars.render(552, 704));
    let batches: Vec<Vec<PixelRun>> = runs.chunks(25).map(<[PixelRun]>::to_vec).collect();

    let mut group = c.benchmark_group("raster");
    group.throughput(Throughput::Elements(552 * 704));

    group.bench_function("assemble", |b| {
        let mut raster = Raster::scope();
        b.iter(|| {
            raster.new_page();
            for batch in &batches {
                raster.apply_runs(black_box(batch));
            }
            black_box(raster.is_complete())
        })
    });

    group.finish();
}

fn engine_benchmark(c: &mut Criterion) {
    let stream = ScopeSimulator::new().capture(&TestPattern::Checker.render(552, 704));

    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("full_capture", |b| {
        b.iter(|| {
            let feed = MemoryFeed::new();
            feed.push(&stream);
            let opener = MemoryOpener::new(feed.clone()).keep_input_on_clear();
            let port = PortSession::new(Box::new(opener), PortSettings::default());
            let (sink, events) = ChannelSink::unbounded();
            let timing = CaptureTiming {
                data_poll_interval: Duration::ZERO,
                ..CaptureTiming::default()
            };
            let mut engine = CaptureEngine::new(port, sink, Arc::new(SessionControl::new("bench")), timing);

            while engine.completed_captures() == 0 {
                engine.step();
                if engine.state() == CaptureState::AwaitHeader && feed.is_empty() && engine.buffered() == 0 {
                    break;
                }
            }
            black_box(events.len())
        })
    });

    group.finish();
}

criterion_group!(benches, codec_benchmark, raster_benchmark, engine_benchmark);
criterion_main!(benches);
