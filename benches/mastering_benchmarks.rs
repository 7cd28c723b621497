//! Mastering Benchmarks
//!
//! Throughput of the convolution paths, the peak chain and a full job.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use auralmind::convolve::{Alignment, ConvolutionEngine, SpectrumCache};
use auralmind::engine::generate_sine_sweep;
use auralmind::eq::{CurveDesigner, FirFilter};
use auralmind::peak::{LimiterParams, PeakChain, SoftClipParams};
use auralmind::{CancellationToken, MasteringEngine, MasteringJob, Preset};

fn benchmark_convolution(c: &mut Criterion) {
    let buffer = generate_sine_sweep(20.0, 20000.0, 0.5, 10.0, 48000);
    let preset = Preset::default();
    let curve = CurveDesigner::new(preset.curve).design(&buffer, None).unwrap();
    let filter = FirFilter::design(&curve, preset.fir_taps, 48000).unwrap();
    let engine = ConvolutionEngine::new(Arc::new(SpectrumCache::default()));

    c.bench_function("overlap_save_4097_taps_10s", |b| {
        b.iter(|| engine.apply(black_box(&buffer), &filter, Alignment::Same).unwrap())
    });

    let short = generate_sine_sweep(20.0, 20000.0, 0.5, 0.005, 48000);
    let small = FirFilter::design(&curve, 101, 48000).unwrap();
    c.bench_function("direct_101_taps_5ms", |b| {
        b.iter(|| engine.apply(black_box(&short), &small, Alignment::Same).unwrap())
    });
}

fn benchmark_peak_chain(c: &mut Criterion) {
    let mut buffer = generate_sine_sweep(20.0, 20000.0, 0.5, 10.0, 48000);
    buffer.apply_gain(2.0);
    let chain = PeakChain::new(-1.0, Some(SoftClipParams::default()), LimiterParams::default());

    c.bench_function("peak_chain_10s", |b| b.iter(|| chain.process(black_box(&buffer))));
}

fn benchmark_full_job(c: &mut Criterion) {
    let job = MasteringJob::new(
        generate_sine_sweep(20.0, 20000.0, 0.5, 5.0, 48000),
        Preset::default(),
    );
    let engine = MasteringEngine::default();

    c.bench_function("master_hi_fi_streaming_5s", |b| {
        b.iter(|| engine.master(black_box(&job), &CancellationToken::new()).unwrap())
    });
}

criterion_group!(benches, benchmark_convolution, benchmark_peak_chain, benchmark_full_job);
criterion_main!(benches);
