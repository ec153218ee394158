use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use lan_audio_link::audio::{FrameRing, SampleFormat};

/// Device-sized chunks in, codec-sized frames out
fn regroup(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_ring");

    // 441-frame chunks regrouped into 10 ms and 20 ms stereo s16 frames
    let chunk = vec![0x5Au8; 441 * 4];
    for frame_bytes in [480 * 4, 960 * 4] {
        group.throughput(Throughput::Bytes(chunk.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(frame_bytes),
            &frame_bytes,
            |b, &frame_bytes| {
                let mut ring = FrameRing::for_audio(2, 48000, 2, SampleFormat::S16Le);
                b.iter(|| {
                    ring.write(black_box(&chunk)).ok();
                    while let Some(frame) = ring.read_frame(frame_bytes) {
                        black_box(frame);
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, regroup);
criterion_main!(benches);
