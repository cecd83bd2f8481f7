//! mpscan 扫描性能基准测试.
//!
//! 覆盖帧头解码、帧链选择与整条扫描流水线.

use bytes::Bytes;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mpscan::format::mpeg::header;
use mpscan::format::{ChainResolver, ScanOptions};

/// 128kbps 44100Hz 帧, 负载填充伪随机字节
fn make_stream(frames: usize) -> Bytes {
    let mut data = Vec::with_capacity(frames * 417 + 128);
    let mut seed = 0x1234_5678u32;
    for _ in 0..frames {
        data.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        for _ in 0..413 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            // 避开 0xFF, 保证负载里没有伪同步
            data.push((seed >> 24) as u8 & 0xFE);
        }
    }
    data.extend_from_slice(b"TAG");
    data.resize(data.len() + 125, 0);
    Bytes::from(data)
}

fn bench_header_decode(c: &mut Criterion) {
    c.bench_function("header_decode_expand", |b| {
        b.iter(|| {
            let raw = header::decode(black_box(0xFFFB), black_box(0x9000), 0).unwrap();
            black_box(header::expand(&raw));
        });
    });
}

fn bench_chain_resolve(c: &mut Criterion) {
    let mut headers = Vec::new();
    let mut offset = 0u64;
    for i in 0..5000u64 {
        let h = header::decode(0xFFFB, 0x9000, offset).unwrap();
        offset = h.end();
        headers.push(h);
        if i % 13 == 0 {
            headers.push(header::decode(0xFFFB, 0x9000, offset - 200).unwrap());
        }
    }
    headers.sort();
    let resolver = ChainResolver::default();
    c.bench_function("chain_resolve_5000_noisy", |b| {
        b.iter(|| black_box(resolver.resolve(black_box(&headers))));
    });
}

fn bench_scan(c: &mut Criterion) {
    let data = make_stream(5000);
    c.bench_function("scan_full_5000_frames", |b| {
        b.iter(|| mpscan::scan_bytes(data.clone(), ScanOptions::default()).unwrap());
    });
    c.bench_function("scan_quick_5000_frames", |b| {
        b.iter(|| mpscan::scan_bytes(data.clone(), ScanOptions::quick()).unwrap());
    });
}

criterion_group!(
    benches,
    bench_header_decode,
    bench_chain_resolve,
    bench_scan
);
criterion_main!(benches);
