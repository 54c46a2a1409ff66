//! Framing, compression and encryption benchmarks.

use bytes::{Bytes, BytesMut};
use craftwire_protocol::cipher::cipher_pair;
use craftwire_protocol::frame::Frame;
use craftwire_protocol::{FrameDecoder, FrameEncoder, DEFAULT_COMPRESSION_THRESHOLD};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const SECRET: &[u8] = b"0123456789abcdef";

fn body(size: usize) -> Vec<u8> {
    // Mildly repetitive, like real packet bodies.
    (0..size).map(|i| (i % 61) as u8).collect()
}

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [100, 1000, 10000] {
        let frame = Frame::new(Bytes::from(body(size)));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(frame.encode().unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for size in [100, 1000, 10000] {
        let encoded = Frame::new(Bytes::from(body(size))).encode().unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = encoded.clone();
                black_box(Frame::decode(&mut buf).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_compressed_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("compressed_roundtrip");

    for size in [100, 1000, 10000] {
        let data = body(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let mut encoder = FrameEncoder::new();
                encoder.set_compression(Some(DEFAULT_COMPRESSION_THRESHOLD));
                let wire = encoder.encode(data).unwrap();

                let mut decoder = FrameDecoder::new();
                decoder.set_compression(Some(DEFAULT_COMPRESSION_THRESHOLD));
                decoder.extend(&wire);
                black_box(decoder.decode_payload().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_encrypted_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("encrypted_stream");

    for chunk in [16, 256, 4096] {
        let mut plain = FrameEncoder::new();
        let (enc, _) = cipher_pair(SECRET).unwrap();
        plain.enable_encryption(enc);
        let mut wire = BytesMut::new();
        for _ in 0..64 {
            wire.extend_from_slice(&plain.encode(&body(200)).unwrap());
        }

        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &wire, |b, wire| {
            b.iter(|| {
                let (_, dec) = cipher_pair(SECRET).unwrap();
                let mut decoder = FrameDecoder::new();
                decoder.enable_encryption(dec);
                let mut frames = 0;
                for piece in wire.chunks(chunk) {
                    decoder.extend(piece);
                    while decoder.decode_payload().unwrap().is_some() {
                        frames += 1;
                    }
                }
                black_box(frames)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_compressed_roundtrip,
    bench_encrypted_stream,
);

criterion_main!(benches);
