//! Benchmarks for RESP3 encoding and decoding.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use nuntius::{CommandArg, Decoder, Encoder, Value};

fn sample_stream() -> Vec<u8> {
    let mut encoder = Encoder::new();
    let values: Vec<Value> = (0..64)
        .map(|i| {
            Value::array(vec![
                Value::simple("OK"),
                Value::Integer(i),
                Value::Blob(Some(Bytes::from(vec![b'x'; 64]))),
                Value::map(vec![(Value::simple("seq"), Value::Integer(i))]),
            ])
        })
        .collect();
    encoder.encode_sequence(&values).to_vec()
}

fn benchmark_decode(c: &mut Criterion) {
    let stream = sample_stream();
    c.benchmark_group("codec")
        .throughput(Throughput::Bytes(stream.len() as u64))
        .bench_function("decode_stream", |b| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                decoder.feed(black_box(&stream));
                let mut count = 0usize;
                while let Ok(Some(_)) = decoder.poll() {
                    count += 1;
                }
                black_box(count)
            })
        });
}

fn benchmark_encode(c: &mut Criterion) {
    let mut encoder = Encoder::new();
    c.bench_function("encode_command", |b| {
        b.iter(|| {
            let bytes = encoder.encode_command(
                "SET",
                &[
                    CommandArg::from("benchmark:key"),
                    CommandArg::from("benchmark-value-0123456789"),
                ],
            );
            black_box(bytes)
        })
    });
}

criterion_group!(benches, benchmark_decode, benchmark_encode);
criterion_main!(benches);
