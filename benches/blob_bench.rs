use std::io::Cursor;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use lockstash::blob::{encode_blob, BlobReader, EncodeSpec, MAX_PART_CONTENT_SIZE};
use lockstash::kdf::CodenameKey;

// Blob throughput with a fixed key: the KDF is deliberately slow and is
// measured separately by the CLI `bench` command.
fn blob_codec(c: &mut Criterion) {
    let key = CodenameKey::from_bytes([7u8; 32]);
    let payload = vec![0xA5u8; MAX_PART_CONTENT_SIZE];

    let mut group = c.benchmark_group("blob");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| encode_blob(&key, &EncodeSpec::default(), &mut Cursor::new(&payload)).unwrap())
    });

    let blob = encode_blob(&key, &EncodeSpec::default(), &mut Cursor::new(&payload)).unwrap();
    group.bench_function("decode", |b| {
        b.iter(|| {
            let mut reader = BlobReader::new(&key, &blob);
            reader.read_body().unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, blob_codec);
criterion_main!(benches);
