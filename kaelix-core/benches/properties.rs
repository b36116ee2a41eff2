//! Property container and address matching benchmarks.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kaelix_core::address::{matches, AddressTrie, WildcardConfiguration};
use kaelix_core::properties::TypedProperties;

/// Property counts per container.
const PROPERTY_COUNTS: &[usize] = &[4, 16, 64];

fn populated(count: usize) -> TypedProperties {
    let properties = TypedProperties::new();
    for i in 0..count {
        match i % 4 {
            0 => properties.put_int(format!("int_{i}"), i as i32),
            1 => properties.put_string(format!("str_{i}"), format!("value-{i}")),
            2 => properties.put_double(format!("dbl_{i}"), i as f64 * 0.5),
            _ => properties.put_bytes(format!("raw_{i}"), Bytes::from(vec![0u8; 16])),
        }
    }
    properties
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("properties_encode");

    for &count in PROPERTY_COUNTS {
        let properties = populated(count);
        group.throughput(Throughput::Bytes(properties.encode_size() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &properties, |b, properties| {
            let mut buf = BytesMut::with_capacity(properties.encode_size());
            b.iter(|| {
                buf.clear();
                properties.encode(&mut buf);
                black_box(buf.len())
            });
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("properties_decode");

    for &count in PROPERTY_COUNTS {
        let mut buf = BytesMut::new();
        populated(count).encode(&mut buf);
        let encoded = buf.freeze();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &encoded, |b, encoded| {
            b.iter(|| {
                let mut input = encoded.clone();
                black_box(TypedProperties::decode_new(&mut input).ok())
            });
        });
    }

    group.finish();
}

fn bench_address_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_lookup");

    let mut trie = AddressTrie::new(WildcardConfiguration::default());
    for region in 0..32 {
        trie.insert(&format!("orders.r{region}.created"), region);
        trie.insert(&format!("orders.r{region}.*"), region + 100);
    }
    trie.insert("orders.#", 1000);
    trie.insert("#", 1001);

    group.bench_function("trie", |b| b.iter(|| black_box(trie.lookup("orders.r7.created").len())));
    group.bench_function("matcher", |b| {
        b.iter(|| black_box(matches("orders.*.#.created", "orders.r7.eu.west.created")))
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_address_lookup);
criterion_main!(benches);
