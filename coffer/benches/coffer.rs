use std::cmp::Ordering;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;

use coffer::collection::key::{CollectionKey, INTEGER, STRING};
use coffer::collection::{Collection, CollectionConfig, CollectionHeader};
use coffer::io::pool::FilePool;
use coffer::io::writer::CollectionWriter;
use coffer::value::{PropertyValueType, StoredBinaryValue, MAX_DOUBLE_DECIMAL_PLACES};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use tempfile::NamedTempFile;

const RECORDS: u32 = 10_000;

// Utility function for creating a data file holding a strings and an integers collection
fn create_data_file() -> Result<(NamedTempFile, Vec<u32>)> {
    let mut strings = CollectionWriter::new();
    let mut offsets = vec![];
    for i in 0..RECORDS {
        offsets.push(strings.write_string(&format!("value number {i:08}"))?);
    }
    let mut integers = CollectionWriter::new();
    for i in 0..RECORDS as i32 {
        integers.write_integer(i * 2)?;
    }

    let mut file = NamedTempFile::new()?;
    file.write_all(&strings.finish_with_length()?)?;
    file.write_all(&integers.finish_with_count()?)?;
    file.flush()?;
    Ok((file, offsets))
}

// Utility function for opening both collections with the same config
fn open(data: &NamedTempFile, config: &CollectionConfig) -> Result<(Collection, Collection)> {
    let mut file = File::open(data.path())?;
    let pool = Arc::new(FilePool::try_new(data.path(), config.concurrency.max(1))?);
    let header = CollectionHeader::from_file(&mut file, 0, false)?;
    let strings = Collection::from_file(&mut file, &pool, config, header)?;
    let header = CollectionHeader::from_file(&mut file, 4, true)?;
    let integers = Collection::from_file(&mut file, &pool, config, header)?;
    Ok((strings, integers))
}

fn configs() -> [(&'static str, CollectionConfig); 3] {
    [
        ("memory", CollectionConfig::in_memory()),
        ("file", CollectionConfig::streamed(4)),
        ("cache", CollectionConfig::cached(4096, 4)),
    ]
}

fn coffer_get(c: &mut Criterion) {
    let (data, offsets) = create_data_file().expect("creates data file");

    let mut group = c.benchmark_group("get");
    for (name, config) in configs() {
        let (strings, _) = open(&data, &config).expect("opens collections");
        group.bench_with_input(BenchmarkId::new("coffer get", name), &strings, |b, strings| {
            let mut rng = rand::thread_rng();
            b.iter(|| {
                let offset = offsets[rng.gen_range(0..offsets.len())];
                strings
                    .get(&CollectionKey::offset(offset, STRING))
                    .expect("gets")
                    .expect("not exhausted")
            })
        });
    }
    group.finish();
}

fn coffer_binary_search(c: &mut Criterion) {
    let (data, _) = create_data_file().expect("creates data file");

    let mut group = c.benchmark_group("binary_search");
    for (name, config) in configs() {
        let (_, integers) = open(&data, &config).expect("opens collections");
        group.bench_with_input(
            BenchmarkId::new("coffer binary_search", name),
            &integers,
            |b, integers| {
                let mut rng = rand::thread_rng();
                b.iter(|| {
                    let target = rng.gen_range(0..RECORDS as i32) * 2;
                    integers
                        .binary_search(0, RECORDS - 1, INTEGER, |item, _| {
                            let value =
                                StoredBinaryValue::decode(item, PropertyValueType::Integer)?;
                            Ok(value.to_int_or_default(0).cmp(&target))
                        })
                        .expect("searches")
                })
            },
        );
    }
    group.finish();
}

fn coffer_compare(c: &mut Criterion) {
    let mut writer = CollectionWriter::new();
    writer
        .write_string("value number 00001234")
        .expect("writes string");
    let string = writer.finish_with_length().expect("finishes")[4..].to_vec();

    let mut wkb = vec![1, 2, 0, 0, 0, 16, 0, 0, 0];
    for i in 0..32 {
        wkb.extend_from_slice(&(f64::from(i) / 3.0).to_le_bytes());
    }
    let mut writer = CollectionWriter::new();
    writer.write_byte_array(&wkb).expect("writes wkb");
    let wkb = writer.finish_with_length().expect("finishes")[4..].to_vec();

    let mut group = c.benchmark_group("compare");
    for (name, bytes, value_type, target) in [
        ("string", &string, PropertyValueType::String, "value number 00001235"),
        ("wkb", &wkb, PropertyValueType::Wkb, "LINESTRING(0 0.3)"),
    ] {
        group.bench_function(BenchmarkId::new("coffer compare", name), |b| {
            b.iter(|| {
                let value = StoredBinaryValue::decode(bytes, value_type).expect("decodes");
                let result = value.compare_with_string(target).expect("compares");
                assert_ne!(result.cmp(&0), Ordering::Equal);
            })
        });
    }
    group.bench_function("coffer wkt", |b| {
        b.iter(|| {
            StoredBinaryValue::decode(&wkb, PropertyValueType::Wkb)
                .expect("decodes")
                .to_text(MAX_DOUBLE_DECIMAL_PLACES)
                .expect("renders")
        })
    });
    group.finish();
}

criterion_group!(benches, coffer_get, coffer_binary_search, coffer_compare);
criterion_main!(benches);
