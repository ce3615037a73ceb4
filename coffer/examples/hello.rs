use std::fs::File;
use std::sync::Arc;

use anyhow::Result;

use coffer::collection::key::{CollectionKey, STRING};
use coffer::collection::{Collection, CollectionConfig, CollectionHeader};
use coffer::io::pool::FilePool;
use coffer::io::writer::CollectionWriter;
use coffer::value::{PropertyValueType, StoredBinaryValue};

fn main() -> Result<()> {
    // Write a collection of two strings
    let mut writer = CollectionWriter::new();
    let hello = writer.write_string("hello")?;
    let world = writer.write_string("world")?;
    std::fs::write("hello.dat", writer.finish_with_length()?)?;

    // Read it back through a cache of 8 records shared by 2 threads
    let config = CollectionConfig::cached(8, 2);
    let pool = Arc::new(FilePool::try_new("hello.dat", config.concurrency)?);
    let mut file = File::open("hello.dat")?;
    let header = CollectionHeader::from_file(&mut file, 0, false)?;
    let collection = Collection::from_file(&mut file, &pool, &config, header)?;

    for offset in [hello, world] {
        let item = collection
            .get(&CollectionKey::offset(offset, STRING))?
            .ok_or_else(|| anyhow::anyhow!("cache is exhausted"))?;
        let value = StoredBinaryValue::decode(&item, PropertyValueType::String)?;
        println!("{}", value.to_text(0)?);
        if offset == hello {
            assert_eq!(value.compare_with_string("hello")?, 0);
        }
    }

    std::fs::remove_file("hello.dat")?;
    Ok(())
}
