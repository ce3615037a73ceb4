use bytes::Bytes;

use super::key::CollectionKey;
use super::{Collection, Item};
use crate::cache::{hash32, Cache, CacheRef, Loader};
use crate::error::{CofferError, Result};

/// Loads cache nodes from the collection the cache sits in front of.
pub(crate) struct SourceLoader(Box<Collection>);

impl Loader<CollectionKey> for SourceLoader {
    fn load(&self, key: &CollectionKey) -> Result<Bytes> {
        match self.0.get(key)? {
            Some(item) => Ok(item.data().clone()),
            None => Err(CofferError::InvalidInput(format!(
                "source collection: {} could not supply: {}",
                self.0.kind(),
                key.index_or_offset
            ))),
        }
    }
}

fn hash_key(key: &CollectionKey) -> u64 {
    hash32(key.index_or_offset)
}

/// Records read from the data file and kept in a cache until evicted.
pub(crate) struct CachedCollection {
    cache: Cache<CollectionKey, SourceLoader>,
}

impl CachedCollection {
    pub(crate) fn try_new(source: Collection, capacity: u32, concurrency: u16) -> Result<Self> {
        let cache = Cache::try_new(
            capacity,
            concurrency,
            SourceLoader(Box::new(source)),
            hash_key,
        )?;
        Ok(Self { cache })
    }

    pub(crate) fn get(&self, key: &CollectionKey) -> Result<Option<Item>> {
        Ok(self.cache.get(key)?.map(Item::cached))
    }

    pub(crate) fn cache(&self) -> &Cache<CollectionKey, SourceLoader> {
        &self.cache
    }
}

impl Item {
    fn cached(node: CacheRef<CollectionKey>) -> Self {
        Self {
            data: node.data().clone(),
            node: Some(node),
        }
    }
}
