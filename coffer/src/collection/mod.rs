//! Record collections
//!
//! A [`Collection`] is a run of records in a data file, preceded by a 4 byte container header
//! holding either the number of records or their total byte length. Which one it holds is
//! known to the caller, not to the file.
//!
//! Collections are fixed width (every record has the same size, addressed by index) or variable
//! width (addressed by byte offset, sized by the [`KeyType`](key::KeyType) of the key).
//!
//! A collection created from a file is served by up to two tiers, chosen by its
//! [`CollectionConfig`]:
//!  - a memory tier holding the first `loaded` bytes
//!  - a cache tier (`capacity > 0 && concurrency > 0`) or a file tier for anything the memory
//!    tier doesn't hold

use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Deref;
use std::sync::Arc;

use bincode::Options;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cache::CacheRef;
use crate::error::{CofferError, Result};
use crate::io::pool::FilePool;
use crate::io::reader::MemoryReader;
use crate::BINCODER;

mod cached;
mod file;
pub mod key;
mod memory;
mod stream;


use cached::CachedCollection;
use file::{allocate, FileCollection};
use key::{CollectionKey, KeyType, INTEGER};
use memory::MemoryCollection;

pub use stream::Records;

/// How a collection read from a file is held.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Bytes loaded into memory when the collection is created
    pub loaded: u32,
    /// Cache nodes for records which aren't loaded, 0 for no cache
    pub capacity: u32,
    /// Cache shards and file handles
    pub concurrency: u16,
}

impl CollectionConfig {
    /// The whole collection in memory.
    pub fn in_memory() -> Self {
        Self {
            loaded: u32::MAX,
            capacity: 0,
            concurrency: 1,
        }
    }

    /// Records read from the file through a cache.
    pub fn cached(capacity: u32, concurrency: u16) -> Self {
        Self {
            loaded: 0,
            capacity,
            concurrency,
        }
    }

    /// Records read from the file on every request.
    pub fn streamed(concurrency: u16) -> Self {
        Self {
            loaded: 0,
            capacity: 0,
            concurrency,
        }
    }
}

/// Where a collection starts and how big it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionHeader {
    /// Position of the first record
    pub start_position: u64,
    /// Byte length of the records
    pub length: u32,
    /// Number of records, 0 if not known
    pub count: u32,
}

impl CollectionHeader {
    fn from_size_or_count(
        start_position: u64,
        size_or_count: u32,
        element_size: u32,
        is_count: bool,
    ) -> Result<Self> {
        let (length, count) = if is_count {
            let length = size_or_count.checked_mul(element_size).ok_or_else(|| {
                CofferError::CorruptData(format!(
                    "{size_or_count} records of {element_size} bytes is too long"
                ))
            })?;
            (length, size_or_count)
        } else if element_size > 0 {
            (size_or_count, size_or_count / element_size)
        } else {
            (size_or_count, 0)
        };
        Ok(Self {
            start_position,
            length,
            count,
        })
    }

    /// Read a header from resident bytes, leaving the reader at the first record.
    pub fn from_memory(
        reader: &mut MemoryReader,
        element_size: u32,
        is_count: bool,
    ) -> Result<Self> {
        let size_or_count = reader.read_u32()?;
        Self::from_size_or_count(reader.position() as u64, size_or_count, element_size, is_count)
    }

    /// Read a header from a file, leaving the file at the first record.
    pub fn from_file(file: &mut File, element_size: u32, is_count: bool) -> Result<Self> {
        let mut buf = [0u8; 4];
        file.read_exact(&mut buf)
            .map_err(CofferError::CollectionFileReadFail)?;
        let size_or_count = BINCODER
            .deserialize::<u32>(&buf)
            .map_err(|e| CofferError::CorruptData(e.to_string()))?;
        let start_position = file
            .stream_position()
            .map_err(CofferError::CollectionFileSeekFail)?;
        Self::from_size_or_count(start_position, size_or_count, element_size, is_count)
    }
}

/// Sizes of a collection, or of the part of it a tier holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Layout {
    pub(crate) count: u32,
    pub(crate) size: u32,
    pub(crate) element_size: u32,
}

impl Layout {
    fn from_header(header: &CollectionHeader) -> Self {
        Self {
            count: header.count,
            size: header.length,
            element_size: if header.count == 0 {
                0
            } else {
                header.length / header.count
            },
        }
    }

    pub(crate) fn is_fixed(&self) -> bool {
        self.element_size > 0
    }

    fn past_end(&self, offset: u32, length: u32) -> Option<CofferError> {
        (u64::from(offset) + u64::from(length) > u64::from(self.size)).then(|| {
            CofferError::CorruptData(format!(
                "record of {length} bytes at: {offset} runs past the end of the collection"
            ))
        })
    }

    /// Offset and length of an indexed record.
    pub(crate) fn fixed_record(&self, key: &CollectionKey) -> Result<(u32, u32)> {
        let index = key.index_or_offset;
        if index >= self.count {
            return Err(CofferError::CollectionIndexOutOfRange(index));
        }
        // index < count, so this is within size
        let offset = index * self.element_size;
        let length = self.element_size.max(key.key_type.initial_bytes());
        match self.past_end(offset, length) {
            Some(e) => Err(e),
            None => Ok((offset, length)),
        }
    }

    pub(crate) fn check_offset(&self, key: &CollectionKey) -> Result<u32> {
        if key.index_or_offset >= self.size {
            return Err(CofferError::CollectionOffsetOutOfRange(key.index_or_offset));
        }
        Ok(key.index_or_offset)
    }

    /// End of the header of a variable width record.
    pub(crate) fn header_end(&self, offset: u32, key: &CollectionKey) -> Result<u32> {
        let initial = key.key_type.initial_bytes();
        match self.past_end(offset, initial) {
            Some(e) => Err(e),
            None => Ok(offset + initial),
        }
    }

    /// Length of a variable width record given its header.
    pub(crate) fn variable_length(
        &self,
        offset: u32,
        header: &[u8],
        key: &CollectionKey,
    ) -> Result<u32> {
        let length = key.key_type.final_size(header)?;
        match self.past_end(offset, length) {
            Some(e) => Err(e),
            None => Ok(length),
        }
    }
}

enum Backing {
    Memory(MemoryCollection),
    File(FileCollection),
    Cache(CachedCollection),
}

/// Cache statistics for a collection with a cache tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served from the cache
    pub hits: u64,
    /// Requests which had to load
    pub misses: u64,
    /// Configured nodes
    pub capacity: u32,
    /// Configured shards
    pub concurrency: u16,
    /// Records currently resident
    pub resident: usize,
}

/// A collection of records.
pub struct Collection {
    layout: Layout,
    backing: Backing,
    // Serves records the memory tier doesn't hold
    next: Option<Box<Collection>>,
}

/// One fetched record.
///
/// The bytes stay valid for as long as the item is held. An item fetched through a cache holds
/// its cache node, so the node can't be evicted until the item is dropped or released.
pub struct Item {
    data: Bytes,
    node: Option<CacheRef<CollectionKey>>,
}

impl Item {
    fn owned(data: Bytes) -> Self {
        Self { data, node: None }
    }

    /// The record's bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Is a cache node held?
    pub fn is_cached(&self) -> bool {
        self.node.is_some()
    }

    /// Finish with the item. Dropping it has the same effect.
    pub fn release(self) {}
}

impl Deref for Item {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("data", &self.data)
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// Result of a binary search.
#[derive(Debug)]
pub enum SearchOutcome {
    /// The record at `index` compared equal, it is still held
    Found {
        /// Index of the record
        index: u32,
        /// The record
        item: Item,
    },
    /// No record compared equal
    NotFound,
    /// A record couldn't be fetched because the cache was full of held records
    Exhausted,
}

impl Collection {
    /// Create a collection over resident bytes. The reader must be at the first record, as
    /// left by [`CollectionHeader::from_memory`], and is moved past the collection.
    pub fn from_memory(reader: &mut MemoryReader, header: CollectionHeader) -> Result<Self> {
        if reader.position() as u64 != header.start_position {
            return Err(CofferError::InvalidInput(format!(
                "reader is at: {} but the collection starts at: {}",
                reader.position(),
                header.start_position
            )));
        }
        let layout = Layout::from_header(&header);
        let bytes = reader.take(layout.size as usize)?;
        Ok(Self {
            layout,
            backing: Backing::Memory(MemoryCollection::new(bytes, layout.element_size)),
            next: None,
        })
    }

    /// Create a collection from a data file, as configured. `file` is left at the end of the
    /// collection, ready for the next header. Records not loaded into memory are read through
    /// `pool`.
    pub fn from_file(
        file: &mut File,
        pool: &Arc<FilePool>,
        config: &CollectionConfig,
        header: CollectionHeader,
    ) -> Result<Self> {
        let layout = Layout::from_header(&header);

        let mut loaded = config.loaded.min(layout.size);
        if layout.is_fixed() {
            loaded -= loaded % layout.element_size;
        }

        let memory = if loaded > 0 {
            let mut buf = allocate(loaded as usize)?;
            file.seek(SeekFrom::Start(header.start_position))
                .map_err(CofferError::CollectionFileSeekFail)?;
            file.read_exact(&mut buf)
                .map_err(CofferError::CollectionFileReadFail)?;
            Some(MemoryCollection::new(buf.into(), layout.element_size))
        } else {
            None
        };

        let collection = match memory {
            Some(memory) if memory.len() == layout.size as usize => {
                tracing::info!("Loaded collection of: {} bytes into memory", layout.size);
                Self {
                    layout,
                    backing: Backing::Memory(memory),
                    next: None,
                }
            }
            memory => {
                let source = Self {
                    layout,
                    backing: Backing::File(FileCollection::new(
                        Arc::clone(pool),
                        header.start_position,
                    )),
                    next: None,
                };
                let second = if config.capacity > 0 && config.concurrency > 0 {
                    Self {
                        layout,
                        backing: Backing::Cache(CachedCollection::try_new(
                            source,
                            config.capacity,
                            config.concurrency,
                        )?),
                        next: None,
                    }
                } else {
                    source
                };
                match memory {
                    Some(memory) => {
                        tracing::debug!(
                            "Loaded: {} of: {} bytes, remainder from: {}",
                            memory.len(),
                            layout.size,
                            second.kind()
                        );
                        Self {
                            layout,
                            backing: Backing::Memory(memory),
                            next: Some(Box::new(second)),
                        }
                    }
                    None => second,
                }
            }
        };

        file.seek(SeekFrom::Start(header.start_position + u64::from(layout.size)))
            .map_err(CofferError::CollectionFileSeekFail)?;

        tracing::info!(
            "Created {} collection, count: {}, size: {}, element size: {}",
            collection.kind(),
            collection.count(),
            collection.size(),
            collection.element_size()
        );
        Ok(collection)
    }

    /// Number of records, 0 if not known.
    pub fn count(&self) -> u32 {
        self.layout.count
    }

    /// Byte length of the records.
    pub fn size(&self) -> u32 {
        self.layout.size
    }

    /// Size of every record, 0 for a variable width collection.
    pub fn element_size(&self) -> u32 {
        self.layout.element_size
    }

    /// Name of the first tier's backing.
    pub fn kind(&self) -> &'static str {
        match self.backing {
            Backing::Memory(_) => "memory",
            Backing::File(_) => "file",
            Backing::Cache(_) => "cache",
        }
    }

    /// The tier serving records the first one doesn't hold.
    pub fn next(&self) -> Option<&Collection> {
        self.next.as_deref()
    }

    /// Statistics of the cache tier, if there is one.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        match &self.backing {
            Backing::Cache(cached) => {
                let cache = cached.cache();
                Some(CacheStats {
                    hits: cache.hits(),
                    misses: cache.misses(),
                    capacity: cache.capacity(),
                    concurrency: cache.concurrency(),
                    resident: cache.len(),
                })
            }
            _ => self.next.as_ref().and_then(|next| next.cache_stats()),
        }
    }

    /// Fetch a record.
    ///
    /// `Ok(None)` means a cache tier had every node held and the record couldn't be loaded.
    pub fn get(&self, key: &CollectionKey) -> Result<Option<Item>> {
        match &self.backing {
            Backing::Memory(memory) => match &self.next {
                Some(next) if !memory.contains(key) => next.get(key),
                _ => memory.get(key).map(|data| Some(Item::owned(data))),
            },
            Backing::File(file) => file
                .get(&self.layout, key)
                .map(|data| Some(Item::owned(data))),
            Backing::Cache(cached) => cached.get(key),
        }
    }

    /// Fetch a fixed 4 byte record as an integer.
    ///
    /// Fails with [`CofferError::TooManyConcurrentOperations`] if the cache tier couldn't supply
    /// it.
    pub fn get_integer32(&self, index_or_offset: u32) -> Result<i32> {
        let item = self
            .get(&CollectionKey::index(index_or_offset, INTEGER))?
            .ok_or_else(|| self.exhausted())?;
        BINCODER
            .deserialize::<i32>(&item)
            .map_err(|e| CofferError::CorruptData(e.to_string()))
    }

    /// The error for a cache tier which has every node held.
    pub(crate) fn exhausted(&self) -> CofferError {
        let (capacity, concurrency) = self
            .cache_stats()
            .map_or((0, 0), |stats| (stats.capacity, stats.concurrency));
        CofferError::TooManyConcurrentOperations {
            capacity,
            concurrency,
        }
    }

    /// Binary search the records with indices `lower..=upper`.
    ///
    /// `comparer` returns how a record orders relative to the target. A found record is
    /// returned still held.
    pub fn binary_search<F>(
        &self,
        lower: u32,
        upper: u32,
        key_type: KeyType,
        mut comparer: F,
    ) -> Result<SearchOutcome>
    where
        F: FnMut(&Item, &CollectionKey) -> Result<Ordering>,
    {
        let (mut lower, mut upper) = (lower, upper);
        while lower <= upper {
            let middle = lower + (upper - lower) / 2;
            let key = CollectionKey::index(middle, key_type);
            let Some(item) = self.get(&key)? else {
                return Ok(SearchOutcome::Exhausted);
            };
            match comparer(&item, &key)? {
                Ordering::Equal => return Ok(SearchOutcome::Found { index: middle, item }),
                Ordering::Greater => match middle.checked_sub(1) {
                    Some(below) => upper = below,
                    None => break,
                },
                Ordering::Less => match middle.checked_add(1) {
                    Some(above) => lower = above,
                    None => break,
                },
            }
        }
        Ok(SearchOutcome::NotFound)
    }
}
