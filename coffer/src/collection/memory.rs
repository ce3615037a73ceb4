use std::ops::Range;

use bytes::Bytes;

use super::key::CollectionKey;
use super::Layout;
use crate::error::Result;

/// Records resident in memory.
#[derive(Debug)]
pub(crate) struct MemoryCollection {
    bytes: Bytes,
    // What the resident bytes cover, may be less than the whole collection
    layout: Layout,
}

impl MemoryCollection {
    pub(crate) fn new(bytes: Bytes, element_size: u32) -> Self {
        let size = bytes.len() as u32;
        let count = if element_size > 0 { size / element_size } else { 0 };
        Self {
            bytes,
            layout: Layout {
                count,
                size,
                element_size,
            },
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    fn record(&self, key: &CollectionKey) -> Result<Range<usize>> {
        let (offset, length) = if self.layout.is_fixed() {
            self.layout.fixed_record(key)?
        } else {
            let offset = self.layout.check_offset(key)?;
            let header_end = self.layout.header_end(offset, key)?;
            let header = &self.bytes[offset as usize..header_end as usize];
            (offset, self.layout.variable_length(offset, header, key)?)
        };
        Ok(offset as usize..(offset + length) as usize)
    }

    pub(crate) fn contains(&self, key: &CollectionKey) -> bool {
        self.record(key).is_ok()
    }

    pub(crate) fn get(&self, key: &CollectionKey) -> Result<Bytes> {
        Ok(self.bytes.slice(self.record(key)?))
    }
}
