use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use bytes::Bytes;

use super::key::CollectionKey;
use super::Layout;
use crate::error::{CofferError, Result};
use crate::io::pool::FilePool;

/// Records read from the data file on every request.
#[derive(Debug)]
pub(crate) struct FileCollection {
    pool: Arc<FilePool>,
    // Position of the first record in the file
    start: u64,
}

pub(crate) fn allocate(length: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(length)
        .map_err(|_| CofferError::InsufficientMemory(length))?;
    buf.resize(length, 0);
    Ok(buf)
}

impl FileCollection {
    pub(crate) fn new(pool: Arc<FilePool>, start: u64) -> Self {
        Self { pool, start }
    }

    pub(crate) fn get(&self, layout: &Layout, key: &CollectionKey) -> Result<Bytes> {
        if layout.is_fixed() {
            let (offset, length) = layout.fixed_record(key)?;
            let mut buf = allocate(length as usize)?;
            let mut file = self.pool.get()?;
            file.seek(SeekFrom::Start(self.start + u64::from(offset)))
                .map_err(CofferError::CollectionFileSeekFail)?;
            file.read_exact(&mut buf)
                .map_err(CofferError::CollectionFileReadFail)?;
            return Ok(buf.into());
        }

        let offset = layout.check_offset(key)?;
        let initial = layout.header_end(offset, key)? - offset;
        let mut buf = allocate(initial as usize)?;
        let mut file = self.pool.get()?;
        file.seek(SeekFrom::Start(self.start + u64::from(offset)))
            .map_err(CofferError::CollectionFileSeekFail)?;
        file.read_exact(&mut buf)
            .map_err(CofferError::CollectionFileReadFail)?;

        let length = layout.variable_length(offset, &buf, key)? as usize;
        if length > buf.len() {
            let additional = length - buf.len();
            buf.try_reserve_exact(additional)
                .map_err(|_| CofferError::InsufficientMemory(length))?;
            buf.resize(length, 0);
            file.read_exact(&mut buf[initial as usize..])
                .map_err(CofferError::CollectionFileReadFail)?;
        } else {
            buf.truncate(length);
        }
        Ok(buf.into())
    }
}
