//! Cursor over resident bytes

use bincode::Options;
use bytes::Bytes;

use crate::error::{CofferError, Result};
use crate::BINCODER;

/// A cursor over an immutable byte buffer.
///
/// Slices taken from the reader share the underlying buffer, nothing is copied.
#[derive(Clone, Debug)]
pub struct MemoryReader {
    bytes: Bytes,
    current: usize,
}

impl MemoryReader {
    /// Create a reader positioned at the start of `bytes`.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            current: 0,
        }
    }

    /// Current position within the buffer.
    pub fn position(&self) -> usize {
        self.current
    }

    /// Bytes left after the current position.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.current
    }

    /// Move the cursor forward.
    pub fn advance(&mut self, count: usize) -> Result<()> {
        if count > self.remaining() {
            return Err(CofferError::CorruptData(format!(
                "cannot advance {count} bytes, {} remain",
                self.remaining()
            )));
        }
        self.current += count;
        Ok(())
    }

    /// Read a little endian `u32` and move past it.
    pub fn read_u32(&mut self) -> Result<u32> {
        let value = BINCODER
            .deserialize::<u32>(&self.bytes[self.current..])
            .map_err(|e| CofferError::CorruptData(e.to_string()))?;
        self.current += std::mem::size_of::<u32>();
        Ok(value)
    }

    /// Take `count` bytes from the current position and move past them.
    pub fn take(&mut self, count: usize) -> Result<Bytes> {
        let start = self.current;
        self.advance(count)?;
        Ok(self.bytes.slice(start..self.current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_reads_and_advances() {
        let mut reader = MemoryReader::new(vec![3, 0, 0, 0, 9, 8, 7]);
        assert_eq!(reader.read_u32().expect("reads u32"), 3);
        assert_eq!(reader.position(), 4);
        let taken = reader.take(2).expect("takes bytes");
        assert_eq!(&taken[..], &[9, 8]);
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn it_refuses_to_read_past_the_end() {
        let mut reader = MemoryReader::new(vec![1, 2]);
        assert!(matches!(reader.read_u32(), Err(CofferError::CorruptData(_))));
        assert!(matches!(reader.advance(3), Err(CofferError::CorruptData(_))));
        assert_eq!(reader.position(), 0);
    }
}
