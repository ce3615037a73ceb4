//! Keys for collection records
//!
//! A record is addressed by index in a fixed width collection and by byte offset in a variable
//! width one. The [`KeyType`] tells a collection how long the record is: either a fixed number
//! of bytes, or a header of `initial_bytes` from which the full size can be computed.

use std::hash::{Hash, Hasher};

use bincode::Options;

use crate::error::{CofferError, Result};
use crate::BINCODER;

/// Computes the full size of a record from its header bytes.
pub type FinalSize = fn(&[u8]) -> Result<u32>;

/// Describes how long records fetched with a key are.
#[derive(Clone, Copy, Debug)]
pub struct KeyType {
    name: &'static str,
    initial_bytes: u32,
    final_size: Option<FinalSize>,
}

impl KeyType {
    /// Records of exactly `size` bytes.
    pub const fn fixed(name: &'static str, size: u32) -> Self {
        Self {
            name,
            initial_bytes: size,
            final_size: None,
        }
    }

    /// Records with a header of `initial_bytes`, sized by `final_size`.
    pub const fn variable(name: &'static str, initial_bytes: u32, final_size: FinalSize) -> Self {
        Self {
            name,
            initial_bytes,
            final_size: Some(final_size),
        }
    }

    /// Name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Bytes read before the full size is known.
    pub fn initial_bytes(&self) -> u32 {
        self.initial_bytes
    }

    /// Full size of a record given its first `initial_bytes`.
    pub fn final_size(&self, header: &[u8]) -> Result<u32> {
        match self.final_size {
            Some(final_size) => final_size(header),
            None => Ok(self.initial_bytes),
        }
    }

    /// Does the size depend on the record's contents?
    pub fn is_variable(&self) -> bool {
        self.final_size.is_some()
    }
}

/// A single byte.
pub const BYTE: KeyType = KeyType::fixed("byte", 1);
/// A 16 bit integer.
pub const SHORT: KeyType = KeyType::fixed("short", 2);
/// A 32 bit integer.
pub const INTEGER: KeyType = KeyType::fixed("integer", 4);
/// A single precision float.
pub const FLOAT: KeyType = KeyType::fixed("float", 4);
/// A string, sized by its 16 bit length prefix which counts the terminator.
pub const STRING: KeyType = KeyType::variable("string", 2, length_prefixed);
/// A byte array, sized by its 16 bit length prefix.
pub const BYTE_ARRAY: KeyType = KeyType::variable("byte array", 2, length_prefixed);

/// Full size of a record starting with a 16 bit length prefix.
pub fn length_prefixed(header: &[u8]) -> Result<u32> {
    let length = BINCODER
        .deserialize::<i16>(header)
        .map_err(|e| CofferError::CorruptData(e.to_string()))?;
    let length =
        u32::try_from(length).map_err(|_| CofferError::CorruptData(format!("length: {length}")))?;
    Ok(2 + length)
}

/// The address of one record and how to size it.
#[derive(Clone, Copy, Debug)]
pub struct CollectionKey {
    /// Index in a fixed width collection, byte offset in a variable width one
    pub index_or_offset: u32,
    /// How to size the record
    pub key_type: KeyType,
}

impl CollectionKey {
    /// Key for the record at `index`.
    pub fn index(index: u32, key_type: KeyType) -> Self {
        Self {
            index_or_offset: index,
            key_type,
        }
    }

    /// Key for the record at byte `offset`.
    pub fn offset(offset: u32, key_type: KeyType) -> Self {
        Self {
            index_or_offset: offset,
            key_type,
        }
    }
}

// Keys identify records by address alone
impl PartialEq for CollectionKey {
    fn eq(&self, other: &Self) -> bool {
        self.index_or_offset == other.index_or_offset
    }
}

impl Eq for CollectionKey {}

impl Hash for CollectionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.index_or_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_sizes_length_prefixed_records() {
        assert_eq!(STRING.final_size(&[5, 0]).expect("sizes"), 7);
        assert_eq!(BYTE_ARRAY.final_size(&[0, 1]).expect("sizes"), 258);
        assert_eq!(INTEGER.final_size(&[]).expect("sizes"), 4);
    }

    #[test]
    fn it_rejects_negative_lengths() {
        assert!(matches!(
            STRING.final_size(&[0xff, 0xff]),
            Err(CofferError::CorruptData(_))
        ));
        assert!(matches!(
            STRING.final_size(&[1]),
            Err(CofferError::CorruptData(_))
        ));
    }

    #[test]
    fn it_compares_keys_by_address() {
        assert_eq!(
            CollectionKey::offset(12, STRING),
            CollectionKey::offset(12, INTEGER)
        );
        assert_ne!(CollectionKey::index(1, BYTE), CollectionKey::index(2, BYTE));
    }
}
