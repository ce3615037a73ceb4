//! Coffer errors
//!
//! Every fallible library operation reports one of these. The states which are not failures
//! (a cache with every node pinned, a search which didn't find its target) are never errors,
//! they are returned as values.

use thiserror::Error;

use crate::value::PropertyValueType;

/// Coffer specific errors.
#[derive(Error, Debug)]
pub enum CofferError {
    /// An index was outside the collection
    #[error("index: {0} is outside the collection")]
    CollectionIndexOutOfRange(u32),

    /// A byte offset was outside the collection
    #[error("offset: {0} is outside the collection")]
    CollectionOffsetOutOfRange(u32),

    /// Seeking in the data file failed
    #[error("could not seek in collection file")]
    CollectionFileSeekFail(#[source] std::io::Error),

    /// Reading from the data file failed
    #[error("could not read from collection file")]
    CollectionFileReadFail(#[source] std::io::Error),

    /// Opening a data file handle failed
    #[error("could not open collection file")]
    FileOpenFail(#[source] std::io::Error),

    /// A record buffer could not be allocated
    #[error("could not allocate: {0} bytes")]
    InsufficientMemory(usize),

    /// The value type can't be used for this operation
    #[error("stored value type: {0} is not supported")]
    UnsupportedStoredValueType(PropertyValueType),

    /// A value type code which isn't known
    #[error("stored value type code: {0} is not known")]
    UnknownStoredValueType(u8),

    /// The stored bytes don't have the expected shape
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The input is well formed but not acceptable
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A cache shard would hold fewer nodes than there are concurrent operations
    #[error("capacity: {capacity} is too small for concurrency: {concurrency}")]
    TooManyConcurrentOperations {
        /// Requested cache capacity
        capacity: u32,
        /// Requested cache concurrency
        concurrency: u16,
    },
}

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, CofferError>;
