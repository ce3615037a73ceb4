#![warn(missing_docs)]
//! Coffer record collections
//!
//! # Implementation Details
//!
//! Provides uniform access to the fixed and variable width binary records stored in a compact
//! data file, under bounded memory.
//!
//! A [`Collection`](collection::Collection) is backed by one of:
//!  - Memory, the whole collection (or a leading part of it) is resident
//!  - File, every record is read from the file on demand through a pool of file handles
//!  - Cache, records are read from the file on demand and kept in a fixed capacity,
//!    sharded [`Cache`](cache::Cache) until evicted
//!
//! The backing is chosen once, when the collection is created from the data file, using a
//! [`CollectionConfig`](collection::CollectionConfig).
//!
//! Records are fetched as an [`Item`](collection::Item). An item keeps the record alive (and, for
//! a cache backing, pins the cache node so that it can't be evicted) until it is dropped.
//!
//! The bytes of a record are interpreted with a [`PropertyValueType`](value::PropertyValueType)
//! supplied by the caller, since the stored bytes don't describe their own type. Decoding yields
//! a [`StoredBinaryValue`](value::StoredBinaryValue), which can be compared with text, coerced to
//! native types or rendered as text. Geometries are stored as WKB and rendered as WKT.
//!
//! Note: the data file is read only. [`CollectionWriter`](io::writer::CollectionWriter) exists
//! to produce data in the same format.
//!

pub mod builder;
pub mod cache;
pub mod collection;
pub mod error;
pub mod index;
pub mod io;
pub mod value;

pub use error::{CofferError, Result};

use bincode::config::AllowTrailing;
use bincode::config::FixintEncoding;
use bincode::config::WithOtherIntEncoding;
use bincode::config::WithOtherTrailing;
use bincode::{DefaultOptions, Options};
use std::sync::LazyLock;

static BINCODER: LazyLock<
    WithOtherIntEncoding<WithOtherTrailing<DefaultOptions, AllowTrailing>, FixintEncoding>,
> = LazyLock::new(|| {
    bincode::DefaultOptions::new()
        .allow_trailing_bytes()
        .with_fixint_encoding()
});
