//! Data file access
//!
//! Reading from resident bytes, pooled reading from a data file and producing data in the
//! stored format.

pub mod pool;
pub mod reader;
pub mod writer;
