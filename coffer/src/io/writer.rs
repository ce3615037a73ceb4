//! Producing collection data
//!
//! Records are appended to an in-memory buffer in the stored format. The finished collection is
//! the buffer prefixed with its container header, either the byte length of the records or
//! their count.

use std::net::IpAddr;

use anyhow::{anyhow, Result};
use bincode::Options;
use serde::Serialize;

use crate::value::{AZIMUTH_MAX_DEGREES, DECLINATION_MAX_DEGREES};
use crate::BINCODER;

/// Appends records in the stored format.
#[derive(Debug, Default)]
pub struct CollectionWriter {
    data: Vec<u8>,
    count: u32,
}

impl CollectionWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte length of the records written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Have any records been written?
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of records written so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    fn append<T: Serialize>(&mut self, value: &T) -> Result<u32> {
        let offset = u32::try_from(self.data.len())?;
        BINCODER.serialize_into(&mut self.data, value)?;
        Ok(offset)
    }

    fn record(&mut self, offset: u32) -> u32 {
        self.count += 1;
        offset
    }

    fn length_prefix(len: usize) -> Result<i16> {
        i16::try_from(len).map_err(|_| anyhow!("record of {len} bytes is too long"))
    }

    /// Append a string. The stored size counts the terminator.
    pub fn write_string(&mut self, value: &str) -> Result<u32> {
        if value.as_bytes().contains(&0) {
            return Err(anyhow!("strings can't contain a terminator"));
        }
        let offset = self.append(&Self::length_prefix(value.len() + 1)?)?;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        Ok(self.record(offset))
    }

    /// Append a length prefixed byte array.
    pub fn write_byte_array(&mut self, value: &[u8]) -> Result<u32> {
        let offset = self.append(&Self::length_prefix(value.len())?)?;
        self.data.extend_from_slice(value);
        Ok(self.record(offset))
    }

    /// Append an IP address as a byte array of its network order octets.
    pub fn write_ip_address(&mut self, value: IpAddr) -> Result<u32> {
        match value {
            IpAddr::V4(v4) => self.write_byte_array(&v4.octets()),
            IpAddr::V6(v6) => self.write_byte_array(&v6.octets()),
        }
    }

    /// Append a 32 bit integer.
    pub fn write_integer(&mut self, value: i32) -> Result<u32> {
        let offset = self.append(&value)?;
        Ok(self.record(offset))
    }

    /// Append a single precision float.
    pub fn write_float(&mut self, value: f32) -> Result<u32> {
        let offset = self.append(&value)?;
        Ok(self.record(offset))
    }

    /// Append a 16 bit integer.
    pub fn write_short(&mut self, value: i16) -> Result<u32> {
        let offset = self.append(&value)?;
        Ok(self.record(offset))
    }

    /// Append an angle, in degrees, as an azimuth.
    pub fn write_azimuth(&mut self, degrees: f64) -> Result<u32> {
        self.write_short(compress_angle(degrees, AZIMUTH_MAX_DEGREES))
    }

    /// Append an angle, in degrees, as a declination.
    pub fn write_declination(&mut self, degrees: f64) -> Result<u32> {
        self.write_short(compress_angle(degrees, DECLINATION_MAX_DEGREES))
    }

    /// Append a single byte.
    pub fn write_byte(&mut self, value: u8) -> Result<u32> {
        let offset = self.append(&value)?;
        Ok(self.record(offset))
    }

    /// Append a record which is already encoded.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<u32> {
        let offset = u32::try_from(self.data.len())?;
        self.data.extend_from_slice(value);
        Ok(self.record(offset))
    }

    /// Append a record of little endian `u32` fields.
    pub fn write_u32s(&mut self, values: &[u32]) -> Result<u32> {
        let offset = u32::try_from(self.data.len())?;
        for value in values {
            BINCODER.serialize_into(&mut self.data, value)?;
        }
        Ok(self.record(offset))
    }

    /// Finish with a header holding the byte length of the records.
    pub fn finish_with_length(self) -> Result<Vec<u8>> {
        let length = u32::try_from(self.data.len())?;
        self.finish(length)
    }

    /// Finish with a header holding the number of records.
    pub fn finish_with_count(self) -> Result<Vec<u8>> {
        let count = self.count;
        self.finish(count)
    }

    fn finish(self, header: u32) -> Result<Vec<u8>> {
        let mut out = BINCODER.serialize(&header)?;
        out.extend_from_slice(&self.data);
        Ok(out)
    }
}

fn compress_angle(degrees: f64, max: f64) -> i16 {
    let raw = (degrees * f64::from(i16::MAX) / max).round();
    raw.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}
