//! Indexes over profile and value collections
//!
//! A data set describes profiles, each holding the indexes of its values ordered by property.
//! Finding the first value of a property for a profile would otherwise need a scan of the
//! profile, so [`PropertyProfileIndex`] precomputes it for every profile and property.
//!
//! Record layouts:
//!  - profile offset, fixed 8 bytes: profile id, byte offset of the profile
//!  - profile, variable: component index (1 byte), profile id, value count, value indexes
//!  - value, fixed 14 bytes: property index (16 bit), name offset, description offset, url offset

use std::cmp::Ordering;

use bincode::Options;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collection::key::{self, CollectionKey, KeyType};
use crate::collection::{Collection, Item, SearchOutcome};
use crate::error::{CofferError, Result};
use crate::value::{PropertyValueType, StoredBinaryValue};
use crate::BINCODER;

/// Profile offset records.
pub const PROFILE_OFFSET: KeyType = KeyType::fixed("profile offset", 8);

/// Profile records.
pub const PROFILE: KeyType = KeyType::variable("profile", 9, profile_size);

/// Value records.
pub const VALUE: KeyType = KeyType::fixed("value", 14);

fn decode<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    BINCODER
        .deserialize(bytes)
        .map_err(|e| CofferError::CorruptData(e.to_string()))
}

/// Locates a profile by id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOffset {
    /// Unique id of the profile
    pub profile_id: u32,
    /// Byte offset of the profile in the profiles collection
    pub offset: u32,
}

/// Fixed start of a profile record, followed by `value_count` value indexes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileHeader {
    /// Component the profile belongs to
    pub component_index: u8,
    /// Unique id of the profile
    pub profile_id: u32,
    /// Number of value indexes
    pub value_count: u32,
}

/// A value record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRecord {
    /// Property the value belongs to
    pub property_index: i16,
    /// Offset of the name in the strings collection
    pub name_offset: i32,
    /// Offset of the description in the strings collection
    pub description_offset: i32,
    /// Offset of the url in the strings collection
    pub url_offset: i32,
}

impl ProfileOffset {
    /// Decode a profile offset record.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

impl ValueRecord {
    /// Decode a value record.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

/// Full size of a profile record from its header.
pub fn profile_size(header: &[u8]) -> Result<u32> {
    let header: ProfileHeader = decode(header)?;
    header
        .value_count
        .checked_mul(4)
        .and_then(|values| values.checked_add(PROFILE.initial_bytes()))
        .ok_or_else(|| CofferError::CorruptData(format!("value count: {}", header.value_count)))
}

fn fetch(collection: &Collection, key: CollectionKey) -> Result<Item> {
    collection.get(&key)?.ok_or_else(|| collection.exhausted())
}

/// A profile record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    /// The fixed start of the record
    pub header: ProfileHeader,
    /// Indexes of the profile's values, ordered by property
    pub values: Vec<u32>,
}

impl Profile {
    /// Decode a profile record.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header: ProfileHeader = decode(bytes)?;
        let start = PROFILE.initial_bytes() as usize;
        let end = profile_size(bytes)? as usize;
        let values = bytes
            .get(start..end)
            .ok_or_else(|| {
                CofferError::CorruptData(format!("profile of {} bytes, {end} needed", bytes.len()))
            })?
            .chunks_exact(4)
            .map(decode::<u32>)
            .collect::<Result<Vec<u32>>>()?;
        Ok(Self { header, values })
    }
}

/// First value of every property for every profile.
#[derive(Debug)]
pub struct PropertyProfileIndex {
    property_count: u32,
    profile_count: u32,
    filled: u32,
    value_indexes: Vec<Option<u32>>,
}

impl PropertyProfileIndex {
    /// Build the index.
    ///
    /// `profile_offsets` must be ordered by profile id. Properties without a value in a profile
    /// have no entry.
    pub fn build(
        profile_offsets: &Collection,
        profiles: &Collection,
        values: &Collection,
        property_count: u32,
    ) -> Result<Self> {
        let profile_count = profile_offsets.count();
        let max_profile_id = match profile_count.checked_sub(1) {
            Some(last) => {
                let key = CollectionKey::index(last, PROFILE_OFFSET);
                ProfileOffset::decode(&fetch(profile_offsets, key)?)?.profile_id
            }
            None => 0,
        };
        let size = (max_profile_id as usize)
            .checked_add(1)
            .and_then(|rows| rows.checked_mul(property_count as usize))
            .ok_or(CofferError::InsufficientMemory(usize::MAX))?;
        let mut value_indexes = Vec::new();
        value_indexes
            .try_reserve_exact(size)
            .map_err(|_| CofferError::InsufficientMemory(size))?;
        value_indexes.resize(size, None);

        let mut index = Self {
            property_count,
            profile_count,
            filled: 0,
            value_indexes,
        };
        for i in 0..profile_count {
            let key = CollectionKey::index(i, PROFILE_OFFSET);
            let offset = ProfileOffset::decode(&fetch(profile_offsets, key)?)?;
            let key = CollectionKey::offset(offset.offset, PROFILE);
            let profile = Profile::decode(&fetch(profiles, key)?)?;
            index.add_profile(&profile, values)?;
        }
        debug!(
            "property profile index: {} profiles, {} properties, {} of {} filled",
            index.profile_count,
            index.property_count,
            index.filled,
            index.value_indexes.len()
        );
        Ok(index)
    }

    fn add_profile(&mut self, profile: &Profile, values: &Collection) -> Result<()> {
        let row = profile.header.profile_id as usize * self.property_count as usize;
        let Some(slots) = self
            .value_indexes
            .get_mut(row..row + self.property_count as usize)
        else {
            return Err(CofferError::CorruptData(format!(
                "profile id: {} is above the last profile offset",
                profile.header.profile_id
            )));
        };
        // Values are ordered by property, so the first seen for a property is its first value
        let mut next_property = 0;
        for value_index in &profile.values {
            let key = CollectionKey::index(*value_index, VALUE);
            let value = ValueRecord::decode(&fetch(values, key)?)?;
            let Ok(property) = usize::try_from(value.property_index) else {
                continue;
            };
            if property >= next_property && property < slots.len() {
                slots[property] = Some(*value_index);
                next_property = property + 1;
                self.filled += 1;
            }
        }
        Ok(())
    }

    /// Index of the first value of a property in a profile.
    pub fn lookup(&self, profile_id: u32, property_index: u32) -> Option<u32> {
        if property_index >= self.property_count {
            return None;
        }
        let position = profile_id as usize * self.property_count as usize + property_index as usize;
        self.value_indexes.get(position).copied().flatten()
    }

    /// Number of profiles indexed.
    pub fn profile_count(&self) -> u32 {
        self.profile_count
    }

    /// Number of properties per profile.
    pub fn property_count(&self) -> u32 {
        self.property_count
    }

    /// Number of (profile, property) pairs with a value.
    pub fn filled(&self) -> u32 {
        self.filled
    }
}

/// Find a value by name in the value range `[first, last]` of a property.
///
/// Values in the range must be ordered by name. Names are compared byte by byte.
pub fn value_index_by_name(
    values: &Collection,
    strings: &Collection,
    first: u32,
    last: u32,
    name: &str,
) -> Result<Option<u32>> {
    let outcome = values.binary_search(first, last, VALUE, |item, _key| {
        let value = ValueRecord::decode(item)?;
        let offset = u32::try_from(value.name_offset)
            .map_err(|_| CofferError::CorruptData(format!("name offset: {}", value.name_offset)))?;
        let stored = fetch(strings, CollectionKey::offset(offset, key::STRING))?;
        match StoredBinaryValue::decode(&stored, PropertyValueType::String)? {
            StoredBinaryValue::String(text) => Ok(text.cmp(name.as_bytes())),
            _ => Ok(Ordering::Less),
        }
    })?;
    match outcome {
        SearchOutcome::Found { index, .. } => Ok(Some(index)),
        SearchOutcome::NotFound => Ok(None),
        SearchOutcome::Exhausted => Err(values.exhausted()),
    }
}
