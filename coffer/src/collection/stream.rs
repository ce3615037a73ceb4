use super::key::{CollectionKey, KeyType};
use super::{Collection, Item};
use crate::error::Result;

impl Collection {
    /// Iterate over every record in order.
    ///
    /// Fixed width collections are walked by index. Variable width collections are walked by
    /// offset, each record starting where the previous one ends, so `key_type` must size every
    /// record in the collection.
    pub fn records(&self, key_type: KeyType) -> Records<'_> {
        Records {
            collection: self,
            key_type,
            next: 0,
            exhausted: false,
            done: false,
        }
    }
}

/// Iterator over the records of a collection, yielding each record's index or offset with it.
///
/// Iteration stops early if a cache tier is full of held records, see
/// [`exhausted`](Records::exhausted).
pub struct Records<'a> {
    collection: &'a Collection,
    key_type: KeyType,
    next: u32,
    exhausted: bool,
    done: bool,
}

impl Records<'_> {
    /// Did iteration stop because a record couldn't be fetched from a full cache?
    pub fn exhausted(&self) -> bool {
        self.exhausted
    }
}

impl Iterator for Records<'_> {
    type Item = Result<(u32, Item)>;

    fn next(&mut self) -> Option<Self::Item> {
        let fixed = self.collection.element_size() > 0;
        let end = if fixed {
            self.collection.count()
        } else {
            self.collection.size()
        };
        if self.done || self.next >= end {
            return None;
        }

        let key = CollectionKey::index(self.next, self.key_type);
        match self.collection.get(&key) {
            Ok(Some(item)) => {
                let advance = if fixed { 1 } else { item.len() as u32 };
                if advance == 0 {
                    // A zero length record would be returned forever
                    self.done = true;
                }
                self.next = self.next.saturating_add(advance);
                Some(Ok((key.index_or_offset, item)))
            }
            Ok(None) => {
                self.exhausted = true;
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
