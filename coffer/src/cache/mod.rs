//! Sharded fixed capacity cache
//!
//! The cache holds at most `capacity` loaded values, split evenly across `concurrency` shards
//! which are locked independently. A key always maps to the same shard.
//!
//! Within a shard every node is either active (checked out by at least one [`CacheRef`]) or
//! inactive. Inactive nodes are kept in recency order and the oldest is reused when a missing
//! key has to be loaded. Active nodes are never reused. When every node of a shard is active,
//! a miss returns `Ok(None)`: the cache is full of pinned values and the caller must back off.
//!
//! Loading happens while the shard is locked, so a missing key is loaded at most once however
//! many threads ask for it.

use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{CofferError, Result};

mod sparse;

use sparse::BuildIdentityHasher;

const NIL: usize = usize::MAX;

/// Loads the value of a key which isn't resident.
pub trait Loader<K>: Send + Sync {
    /// Load the value for `key`.
    fn load(&self, key: &K) -> Result<Bytes>;
}

// Blanket implementation for closures
impl<K, F> Loader<K> for F
where
    F: Fn(&K) -> Result<Bytes> + Send + Sync,
{
    fn load(&self, key: &K) -> Result<Bytes> {
        self(key)
    }
}

/// Mix the bits of a 32 bit key (murmur3 finalizer) to pick a shard.
pub fn hash32(key: u32) -> u64 {
    let mut h = key;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    u64::from(h)
}

#[derive(Debug)]
struct Node<K> {
    key: Option<K>,
    data: Bytes,
    active: u32,
    // Neighbours in the inactive list
    prev: usize,
    next: usize,
}

#[derive(Debug)]
struct Shard<K> {
    nodes: Vec<Node<K>>,
    resident: HashMap<K, usize, BuildIdentityHasher>,
    // Most recently released
    head: usize,
    // Next to be reused
    tail: usize,
}

impl<K> Shard<K> {
    fn new(size: usize) -> Self {
        let mut shard = Self {
            nodes: Vec::with_capacity(size),
            resident: HashMap::default(),
            head: NIL,
            tail: NIL,
        };
        for index in 0..size {
            shard.nodes.push(Node {
                key: None,
                data: Bytes::new(),
                active: 0,
                prev: NIL,
                next: NIL,
            });
            shard.link_tail(index);
        }
        shard
    }

    fn link_head(&mut self, index: usize) {
        self.nodes[index].prev = NIL;
        self.nodes[index].next = self.head;
        match self.head {
            NIL => self.tail = index,
            head => self.nodes[head].prev = index,
        }
        self.head = index;
    }

    fn link_tail(&mut self, index: usize) {
        self.nodes[index].next = NIL;
        self.nodes[index].prev = self.tail;
        match self.tail {
            NIL => self.head = index,
            tail => self.nodes[tail].next = index,
        }
        self.tail = index;
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = (self.nodes[index].prev, self.nodes[index].next);
        match prev {
            NIL => self.head = next,
            prev => self.nodes[prev].next = next,
        }
        match next {
            NIL => self.tail = prev,
            next => self.nodes[next].prev = prev,
        }
        self.nodes[index].prev = NIL;
        self.nodes[index].next = NIL;
    }

    fn release(&mut self, index: usize) {
        let node = &mut self.nodes[index];
        node.active = node.active.saturating_sub(1);
        if node.active == 0 {
            self.link_head(index);
        }
    }
}

/// A sharded cache of loaded values.
pub struct Cache<K, L> {
    shards: Vec<Arc<Mutex<Shard<K>>>>,
    loader: L,
    hasher: fn(&K) -> u64,
    capacity: u32,
    concurrency: u16,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, L> Cache<K, L>
where
    K: Clone + Eq + Hash,
    L: Loader<K>,
{
    /// Create a cache of `capacity` nodes across `concurrency` shards.
    ///
    /// Fails if a shard would hold fewer nodes than `concurrency`.
    pub fn try_new(
        capacity: u32,
        concurrency: u16,
        loader: L,
        hasher: fn(&K) -> u64,
    ) -> Result<Self> {
        if concurrency == 0 || capacity / u32::from(concurrency) < u32::from(concurrency) {
            return Err(CofferError::TooManyConcurrentOperations {
                capacity,
                concurrency,
            });
        }
        let per_shard = (capacity / u32::from(concurrency)) as usize;
        tracing::debug!("Creating cache with: {concurrency} shards of: {per_shard} nodes");
        let shards = (0..concurrency)
            .map(|_| Arc::new(Mutex::new(Shard::new(per_shard))))
            .collect();
        Ok(Self {
            shards,
            loader,
            hasher,
            capacity,
            concurrency,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Get the value for `key`, loading it if it isn't resident.
    ///
    /// `Ok(None)` means every node of the key's shard is checked out.
    pub fn get(&self, key: &K) -> Result<Option<CacheRef<K>>> {
        let shard = &self.shards[((self.hasher)(key) % self.shards.len() as u64) as usize];
        let mut guard = shard.lock();

        let hit = guard.resident.get(key).copied();
        if let Some(index) = hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
            if guard.nodes[index].active == 0 {
                guard.unlink(index);
            }
            guard.nodes[index].active += 1;
            return Ok(Some(CacheRef {
                shard: Arc::clone(shard),
                node: index,
                data: guard.nodes[index].data.clone(),
            }));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let index = guard.tail;
        if index == NIL {
            return Ok(None);
        }
        guard.unlink(index);
        if let Some(old) = guard.nodes[index].key.take() {
            tracing::trace!("Evicting node: {index}");
            guard.resident.remove(&old);
        }

        match self.loader.load(key) {
            Ok(data) => {
                let node = &mut guard.nodes[index];
                node.key = Some(key.clone());
                node.data = data.clone();
                node.active = 1;
                guard.resident.insert(key.clone(), index);
                Ok(Some(CacheRef {
                    shard: Arc::clone(shard),
                    node: index,
                    data,
                }))
            }
            Err(e) => {
                tracing::warn!("Cache loader failed: {e}");
                guard.nodes[index].data = Bytes::new();
                guard.link_tail(index);
                Err(e)
            }
        }
    }

    /// Keys found resident.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Keys which had to be loaded, or couldn't be.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Configured capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of shards.
    pub fn concurrency(&self) -> u16 {
        self.concurrency
    }

    /// Number of resident keys.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().resident.len()).sum()
    }

    /// Is nothing resident?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A checked out cache value. The node is released when this is dropped.
pub struct CacheRef<K> {
    shard: Arc<Mutex<Shard<K>>>,
    node: usize,
    data: Bytes,
}

impl<K> CacheRef<K> {
    /// The cached bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl<K> Deref for CacheRef<K> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl<K> std::fmt::Debug for CacheRef<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRef")
            .field("node", &self.node)
            .field("len", &self.data.len())
            .finish()
    }
}

impl<K> Drop for CacheRef<K> {
    fn drop(&mut self) {
        self.shard.lock().release(self.node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::AtomicUsize;

    fn id(key: &u32) -> u64 {
        hash32(*key)
    }

    fn value(key: &u32) -> Bytes {
        Bytes::from(key.to_le_bytes().to_vec())
    }

    fn loader(key: &u32) -> Result<Bytes> {
        Ok(value(key))
    }

    #[test]
    fn it_rejects_too_many_concurrent_operations() {
        assert!(matches!(
            Cache::try_new(10, 100, loader, id),
            Err(CofferError::TooManyConcurrentOperations {
                capacity: 10,
                concurrency: 100
            })
        ));
        assert!(Cache::try_new(10, 0, loader, id).is_err());
        assert!(Cache::try_new(16, 4, loader, id).is_ok());
        assert!(Cache::try_new(15, 4, loader, id).is_err());
    }

    #[test_log::test]
    fn it_loads_each_key_once() {
        let loads = AtomicUsize::new(0);
        let cache = Cache::try_new(
            16,
            1,
            |key: &u32| {
                loads.fetch_add(1, Ordering::SeqCst);
                loader(key)
            },
            id,
        )
        .expect("creates cache");

        for _ in 0..3 {
            let item = cache.get(&7).expect("gets").expect("not exhausted");
            assert_eq!(&item[..], &7u32.to_le_bytes());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn it_evicts_the_oldest_inactive_node() {
        let cache = Cache::try_new(2, 1, loader, id).expect("creates cache");
        drop(cache.get(&1).expect("gets"));
        drop(cache.get(&2).expect("gets"));
        // 1 is now oldest
        drop(cache.get(&3).expect("gets"));
        let shard = cache.shards[0].lock();
        assert!(!shard.resident.contains_key(&1));
        assert!(shard.resident.contains_key(&2));
        assert!(shard.resident.contains_key(&3));
    }

    #[test]
    fn it_never_evicts_active_nodes() {
        let cache = Cache::try_new(4, 2, loader, id).expect("creates cache");
        let held = cache.get(&42).expect("gets").expect("not exhausted");
        let mut rng = rand::thread_rng();
        for _ in 0..1_000 {
            let key = rng.gen_range(0..100);
            if let Some(item) = cache.get(&key).expect("gets") {
                assert_eq!(&item[..], &key.to_le_bytes());
            }
        }
        assert_eq!(&held[..], &42u32.to_le_bytes());
        let misses = cache.misses();
        drop(cache.get(&42).expect("gets"));
        assert_eq!(cache.misses(), misses);
    }

    #[test]
    fn it_bounds_resident_keys_per_shard() {
        let cache = Cache::try_new(64, 4, loader, id).expect("creates cache");
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let key = rng.gen::<u32>();
            drop(cache.get(&key).expect("gets"));
            for shard in &cache.shards {
                assert!(shard.lock().resident.len() <= 16);
            }
        }
        assert_eq!(cache.len(), 64);
    }

    #[test]
    fn it_returns_none_when_all_nodes_are_active() {
        let cache = Cache::try_new(1, 1, loader, id).expect("creates cache");
        let first = cache.get(&1).expect("gets").expect("not exhausted");
        assert!(cache.get(&2).expect("no error").is_none());
        // Resident keys are still available
        assert!(cache.get(&1).expect("gets").is_some());
        drop(first);
        assert!(cache.get(&2).expect("gets").is_some());
    }

    #[test]
    fn it_survives_loader_failures() {
        let cache = Cache::try_new(
            1,
            1,
            |key: &u32| {
                if *key == 13 {
                    Err(CofferError::CorruptData("unlucky".to_string()))
                } else {
                    loader(key)
                }
            },
            id,
        )
        .expect("creates cache");
        assert!(matches!(cache.get(&13), Err(CofferError::CorruptData(_))));
        assert!(cache.is_empty());
        let item = cache.get(&12).expect("gets").expect("not exhausted");
        assert_eq!(&item[..], &12u32.to_le_bytes());
    }

    #[test_log::test]
    fn it_serves_many_threads() {
        let cache = Cache::try_new(256, 8, loader, id).expect("creates cache");
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let mut rng = rand::thread_rng();
                    for _ in 0..5_000 {
                        let key = rng.gen_range(0..512u32);
                        if let Some(item) = cache.get(&key).expect("gets") {
                            assert_eq!(item.data(), &value(&key));
                        }
                    }
                });
            }
        });
        assert!(cache.len() <= 256);
        assert_eq!(cache.hits() + cache.misses(), 40_000);
    }

    #[test_log::test]
    fn it_loads_each_key_once_across_threads() {
        let loads = AtomicUsize::new(0);
        let cache = Cache::try_new(
            16,
            1,
            |key: &u32| {
                loads.fetch_add(1, Ordering::SeqCst);
                // Give the other threads time to ask for the same key
                std::thread::sleep(std::time::Duration::from_millis(20));
                loader(key)
            },
            id,
        )
        .expect("creates cache");
        let start = std::sync::Barrier::new(8);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    start.wait();
                    let item = cache.get(&7).expect("gets").expect("not exhausted");
                    assert_eq!(&item[..], &7u32.to_le_bytes());
                });
            }
        });
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 7);
        assert_eq!(cache.len(), 1);
    }
}
