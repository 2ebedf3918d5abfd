//! Separate-chaining hash map over a [`Mem`].
//!
//! The bucket count is fixed at construction. Keys hash with
//! [`Hash31Hasher`] (`h = h * 31 + byte` over the bytes the key feeds to
//! its `Hash` impl), new entries go to the head of their bucket chain, and
//! `put` on an existing key swaps the value in place.

use std::borrow::Borrow;
use std::hash::{Hash, Hasher};

use bedrock_alloc::{AllocError, Mem};

use crate::slab::{Handle, Slab};
use crate::vec::MemVec;

/// Multiply-by-31 byte hasher.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hash31Hasher(u64);

impl Hasher for Hash31Hasher {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = self.0.wrapping_mul(31).wrapping_add(u64::from(byte));
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// Multiply-by-31 hash of a byte string.
///
/// ```
/// assert_eq!(bedrock_ds::map::hash31(b"ab"), 97 * 31 + 98);
/// ```
pub fn hash31(bytes: &[u8]) -> u64 {
    let mut hasher = Hash31Hasher::default();
    hasher.write(bytes);
    hasher.finish()
}

fn hash_key<Q: Hash + ?Sized>(key: &Q) -> u64 {
    let mut hasher = Hash31Hasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

struct Entry<K, V> {
    key: K,
    value: V,
    next: Option<Handle>,
}

/// Hash map with a fixed number of buckets whose storage comes from a
/// [`Mem`].
pub struct MemMap<'m, K, V> {
    buckets: MemVec<'m, Option<Handle>>,
    entries: Slab<'m, Entry<K, V>>,
}

impl<'m, K: Hash + Eq, V> MemMap<'m, K, V> {
    /// Create an empty map with `buckets` chains.
    ///
    /// Zero buckets is rejected with [`AllocError::InvalidConfig`].
    pub fn new(mem: &'m dyn Mem, buckets: usize) -> Result<Self, AllocError> {
        if buckets == 0 {
            return Err(AllocError::InvalidConfig {
                reason: "map bucket count must be non-zero".to_string(),
            });
        }
        let mut table = MemVec::with_capacity(mem, buckets)?;
        table.resize(buckets, None)?;
        Ok(Self {
            buckets: table,
            entries: Slab::new(mem),
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of bucket chains.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Insert `key` → `value`, returning the value it replaced.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>, AllocError> {
        let bucket = self.bucket_of(&key);
        if let Some(handle) = self.find(bucket, &key) {
            if let Some(entry) = self.entries.get_mut(handle) {
                return Ok(Some(std::mem::replace(&mut entry.value, value)));
            }
        }
        let next = self.buckets[bucket];
        let handle = self.entries.insert(Entry { key, value, next })?;
        self.buckets[bucket] = Some(handle);
        Ok(None)
    }

    /// Value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let handle = self.find(self.bucket_of(key), key)?;
        self.entries.get(handle).map(|e| &e.value)
    }

    /// Mutable variant of `get`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let handle = self.find(self.bucket_of(key), key)?;
        self.entries.get_mut(handle).map(|e| &mut e.value)
    }

    /// `true` if `key` is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Remove `key`, returning its entry.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let bucket = self.bucket_of(key);
        let mut prev: Option<Handle> = None;
        let mut cursor = self.buckets[bucket];
        while let Some(handle) = cursor {
            let entry = self.entries.get(handle)?;
            if key.eq(entry.key.borrow()) {
                let next = entry.next;
                match prev {
                    Some(prev) => {
                        if let Some(p) = self.entries.get_mut(prev) {
                            p.next = next;
                        }
                    }
                    None => self.buckets[bucket] = next,
                }
                return self.entries.remove(handle).map(|e| (e.key, e.value));
            }
            prev = Some(handle);
            cursor = entry.next;
        }
        None
    }

    /// Drop every entry, keeping the bucket table.
    pub fn clear(&mut self) {
        self.entries.clear();
        for head in self.buckets.iter_mut() {
            *head = None;
        }
    }

    /// Entries in bucket order, most recently inserted first within a
    /// bucket.
    pub fn iter(&self) -> Iter<'_, 'm, K, V> {
        Iter {
            map: self,
            bucket: 0,
            cursor: None,
        }
    }

    fn bucket_of<Q: Hash + ?Sized>(&self, key: &Q) -> usize {
        (hash_key(key) % self.buckets.len() as u64) as usize
    }

    fn find<Q>(&self, bucket: usize, key: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut cursor = self.buckets[bucket];
        while let Some(handle) = cursor {
            let entry = self.entries.get(handle)?;
            if key.eq(entry.key.borrow()) {
                return Some(handle);
            }
            cursor = entry.next;
        }
        None
    }
}

/// Iterator over map entries; see [`MemMap::iter`].
pub struct Iter<'a, 'm, K, V> {
    map: &'a MemMap<'m, K, V>,
    bucket: usize,
    cursor: Option<Handle>,
}

impl<'a, K, V> Iterator for Iter<'a, '_, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(handle) = self.cursor {
                let entry = self.map.entries.get(handle)?;
                self.cursor = entry.next;
                return Some((&entry.key, &entry.value));
            }
            let head = self.map.buckets.get(self.bucket)?;
            self.bucket += 1;
            self.cursor = *head;
        }
    }
}

impl<'a, 'm, K: Hash + Eq, V> IntoIterator for &'a MemMap<'m, K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, 'm, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
