//! Fx-hashed collections for interned names and pointer sets. Keys here are
//! never attacker-controlled hashes of untrusted sizes, so the faster
//! non-DoS-resistant hasher is fine.

pub type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

pub type FastHashSet<K> = rustc_hash::FxHashSet<K>;

#[inline]
pub fn fast_hash_map_new<K, V>() -> FastHashMap<K, V> {
    FastHashMap::default()
}

#[inline]
pub fn fast_hash_map_with_capacity<K, V>(capacity: usize) -> FastHashMap<K, V> {
    FastHashMap::with_capacity_and_hasher(capacity, Default::default())
}

#[inline]
pub fn fast_hash_set_new<K>() -> FastHashSet<K> {
    FastHashSet::default()
}
