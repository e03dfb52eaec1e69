//! Sharded keyed locks.
//!
//! A [`ShardGroup`] distributes keys over a fixed number of independent [`LockRegistry`] shards.
//! Each registry has its own guard, so bookkeeping for keys in different shards never contends.

mod shard_hash;

use std::{collections::BTreeMap, hash::Hash, str::FromStr, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    config::global_config,
    key_lock::{
        canonical_order, registry::KeyLock, Access, KeyLockerBatchTraits, KeyLockerTraits,
        LockRegistry, LockStatistics,
    },
};

pub use shard_hash::SimpleHasher;
use shard_hash::ShardHash;

/// The hash used to map a key to its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum HashChoice {
    /// A positional polynomial hash, see [`SimpleHasher`].
    ///
    /// Adequate when keys are already well distributed, such as dense integers.
    #[display("simple")]
    Simple,
    /// A seeded [`ahash`] hash.
    ///
    /// Suitable for clustered or adversarial keys.
    /// Each shard group draws its own seed, so the key to shard mapping differs between groups and between processes.
    #[display("strong")]
    Strong,
}

/// An invalid [`HashChoice`] string.
#[derive(Debug, Error)]
#[error("invalid hash choice {0}, expected simple or strong")]
pub struct HashChoiceParseError(String);

impl FromStr for HashChoice {
    type Err = HashChoiceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "strong" => Ok(Self::Strong),
            _ => Err(HashChoiceParseError(s.to_string())),
        }
    }
}

/// A shard group creation error.
#[derive(Debug, Error)]
pub enum ShardGroupCreateError {
    /// The shard count is zero.
    #[error("a shard group requires at least one shard")]
    ZeroShardCount,
}

/// A fixed set of independent [`LockRegistry`] shards.
///
/// Every key maps to exactly one shard for the lifetime of the group, so all operations on a key serialize against that shard's guard and that key's lock only.
/// When the shard count is a power of two the shard index is derived with a mask, otherwise with a modulus.
///
/// Batch operations sort and deduplicate keys globally, register the keys of each shard under one hold of that shard's guard, then acquire the locks in the global order.
pub struct ShardGroup<K> {
    shards: Box<[LockRegistry<K>]>,
    hash: ShardHash,
    hash_choice: HashChoice,
    mask: Option<usize>,
}

impl<K> core::fmt::Debug for ShardGroup<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShardGroup")
            .field("shard_count", &self.shards.len())
            .field("hash_choice", &self.hash_choice)
            .finish_non_exhaustive()
    }
}

impl<K: Eq + Hash> Default for ShardGroup<K> {
    /// Create a new shard group from the [global configuration](crate::config::global_config), see [`ShardGroup::with_default_config`].
    ///
    /// # Panics
    /// Panics if the configured default shard count is zero.
    fn default() -> Self {
        match Self::with_default_config() {
            Ok(shard_group) => shard_group,
            Err(err) => panic!("invalid default shard group configuration: {err}"),
        }
    }
}

impl<K: Eq + Hash> ShardGroup<K> {
    /// Create a new shard group with `shard_count` shards and the key to shard hash `hash_choice`.
    ///
    /// # Errors
    /// Returns [`ShardGroupCreateError::ZeroShardCount`] if `shard_count` is zero.
    pub fn new(shard_count: usize, hash_choice: HashChoice) -> Result<Self, ShardGroupCreateError> {
        if shard_count == 0 {
            return Err(ShardGroupCreateError::ZeroShardCount);
        }
        let hash = match hash_choice {
            HashChoice::Simple => ShardHash::Simple(std::hash::BuildHasherDefault::default()),
            HashChoice::Strong => ShardHash::Strong(ahash::RandomState::new()),
        };
        let shards = (0..shard_count).map(|_| LockRegistry::new()).collect();
        log::debug!("created shard group with {shard_count} shards and {hash_choice} hash");
        Ok(Self {
            shards,
            hash,
            hash_choice,
            mask: shard_count.is_power_of_two().then(|| shard_count - 1),
        })
    }

    /// Create a new shard group with the [default shard count](crate::config::Config#default-shard-count) and [default hash choice](crate::config::Config#default-hash-choice) of the [global configuration](crate::config::global_config).
    ///
    /// # Errors
    /// Returns [`ShardGroupCreateError::ZeroShardCount`] if the configured shard count is zero.
    pub fn with_default_config() -> Result<Self, ShardGroupCreateError> {
        let (shard_count, hash_choice) = {
            let config = global_config();
            (config.default_shard_count(), config.default_hash_choice())
        };
        Self::new(shard_count, hash_choice)
    }

    /// Returns the number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns the key to shard hash.
    #[must_use]
    pub fn hash_choice(&self) -> HashChoice {
        self.hash_choice
    }

    /// Returns the shards.
    #[must_use]
    pub fn shards(&self) -> &[LockRegistry<K>] {
        &self.shards
    }

    /// Returns the index of the shard that owns `key`.
    ///
    /// The index is stable for the lifetime of this shard group.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn shard_index(&self, key: &K) -> usize {
        let hash = self.hash.hash_one(key) as usize;
        match self.mask {
            Some(mask) => hash & mask,
            None => hash % self.shards.len(),
        }
    }

    /// Returns the shard that owns `key`.
    #[must_use]
    pub fn shard(&self, key: &K) -> &LockRegistry<K> {
        &self.shards[self.shard_index(key)]
    }

    /// Returns the number of keys that currently have a lock entry across all shards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(LockRegistry::len).sum()
    }

    /// Returns true if no shard has a lock entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(LockRegistry::is_empty)
    }

    /// Returns true if `key` currently has a lock entry.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.shard(key).contains_key(key)
    }

    /// Returns the statistics summed over all shards.
    #[must_use]
    pub fn stats(&self) -> LockStatistics {
        self.shards.iter().map(LockRegistry::stats).sum()
    }

    /// Group canonically ordered keys by shard, keeping the position of each key.
    fn partition<'k>(&self, keys: &[&'k K]) -> BTreeMap<usize, (Vec<usize>, Vec<&'k K>)> {
        let mut partitions: BTreeMap<usize, (Vec<usize>, Vec<&K>)> = BTreeMap::new();
        for (position, &key) in keys.iter().enumerate() {
            let (positions, shard_keys) = partitions.entry(self.shard_index(key)).or_default();
            positions.push(position);
            shard_keys.push(key);
        }
        partitions
    }
}

impl<K: Eq + Hash + Clone> ShardGroup<K> {
    fn register_many(&self, keys: &[&K], access: Access) -> Vec<Arc<KeyLock>> {
        let mut locks: Vec<Option<Arc<KeyLock>>> = vec![None; keys.len()];
        for (index, (positions, shard_keys)) in self.partition(keys) {
            let shard_locks = self.shards[index].register_many(&shard_keys, access);
            for (position, lock) in positions.into_iter().zip(shard_locks) {
                locks[position] = Some(lock);
            }
        }
        locks.into_iter().flatten().collect()
    }
}

impl<K: Eq + Hash + Clone + Ord> ShardGroup<K> {
    fn lock_many_with(&self, keys: &[K], access: Access) {
        let keys = canonical_order(keys);
        for lock in self.register_many(&keys, access) {
            lock.acquire(access);
        }
    }

    /// Release a batch of keys across shards.
    ///
    /// The guards of every touched shard are taken in ascending shard order and every key is checked before any is released.
    #[track_caller]
    fn unlock_many_with(&self, keys: &[K], access: Access, operation: &str) {
        let keys = canonical_order(keys);
        let mut partitions: Vec<_> = self
            .partition(&keys)
            .into_iter()
            .map(|(index, (_, shard_keys))| (self.shards[index].lock_state(), shard_keys))
            .collect();
        for (state, shard_keys) in &partitions {
            state.check_held(shard_keys, access, operation);
        }
        for (state, shard_keys) in &mut partitions {
            state.release_held(shard_keys, access);
        }
    }
}

impl<K: Eq + Hash + Clone + Send> KeyLockerTraits<K> for ShardGroup<K> {
    fn lock(&self, key: &K) {
        self.shard(key).lock(key);
    }

    fn unlock(&self, key: &K) {
        self.shard(key).unlock(key);
    }

    fn read_lock(&self, key: &K) {
        self.shard(key).read_lock(key);
    }

    fn read_unlock(&self, key: &K) {
        self.shard(key).read_unlock(key);
    }

    fn try_lock(&self, key: &K) -> bool {
        self.shard(key).try_lock(key)
    }

    fn try_read_lock(&self, key: &K) -> bool {
        self.shard(key).try_read_lock(key)
    }

    fn try_lock_for(&self, key: &K, timeout: Duration) -> bool {
        self.shard(key).try_lock_for(key, timeout)
    }

    fn try_read_lock_for(&self, key: &K, timeout: Duration) -> bool {
        self.shard(key).try_read_lock_for(key, timeout)
    }
}

impl<K: Eq + Hash + Clone + Send + Ord> KeyLockerBatchTraits<K> for ShardGroup<K> {
    fn lock_many(&self, keys: &[K]) {
        self.lock_many_with(keys, Access::Exclusive);
    }

    fn unlock_many(&self, keys: &[K]) {
        self.unlock_many_with(keys, Access::Exclusive, "unlock_many");
    }

    fn read_lock_many(&self, keys: &[K]) {
        self.lock_many_with(keys, Access::Shared);
    }

    fn read_unlock_many(&self, keys: &[K]) {
        self.unlock_many_with(keys, Access::Shared, "read_unlock_many");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use super::*;

    #[test]
    fn shard_group_zero_shards() {
        assert!(matches!(
            ShardGroup::<u32>::new(0, HashChoice::Strong),
            Err(ShardGroupCreateError::ZeroShardCount)
        ));
    }

    #[test]
    fn shard_group_simple_index() {
        let group = ShardGroup::<u64>::new(8, HashChoice::Simple).unwrap();
        for key in 0..64 {
            assert_eq!(group.shard_index(&key), (key % 8) as usize);
        }
        let group = ShardGroup::<u64>::new(6, HashChoice::Simple).unwrap();
        for key in 0..64 {
            assert_eq!(group.shard_index(&key), (key % 6) as usize);
        }
    }

    #[test]
    fn shard_group_index_determinism() {
        for hash_choice in [HashChoice::Simple, HashChoice::Strong] {
            for shard_count in [1, 5, 16] {
                let group = ShardGroup::<String>::new(shard_count, hash_choice).unwrap();
                for key in (0..100).map(|i| format!("key{i}")) {
                    let index = group.shard_index(&key);
                    assert!(index < shard_count);
                    for _ in 0..4 {
                        assert_eq!(group.shard_index(&key), index);
                    }
                }
            }
        }
    }

    #[test]
    fn shard_group_strong_spreads_clustered_keys() {
        let group = ShardGroup::<u64>::new(16, HashChoice::Strong).unwrap();
        let used: std::collections::HashSet<usize> =
            (0..256).map(|i| group.shard_index(&(i * 16))).collect();
        assert!(used.len() > 1);
    }

    #[test]
    fn shard_group_lock_unlock() {
        let group = ShardGroup::new(4, HashChoice::Simple).unwrap();
        group.lock(&1u32);
        group.read_lock(&2);
        assert!(group.contains_key(&1));
        assert!(group.shard(&1).contains_key(&1));
        assert!(!group.shards()[0].contains_key(&1));
        assert_eq!(group.len(), 2);
        assert!(!group.try_read_lock(&1));
        assert!(group.try_read_lock(&2));
        group.unlock(&1);
        group.read_unlock(&2);
        group.read_unlock(&2);
        assert!(group.is_empty());
        let stats = group.stats();
        assert_eq!(stats.entries_created, 2);
        assert_eq!(stats.entries_reclaimed, 2);
    }

    #[test]
    fn shard_group_batch_across_shards() {
        let group = ShardGroup::new(4, HashChoice::Simple).unwrap();
        group.lock_many(&[7u32, 0, 5, 0, 2]);
        assert_eq!(group.len(), 4);
        assert!(!group.try_lock_for(&5, Duration::from_millis(1)));
        group.unlock_many(&[0, 2, 5, 7]);
        assert!(group.is_empty());

        group.read_lock_many(&[1, 3]);
        assert!(group.try_read_lock(&3));
        group.read_unlock(&3);
        group.read_unlock_many(&[3, 1]);
        assert!(group.is_empty());
    }

    #[test]
    #[should_panic(expected = "unlock of a key with no lock entry")]
    fn shard_group_unlock_unknown_key() {
        let group = ShardGroup::new(2, HashChoice::Strong).unwrap();
        group.unlock(&"a");
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn shard_group_readers_share() {
        let readers = 4;
        let group = ShardGroup::new(4, HashChoice::Strong).unwrap();
        let barrier = Barrier::new(readers);
        std::thread::scope(|s| {
            for _ in 0..readers {
                s.spawn(|| {
                    group.read_lock_many(&["x", "y"]);
                    barrier.wait();
                    group.read_unlock_many(&["y", "x"]);
                });
            }
        });
        assert!(group.is_empty());
    }

    #[test]
    fn hash_choice_from_str() {
        assert_eq!("simple".parse::<HashChoice>().unwrap(), HashChoice::Simple);
        assert_eq!("Strong".parse::<HashChoice>().unwrap(), HashChoice::Strong);
        assert_eq!(HashChoice::Strong.to_string(), "strong");
        assert_eq!(
            "fast".parse::<HashChoice>().unwrap_err().to_string(),
            "invalid hash choice fast, expected simple or strong"
        );
    }

    #[test]
    fn shard_group_default_config() {
        let group = ShardGroup::<u32>::with_default_config().unwrap();
        assert!(group.shard_count() > 0);
        let group = ShardGroup::<String>::default();
        assert!(group.shard_count() > 0);
        group.lock(&"a".to_string());
        group.unlock(&"a".to_string());
        assert!(group.is_empty());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn shard_group_batch_misuse_leaves_holds_intact() {
        let group = ShardGroup::new(4, HashChoice::Simple).unwrap();
        group.lock_many(&[0u32, 1]);
        // Key 3 lives in a later shard than the held keys and was never locked.
        let result = std::thread::scope(|s| s.spawn(|| group.unlock_many(&[0, 1, 3])).join());
        assert!(result.is_err());
        assert!(!group.try_lock_for(&0, Duration::from_millis(1)));
        assert!(!group.try_lock_for(&1, Duration::from_millis(1)));
        group.unlock_many(&[0, 1]);
        assert!(group.is_empty());

        group.read_lock_many(&[2u32, 3]);
        let result = std::thread::scope(|s| s.spawn(|| group.read_unlock_many(&[1, 2, 3])).join());
        assert!(result.is_err());
        assert!(!group.try_lock(&2));
        group.read_unlock_many(&[2, 3]);
        assert!(group.is_empty());
    }
}
