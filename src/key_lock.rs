//! Keyed read/write lock traits, objects and implementations.
//!
//! [`KeyLockerTraits`] is implemented by every keyed lock manager to acquire and release a read/write lock for a key.
//! [`KeyLockerBatchTraits`] extends it with operations over a batch of keys.
//!
//! The lock managers include:
//!  - [`LockRegistry`]: a table of per-key locks guarded by a single [`parking_lot::Mutex`].
//!    - Lock state is created on first use and reclaimed when the last holder or waiter releases it.
//!  - [`ShardGroup`](crate::shard_group::ShardGroup): a fixed set of [`LockRegistry`] shards selected by a hash of the key.
//!  - [`DisabledKeyLocks`] disables locking for single-threaded use.
//!    - **Provides no mutual exclusion whatsoever**.
//!
//! The `lock`/`unlock` style methods mirror the discipline of a raw read/write lock.
//! [`KeyLockerExt`] wraps them in RAII guards which release the lock when dropped.

mod batch;
pub mod disabled;
mod guard;
pub mod registry;
mod statistics;

use std::time::Duration;

pub use disabled::DisabledKeyLocks;
pub use guard::{KeyLockerExt, KeyReadGuard, KeyWriteGuard, KeysReadGuard, KeysWriteGuard};
pub use registry::LockRegistry;
pub use statistics::LockStatistics;

/// Traits for keyed read/write lock managers.
///
/// A key may be held by any number of readers or by exactly one writer, never both.
/// Locks for different keys are independent.
///
/// Locks are not reentrant: acquiring a key that the current thread already holds exclusively will deadlock.
pub trait KeyLockerTraits<K>: Send + Sync + core::fmt::Debug {
    /// Acquires an exclusive lock on `key`, blocking the current thread until it is able to do so.
    fn lock(&self, key: &K);

    /// Releases an exclusive lock on `key` previously acquired with [`lock`](KeyLockerTraits::lock).
    ///
    /// # Panics
    /// Panics if `key` is not exclusively locked.
    fn unlock(&self, key: &K);

    /// Acquires a shared lock on `key`, blocking the current thread until it is able to do so.
    fn read_lock(&self, key: &K);

    /// Releases a shared lock on `key` previously acquired with [`read_lock`](KeyLockerTraits::read_lock).
    ///
    /// # Panics
    /// Panics if `key` is not locked for reading.
    fn read_unlock(&self, key: &K);

    /// Attempts to acquire an exclusive lock on `key` without blocking.
    ///
    /// Returns `true` if the lock was acquired, in which case it must be released with [`unlock`](KeyLockerTraits::unlock).
    fn try_lock(&self, key: &K) -> bool;

    /// Attempts to acquire a shared lock on `key` without blocking.
    ///
    /// Returns `true` if the lock was acquired, in which case it must be released with [`read_unlock`](KeyLockerTraits::read_unlock).
    fn try_read_lock(&self, key: &K) -> bool;

    /// Attempts to acquire an exclusive lock on `key`, blocking for at most `timeout`.
    ///
    /// Returns `true` if the lock was acquired.
    fn try_lock_for(&self, key: &K, timeout: Duration) -> bool;

    /// Attempts to acquire a shared lock on `key`, blocking for at most `timeout`.
    ///
    /// Returns `true` if the lock was acquired.
    fn try_read_lock_for(&self, key: &K, timeout: Duration) -> bool;
}

/// Traits for keyed read/write lock managers which can lock batches of keys.
///
/// Keys in a batch are sorted and deduplicated before any lock is acquired.
/// Every batch therefore acquires its locks in the same global order, so concurrent batches over overlapping keys cannot deadlock against each other regardless of the order the caller supplies.
/// A key repeated within a batch is locked once and released once.
pub trait KeyLockerBatchTraits<K: Ord>: KeyLockerTraits<K> {
    /// Acquires exclusive locks on every key in `keys`, blocking the current thread until all are held.
    fn lock_many(&self, keys: &[K]);

    /// Releases exclusive locks on every key in `keys` previously acquired with [`lock_many`](KeyLockerBatchTraits::lock_many).
    ///
    /// # Panics
    /// Panics if any key is not exclusively locked.
    fn unlock_many(&self, keys: &[K]);

    /// Acquires shared locks on every key in `keys`, blocking the current thread until all are held.
    fn read_lock_many(&self, keys: &[K]);

    /// Releases shared locks on every key in `keys` previously acquired with [`read_lock_many`](KeyLockerBatchTraits::read_lock_many).
    ///
    /// # Panics
    /// Panics if any key is not locked for reading.
    fn read_unlock_many(&self, keys: &[K]);
}

/// The access mode of a lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Exclusive (write) access.
    Exclusive,
    /// Shared (read) access.
    Shared,
}

/// Sort and deduplicate a batch of keys into the global acquisition order.
pub(crate) fn canonical_order<K: Ord>(keys: &[K]) -> Vec<&K> {
    let mut keys: Vec<&K> = keys.iter().collect();
    keys.sort_unstable();
    keys.dedup();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_sorts_and_dedups() {
        let keys = [5, 1, 3, 1, 5, 2];
        assert_eq!(canonical_order(&keys), vec![&1, &2, &3, &5]);
        assert!(canonical_order::<u32>(&[]).is_empty());
    }
}
