//! A keyed lock table guarded by a single mutex.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{
    lock_api::{RawRwLock as _, RawRwLockTimed as _},
    Mutex, MutexGuard, RawRwLock,
};

use super::{Access, KeyLockerTraits, LockStatistics};

/// A per-key read/write lock which tracks its current holders.
///
/// The holder marks are set by the acquiring thread once it holds the lock and cleared under the registry guard on release.
/// A release is only passed to the raw lock if a matching mark could be cleared.
pub(crate) struct KeyLock {
    raw: RawRwLock,
    exclusive: AtomicBool,
    shared: AtomicUsize,
}

impl KeyLock {
    fn new() -> Self {
        Self {
            raw: RawRwLock::INIT,
            exclusive: AtomicBool::new(false),
            shared: AtomicUsize::new(0),
        }
    }

    fn mark_held(&self, access: Access) {
        match access {
            Access::Exclusive => self.exclusive.store(true, Ordering::Release),
            Access::Shared => {
                self.shared.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    /// Block until the lock is acquired with `access`.
    pub(crate) fn acquire(&self, access: Access) {
        match access {
            Access::Exclusive => self.raw.lock_exclusive(),
            Access::Shared => self.raw.lock_shared(),
        }
        self.mark_held(access);
    }

    /// Attempt to acquire the lock with `access`, waiting for at most `timeout` if given.
    fn try_acquire(&self, access: Access, timeout: Option<Duration>) -> bool {
        let acquired = match (access, timeout) {
            (Access::Exclusive, None) => self.raw.try_lock_exclusive(),
            (Access::Exclusive, Some(timeout)) => self.raw.try_lock_exclusive_for(timeout),
            (Access::Shared, None) => self.raw.try_lock_shared(),
            (Access::Shared, Some(timeout)) => self.raw.try_lock_shared_for(timeout),
        };
        if acquired {
            self.mark_held(access);
        }
        acquired
    }

    fn is_held(&self, access: Access) -> bool {
        match access {
            Access::Exclusive => self.exclusive.load(Ordering::Acquire),
            Access::Shared => self.shared.load(Ordering::Acquire) > 0,
        }
    }

    /// Release a hold of kind `access`. Returns false if the lock is not held that way.
    fn release(&self, access: Access) -> bool {
        match access {
            Access::Exclusive => {
                if !self.exclusive.swap(false, Ordering::AcqRel) {
                    return false;
                }
                // SAFETY: the exclusive mark is only set by the thread holding the exclusive lock.
                unsafe { self.raw.unlock_exclusive() };
            }
            Access::Shared => {
                if self
                    .shared
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                    .is_err()
                {
                    return false;
                }
                // SAFETY: each shared mark corresponds to a shared hold which has not been released.
                unsafe { self.raw.unlock_shared() };
            }
        }
        true
    }
}

/// The lock state for a single key.
///
/// `readers` and `writers` count threads which hold *or are waiting to acquire* the lock.
/// The entry stays in the table while either count is non-zero.
struct LockEntry {
    lock: Arc<KeyLock>,
    readers: usize,
    writers: usize,
}

impl LockEntry {
    fn new() -> Self {
        Self {
            lock: Arc::new(KeyLock::new()),
            readers: 0,
            writers: 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.readers == 0 && self.writers == 0
    }

    /// Record intent to acquire the lock and return a handle to block on outside the registry guard.
    fn register(&mut self, access: Access) -> Arc<KeyLock> {
        match access {
            Access::Exclusive => self.writers += 1,
            Access::Shared => self.readers += 1,
        }
        Arc::clone(&self.lock)
    }

    /// Withdraw a registration whose acquisition never succeeded.
    fn deregister(&mut self, access: Access) {
        match access {
            Access::Exclusive => self.writers -= 1,
            Access::Shared => self.readers -= 1,
        }
    }

    fn is_held(&self, access: Access) -> bool {
        self.lock.is_held(access)
    }

    /// Release a hold of kind `access`. Returns false if the key is not held that way.
    fn release(&mut self, access: Access) -> bool {
        if !self.lock.release(access) {
            return false;
        }
        self.deregister(access);
        true
    }
}

/// The table and statistics protected by the registry guard.
pub(crate) struct RegistryState<K> {
    table: HashMap<K, LockEntry>,
    stats: LockStatistics,
}

impl<K: Eq + Hash> RegistryState<K> {
    fn remove_if_idle(&mut self, key: &K) {
        if self.table.get(key).is_some_and(LockEntry::is_idle) {
            self.table.remove(key);
            self.stats.entries_reclaimed += 1;
            log::trace!("reclaimed lock entry, {} live", self.table.len());
        }
    }

    /// Check that every key in `keys` is held with `access`.
    ///
    /// # Panics
    /// Panics if any key is not held with `access`.
    #[track_caller]
    pub(crate) fn check_held(&self, keys: &[&K], access: Access, operation: &str) {
        for &key in keys {
            match self.table.get(key) {
                Some(entry) if entry.is_held(access) => {}
                Some(_) => panic!("{operation} of a key that is not locked"),
                None => panic!("{operation} of a key with no lock entry"),
            }
        }
    }

    /// Release every key in `keys`, which must have passed [`check_held`](RegistryState::check_held) under the same hold of the guard.
    pub(crate) fn release_held(&mut self, keys: &[&K], access: Access) {
        for &key in keys {
            if let Some(entry) = self.table.get_mut(key) {
                let released = entry.release(access);
                debug_assert!(released);
            }
            self.remove_if_idle(key);
        }
    }
}

/// A keyed read/write lock table.
///
/// Each key maps to a lock entry holding a [`parking_lot::RawRwLock`] and counts of the readers and writers which hold or are waiting on it.
/// All bookkeeping happens under a single [`parking_lot::Mutex`], the registry guard, which is only held for lookups and counter updates.
/// Threads block on a key's read/write lock *after* releasing the registry guard, so waiting on one key never stalls bookkeeping for another.
///
/// An entry is created the first time its key is requested and removed when its last holder or waiter releases it.
/// Because a thread registers itself on the entry before it releases the registry guard, an entry can never be removed while a thread is about to block on it.
///
/// ### Fairness
/// The per-key locks are task-fair: once a writer is waiting, new readers queue behind it.
/// A thread must not recursively acquire a shared lock on a key it already holds, since a queued writer would deadlock it.
pub struct LockRegistry<K> {
    state: Mutex<RegistryState<K>>,
}

impl<K> core::fmt::Debug for LockRegistry<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LockRegistry")
            .field("len", &state.table.len())
            .field("stats", &state.stats)
            .finish()
    }
}

impl<K: Eq + Hash> Default for LockRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> LockRegistry<K> {
    /// Create a new, empty lock registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a new, empty lock registry with space for at least `capacity` simultaneously locked keys before reallocating.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                table: HashMap::with_capacity(capacity),
                stats: LockStatistics::default(),
            }),
        }
    }

    /// Returns the number of keys that currently have a lock entry.
    ///
    /// A key has an entry while any thread holds or is waiting on its lock.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().table.len()
    }

    /// Returns true if no key has a lock entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().table.is_empty()
    }

    /// Returns true if `key` currently has a lock entry.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.state.lock().table.contains_key(key)
    }

    /// Returns a snapshot of the registry statistics.
    #[must_use]
    pub fn stats(&self) -> LockStatistics {
        self.state.lock().stats
    }

    /// Acquire the registry guard.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, RegistryState<K>> {
        self.state.lock()
    }
}

impl<K: Eq + Hash + Clone> LockRegistry<K> {
    /// Look up or create the entry for `key` and register intent to acquire it.
    pub(crate) fn register(&self, key: &K, access: Access) -> Arc<KeyLock> {
        let mut state = self.state.lock();
        let lock = match state.table.get_mut(key) {
            Some(entry) => entry.register(access),
            None => {
                let mut entry = LockEntry::new();
                let lock = entry.register(access);
                state.table.insert(key.clone(), entry);
                state.stats.entries_created += 1;
                log::trace!("created lock entry, {} live", state.table.len());
                lock
            }
        };
        state.stats.record_request(access);
        lock
    }

    /// Register intent to acquire every key in `keys` under a single hold of the registry guard.
    ///
    /// The returned locks are in the same order as `keys`.
    pub(crate) fn register_many(&self, keys: &[&K], access: Access) -> Vec<Arc<KeyLock>> {
        let mut state = self.state.lock();
        let mut locks = Vec::with_capacity(keys.len());
        for &key in keys {
            let lock = match state.table.get_mut(key) {
                Some(entry) => entry.register(access),
                None => {
                    let mut entry = LockEntry::new();
                    let lock = entry.register(access);
                    state.table.insert(key.clone(), entry);
                    state.stats.entries_created += 1;
                    lock
                }
            };
            state.stats.record_request(access);
            locks.push(lock);
        }
        log::trace!(
            "registered {} keys, {} live",
            keys.len(),
            state.table.len()
        );
        locks
    }

    /// Withdraw a registration made by [`register`](LockRegistry::register) whose acquisition failed.
    fn deregister(&self, key: &K, access: Access) {
        let mut state = self.state.lock();
        if let Some(entry) = state.table.get_mut(key) {
            entry.deregister(access);
            state.remove_if_idle(key);
        }
    }

    /// Release a hold on `key`, removing its entry if nothing else references it.
    ///
    /// # Panics
    /// Panics if `key` is not held with `access`.
    #[track_caller]
    pub(crate) fn release(&self, key: &K, access: Access, operation: &str) {
        let mut state = self.state.lock();
        match state.table.get_mut(key) {
            Some(entry) => assert!(
                entry.release(access),
                "{operation} of a key that is not locked"
            ),
            None => panic!("{operation} of a key with no lock entry"),
        }
        state.remove_if_idle(key);
    }

    /// Release a hold on every key in `keys` under a single hold of the registry guard.
    ///
    /// Every key is checked before any is released, so a misuse panic leaves all holds intact.
    ///
    /// # Panics
    /// Panics if any key is not held with `access`.
    #[track_caller]
    pub(crate) fn release_many(&self, keys: &[&K], access: Access, operation: &str) {
        let mut state = self.state.lock();
        state.check_held(keys, access, operation);
        state.release_held(keys, access);
    }

    fn try_acquire(&self, key: &K, access: Access, timeout: Option<Duration>) -> bool {
        let lock = self.register(key, access);
        if lock.try_acquire(access, timeout) {
            true
        } else {
            self.deregister(key, access);
            false
        }
    }
}

impl<K: Eq + Hash + Clone + Send> KeyLockerTraits<K> for LockRegistry<K> {
    fn lock(&self, key: &K) {
        self.register(key, Access::Exclusive).acquire(Access::Exclusive);
    }

    fn unlock(&self, key: &K) {
        self.release(key, Access::Exclusive, "unlock");
    }

    fn read_lock(&self, key: &K) {
        self.register(key, Access::Shared).acquire(Access::Shared);
    }

    fn read_unlock(&self, key: &K) {
        self.release(key, Access::Shared, "read_unlock");
    }

    fn try_lock(&self, key: &K) -> bool {
        self.try_acquire(key, Access::Exclusive, None)
    }

    fn try_read_lock(&self, key: &K) -> bool {
        self.try_acquire(key, Access::Shared, None)
    }

    fn try_lock_for(&self, key: &K, timeout: Duration) -> bool {
        self.try_acquire(key, Access::Exclusive, Some(timeout))
    }

    fn try_read_lock_for(&self, key: &K, timeout: Duration) -> bool {
        self.try_acquire(key, Access::Shared, Some(timeout))
    }
}
