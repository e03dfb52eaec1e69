use super::{KeyLockerBatchTraits, KeyLockerTraits};

/// An RAII guard for an exclusive key lock. The lock is released when the guard is dropped.
#[must_use = "if unused the key will immediately unlock"]
pub struct KeyWriteGuard<'a, K, L: KeyLockerTraits<K> + ?Sized> {
    locker: &'a L,
    key: K,
}

/// An RAII guard for a shared key lock. The lock is released when the guard is dropped.
#[must_use = "if unused the key will immediately unlock"]
pub struct KeyReadGuard<'a, K, L: KeyLockerTraits<K> + ?Sized> {
    locker: &'a L,
    key: K,
}

/// An RAII guard for exclusive locks on a batch of keys. The locks are released when the guard is dropped.
#[must_use = "if unused the keys will immediately unlock"]
pub struct KeysWriteGuard<'a, K: Ord, L: KeyLockerBatchTraits<K> + ?Sized> {
    locker: &'a L,
    keys: Vec<K>,
}

/// An RAII guard for shared locks on a batch of keys. The locks are released when the guard is dropped.
#[must_use = "if unused the keys will immediately unlock"]
pub struct KeysReadGuard<'a, K: Ord, L: KeyLockerBatchTraits<K> + ?Sized> {
    locker: &'a L,
    keys: Vec<K>,
}

impl<K, L: KeyLockerTraits<K> + ?Sized> KeyWriteGuard<'_, K, L> {
    /// Returns the locked key.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K, L: KeyLockerTraits<K> + ?Sized> KeyReadGuard<'_, K, L> {
    /// Returns the locked key.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Ord, L: KeyLockerBatchTraits<K> + ?Sized> KeysWriteGuard<'_, K, L> {
    /// Returns the locked keys, as supplied when locking.
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }
}

impl<K: Ord, L: KeyLockerBatchTraits<K> + ?Sized> KeysReadGuard<'_, K, L> {
    /// Returns the locked keys, as supplied when locking.
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }
}

impl<K, L: KeyLockerTraits<K> + ?Sized> Drop for KeyWriteGuard<'_, K, L> {
    fn drop(&mut self) {
        self.locker.unlock(&self.key);
    }
}

impl<K, L: KeyLockerTraits<K> + ?Sized> Drop for KeyReadGuard<'_, K, L> {
    fn drop(&mut self) {
        self.locker.read_unlock(&self.key);
    }
}

impl<K: Ord, L: KeyLockerBatchTraits<K> + ?Sized> Drop for KeysWriteGuard<'_, K, L> {
    fn drop(&mut self) {
        self.locker.unlock_many(&self.keys);
    }
}

impl<K: Ord, L: KeyLockerBatchTraits<K> + ?Sized> Drop for KeysReadGuard<'_, K, L> {
    fn drop(&mut self) {
        self.locker.read_unlock_many(&self.keys);
    }
}

/// Guard-returning extensions for keyed lock managers.
///
/// Implemented for every [`KeyLockerTraits`] implementation, including trait objects.
pub trait KeyLockerExt<K>: KeyLockerTraits<K> {
    /// Acquires an exclusive lock on `key`, blocking the current thread until it is able to do so.
    ///
    /// When the returned guard goes out of scope, the key will be unlocked.
    fn write(&self, key: K) -> KeyWriteGuard<'_, K, Self>;

    /// Acquires a shared lock on `key`, blocking the current thread until it is able to do so.
    ///
    /// When the returned guard goes out of scope, the key will be unlocked.
    fn read(&self, key: K) -> KeyReadGuard<'_, K, Self>;

    /// Attempts to acquire an exclusive lock on `key` without blocking.
    fn try_write(&self, key: K) -> Option<KeyWriteGuard<'_, K, Self>>;

    /// Attempts to acquire a shared lock on `key` without blocking.
    fn try_read(&self, key: K) -> Option<KeyReadGuard<'_, K, Self>>;

    /// Acquires exclusive locks on every key in `keys`, blocking the current thread until all are held.
    ///
    /// When the returned guard goes out of scope, the keys will be unlocked.
    fn write_many(&self, keys: Vec<K>) -> KeysWriteGuard<'_, K, Self>
    where
        K: Ord,
        Self: KeyLockerBatchTraits<K>;

    /// Acquires shared locks on every key in `keys`, blocking the current thread until all are held.
    ///
    /// When the returned guard goes out of scope, the keys will be unlocked.
    fn read_many(&self, keys: Vec<K>) -> KeysReadGuard<'_, K, Self>
    where
        K: Ord,
        Self: KeyLockerBatchTraits<K>;
}

impl<K, L: KeyLockerTraits<K> + ?Sized> KeyLockerExt<K> for L {
    fn write(&self, key: K) -> KeyWriteGuard<'_, K, Self> {
        self.lock(&key);
        KeyWriteGuard { locker: self, key }
    }

    fn read(&self, key: K) -> KeyReadGuard<'_, K, Self> {
        self.read_lock(&key);
        KeyReadGuard { locker: self, key }
    }

    fn try_write(&self, key: K) -> Option<KeyWriteGuard<'_, K, Self>> {
        self.try_lock(&key)
            .then(|| KeyWriteGuard { locker: self, key })
    }

    fn try_read(&self, key: K) -> Option<KeyReadGuard<'_, K, Self>> {
        self.try_read_lock(&key)
            .then(|| KeyReadGuard { locker: self, key })
    }

    fn write_many(&self, keys: Vec<K>) -> KeysWriteGuard<'_, K, Self>
    where
        K: Ord,
        Self: KeyLockerBatchTraits<K>,
    {
        self.lock_many(&keys);
        KeysWriteGuard { locker: self, keys }
    }

    fn read_many(&self, keys: Vec<K>) -> KeysReadGuard<'_, K, Self>
    where
        K: Ord,
        Self: KeyLockerBatchTraits<K>,
    {
        self.read_lock_many(&keys);
        KeysReadGuard { locker: self, keys }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::key_lock::LockRegistry;

    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let locks = LockRegistry::new();
        {
            let guard = locks.write("a".to_string());
            assert_eq!(guard.key(), "a");
            assert!(locks.try_read("a".to_string()).is_none());
        }
        assert!(locks.is_empty());
        {
            let _first = locks.read("a".to_string());
            let second = locks.try_read("a".to_string());
            assert!(second.is_some());
            assert!(locks.try_write("a".to_string()).is_none());
        }
        assert!(locks.is_empty());
    }

    #[test]
    fn guard_many_releases_on_drop() {
        let locks = LockRegistry::new();
        {
            let guard = locks.write_many(vec![2, 1]);
            assert_eq!(guard.keys(), &[2, 1]);
            assert!(locks.try_write(1).is_none());
        }
        assert!(locks.is_empty());
        {
            let _guard = locks.read_many(vec![1, 2]);
            assert!(locks.try_read(2).is_some());
        }
        assert!(locks.is_empty());
    }

    #[test]
    fn guard_trait_object() {
        let locks: Arc<dyn KeyLockerTraits<u32>> = Arc::new(LockRegistry::new());
        {
            let _guard = locks.write(1);
            assert!(!locks.try_lock(&1));
        }
        assert!(locks.try_lock(&1));
        locks.unlock(&1);
    }
}
