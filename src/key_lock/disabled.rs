//! Disabled keyed locks.

use std::time::Duration;

use super::{KeyLockerBatchTraits, KeyLockerTraits};

/// Disabled keyed locks.
///
/// Every acquisition succeeds immediately and every release is a no-op.
/// This can be substituted for a real lock manager when callers are known to be single-threaded or to never touch the same key concurrently.
/// **No mutual exclusion is provided**, and misuse such as releasing an unlocked key is not detected.
#[derive(Debug, Default)]
pub struct DisabledKeyLocks;

impl<K> KeyLockerTraits<K> for DisabledKeyLocks {
    fn lock(&self, _key: &K) {}

    fn unlock(&self, _key: &K) {}

    fn read_lock(&self, _key: &K) {}

    fn read_unlock(&self, _key: &K) {}

    fn try_lock(&self, _key: &K) -> bool {
        true
    }

    fn try_read_lock(&self, _key: &K) -> bool {
        true
    }

    fn try_lock_for(&self, _key: &K, _timeout: Duration) -> bool {
        true
    }

    fn try_read_lock_for(&self, _key: &K, _timeout: Duration) -> bool {
        true
    }
}

impl<K: Ord> KeyLockerBatchTraits<K> for DisabledKeyLocks {
    fn lock_many(&self, _keys: &[K]) {}

    fn unlock_many(&self, _keys: &[K]) {}

    fn read_lock_many(&self, _keys: &[K]) {}

    fn read_unlock_many(&self, _keys: &[K]) {}
}
