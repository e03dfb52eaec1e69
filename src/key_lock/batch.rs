use std::hash::Hash;

use super::{canonical_order, Access, KeyLockerBatchTraits, LockRegistry};

impl<K: Eq + Hash + Clone + Send + Ord> KeyLockerBatchTraits<K> for LockRegistry<K> {
    fn lock_many(&self, keys: &[K]) {
        let keys = canonical_order(keys);
        for lock in self.register_many(&keys, Access::Exclusive) {
            lock.acquire(Access::Exclusive);
        }
    }

    fn unlock_many(&self, keys: &[K]) {
        self.release_many(&canonical_order(keys), Access::Exclusive, "unlock_many");
    }

    fn read_lock_many(&self, keys: &[K]) {
        let keys = canonical_order(keys);
        for lock in self.register_many(&keys, Access::Shared) {
            lock.acquire(Access::Shared);
        }
    }

    fn read_unlock_many(&self, keys: &[K]) {
        self.release_many(&canonical_order(keys), Access::Shared, "read_unlock_many");
    }
}
