use std::{
    sync::{
        atomic::{AtomicBool, AtomicIsize, Ordering},
        Barrier,
    },
    thread,
    time::Duration,
};

use keylocks::{
    key_lock::{KeyLockerBatchTraits, KeyLockerTraits, LockRegistry},
    shard_group::{HashChoice, ShardGroup},
};

const ITERATIONS: usize = 20_000;

/// Acquiring overlapping keys in opposite orders, one key at a time, deadlocks.
///
/// Each thread holds its first key and waits for the other's.
/// Timed acquisition detects the cycle instead of hanging the test.
#[test]
#[cfg_attr(miri, ignore)]
fn opposite_order_single_key_locks_deadlock() {
    let locks = LockRegistry::<&str>::new();
    let barrier = Barrier::new(2);
    let deadlocked = [AtomicBool::new(false), AtomicBool::new(false)];
    thread::scope(|s| {
        for (index, (first, second)) in [("a", "b"), ("b", "a")].into_iter().enumerate() {
            let (locks, barrier, deadlocked) = (&locks, &barrier, &deadlocked);
            s.spawn(move || {
                locks.lock(&first);
                barrier.wait();
                let acquired = locks.try_lock_for(&second, Duration::from_millis(100));
                deadlocked[index].store(!acquired, Ordering::SeqCst);
                barrier.wait();
                if acquired {
                    locks.unlock(&second);
                }
                locks.unlock(&first);
            });
        }
    });
    assert!(deadlocked.iter().all(|d| d.load(Ordering::SeqCst)));
    assert!(locks.is_empty());
}

/// Occupancy of `"a"` and `"b"`: `-1` while a writer holds the key, otherwise the number of readers.
struct Occupancy([AtomicIsize; 2]);

impl Occupancy {
    fn slot(&self, key: &str) -> &AtomicIsize {
        &self.0[usize::from(key == "b")]
    }

    fn enter_write(&self, keys: &[&str]) {
        for key in keys {
            let previous = self.slot(key).swap(-1, Ordering::SeqCst);
            assert_eq!(previous, 0, "writer entered key {key} while occupied");
        }
    }

    fn exit_write(&self, keys: &[&str]) {
        for key in keys {
            let previous = self.slot(key).swap(0, Ordering::SeqCst);
            assert_eq!(previous, -1, "key {key} changed while written");
        }
    }

    fn enter_read(&self, keys: &[&str]) {
        for key in keys {
            let previous = self.slot(key).fetch_add(1, Ordering::SeqCst);
            assert!(previous >= 0, "reader entered key {key} while written");
        }
    }

    fn exit_read(&self, keys: &[&str]) {
        for key in keys {
            let previous = self.slot(key).fetch_sub(1, Ordering::SeqCst);
            assert!(previous > 0, "key {key} changed while read");
        }
    }
}

fn opposite_order_batches<L: KeyLockerBatchTraits<&'static str>>(locks: &L) {
    let occupancy = Occupancy([AtomicIsize::new(0), AtomicIsize::new(0)]);
    thread::scope(|s| {
        for keys in [["a", "b"], ["b", "a"]] {
            let occupancy = &occupancy;
            s.spawn(move || {
                for _ in 0..ITERATIONS {
                    locks.lock_many(&keys);
                    occupancy.enter_write(&keys);
                    occupancy.exit_write(&keys);
                    locks.unlock_many(&keys);
                }
            });
        }
        s.spawn(|| {
            for _ in 0..ITERATIONS {
                locks.read_lock_many(&["b", "a"]);
                occupancy.enter_read(&["b", "a"]);
                occupancy.exit_read(&["a", "b"]);
                locks.read_unlock_many(&["a", "b"]);
            }
        });
    });
    assert!(occupancy.0.iter().all(|slot| slot.load(Ordering::SeqCst) == 0));
}

/// Batches are acquired in sorted order, so the same opposite-order pattern completes.
#[test]
#[cfg_attr(miri, ignore)]
fn opposite_order_batches_complete_registry() {
    let locks = LockRegistry::<&str>::new();
    opposite_order_batches(&locks);
    assert!(locks.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn opposite_order_batches_complete_shard_group() {
    for hash_choice in [HashChoice::Simple, HashChoice::Strong] {
        let locks = ShardGroup::<&str>::new(8, hash_choice).unwrap();
        opposite_order_batches(&locks);
        assert!(locks.is_empty());
    }
}
