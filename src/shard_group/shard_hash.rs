use std::hash::{BuildHasher, BuildHasherDefault, Hash, Hasher};

/// A positional polynomial hasher.
///
/// Each integer written is folded into the state as `state * 31 + value`, so a single integer key hashes to itself.
/// Byte slices are folded one byte at a time.
/// It is very cheap but does no mixing: keys which are not already well spread (e.g. multiples of the shard count) all land in the same shard.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleHasher(u64);

impl SimpleHasher {
    fn fold(&mut self, value: u64) {
        self.0 = self.0.wrapping_mul(31).wrapping_add(value);
    }
}

impl Hasher for SimpleHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.fold(u64::from(byte));
        }
    }

    fn write_u8(&mut self, i: u8) {
        self.fold(u64::from(i));
    }

    fn write_u16(&mut self, i: u16) {
        self.fold(u64::from(i));
    }

    fn write_u32(&mut self, i: u32) {
        self.fold(u64::from(i));
    }

    fn write_u64(&mut self, i: u64) {
        self.fold(i);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_u128(&mut self, i: u128) {
        self.fold((i >> 64) as u64);
        self.fold(i as u64);
    }

    fn write_usize(&mut self, i: usize) {
        self.fold(i as u64);
    }
}

/// The hasher used to map keys to shards.
#[derive(Debug, Clone)]
pub(crate) enum ShardHash {
    Simple(BuildHasherDefault<SimpleHasher>),
    Strong(ahash::RandomState),
}

impl ShardHash {
    pub(crate) fn hash_one<K: Hash + ?Sized>(&self, key: &K) -> u64 {
        match self {
            Self::Simple(build) => BuildHasher::hash_one(build, key),
            Self::Strong(build) => BuildHasher::hash_one(build, key),
        }
    }
}
