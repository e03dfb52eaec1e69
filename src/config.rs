//! Keylocks global configuration options.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::shard_group::HashChoice;

/// Global configuration options for the keylocks crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// The global configuration only supplies defaults.
/// A [`ShardGroup`](crate::shard_group::ShardGroup) reads it once at construction and is unaffected by later changes.
///
/// # Shard Group Configuration Options
/// ## Default Shard Count
/// > default: [`std::thread::available_parallelism`]`() * 4`, rounded up to a power of two
///
/// The number of shards used by [`ShardGroup::with_default_config`](crate::shard_group::ShardGroup::with_default_config).
/// A power of two lets the shard index be derived with a mask rather than a modulus.
///
/// ## Default Hash Choice
/// > default: [`HashChoice::Strong`]
///
/// The key to shard hash used by [`ShardGroup::with_default_config`](crate::shard_group::ShardGroup::with_default_config).
/// [`HashChoice::Simple`] is cheaper but only distributes well if keys are already well spread (e.g. dense integers).
#[derive(Debug)]
pub struct Config {
    default_shard_count: usize,
    default_hash_choice: HashChoice,
}

impl Default for Config {
    fn default() -> Self {
        let shards_per_thread = 4;
        Config {
            default_shard_count: (std::thread::available_parallelism().map_or(1, usize::from)
                * shards_per_thread)
                .next_power_of_two(),
            default_hash_choice: HashChoice::Strong,
        }
    }
}

impl Config {
    /// Get the [default shard count](#default-shard-count) configuration.
    #[must_use]
    pub fn default_shard_count(&self) -> usize {
        self.default_shard_count
    }

    /// Set the [default shard count](#default-shard-count) configuration.
    ///
    /// A shard count of zero is stored as given and rejected when a shard group is created from it.
    pub fn set_default_shard_count(&mut self, shard_count: usize) {
        self.default_shard_count = shard_count;
    }

    /// Get the [default hash choice](#default-hash-choice) configuration.
    #[must_use]
    pub fn default_hash_choice(&self) -> HashChoice {
        self.default_hash_choice
    }

    /// Set the [default hash choice](#default-hash-choice) configuration.
    pub fn set_default_hash_choice(&mut self, hash_choice: HashChoice) {
        self.default_hash_choice = hash_choice;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global keylocks configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global keylocks configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}
