//! Keyed read/write locks for Rust.
//!
//! `keylocks` hands out independent read/write locks scoped to arbitrary key values.
//! Lock state for a key is created lazily the first time the key is requested and is reclaimed as soon as no thread holds or waits on it, so memory use is bounded by the number of keys *in use* rather than the size of the key space.
//!
//! ## Getting Started
//! - [`LockRegistry`](key_lock::LockRegistry) is a single keyed lock table guarded by one short-held mutex.
//! - [`ShardGroup`](shard_group::ShardGroup) spreads keys over several registries to reduce contention on that mutex.
//! - Both implement [`KeyLockerTraits`](key_lock::KeyLockerTraits) (single keys) and [`KeyLockerBatchTraits`](key_lock::KeyLockerBatchTraits) (ordered batches of keys).
//! - [`KeyLockerExt`](key_lock::KeyLockerExt) adds RAII guards that release on drop.
//!
//! ## Example
//! ```rust
//! use keylocks::key_lock::{KeyLockerExt, KeyLockerTraits, LockRegistry};
//!
//! let locks = LockRegistry::<String>::new();
//! {
//!     let _guard = locks.write("user/42".to_string());
//!     assert!(locks.contains_key(&"user/42".to_string()));
//! }
//! assert!(locks.is_empty());
//!
//! locks.read_lock(&"user/7".to_string());
//! locks.read_unlock(&"user/7".to_string());
//! assert!(locks.is_empty());
//! ```
//!
//! ## Lock Discipline
//! Every `lock` must be balanced by exactly one `unlock` of the same key (and likewise for `read_lock`/`read_unlock`).
//! Releasing a key that is not held is a programming error and panics.
//!
//! Batch operations sort and deduplicate their keys before acquiring them, so concurrent batches over overlapping key sets cannot deadlock against each other.
//!
//! ## Licence
//! `keylocks` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted for inclusion in the work by you, as defined in the Apache-2.0 license, shall be dual licensed as above, without any additional terms or conditions.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod config;
pub mod key_lock;
pub mod shard_group;
