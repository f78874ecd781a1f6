//! Result cache for expensive per-user lookups.
//!
//! Values are opaque serialized bytes stored under a [`CacheKey`] with a
//! fixed time-to-live. Entries are expired lazily: an entry found at or past
//! its expiry on read is removed and reported as a miss. There is no
//! background sweeper.
//!
//! Every key is scoped to the user that owns the data, so a write for a user
//! can drop all of that user's cached reads with one
//! [`CacheBackend::invalidate_owner`] call.

pub mod key;
pub mod memory;
pub mod traits;

pub use key::{CacheKey, CacheNamespace};
pub use memory::InMemoryCacheBackend;
pub use traits::{CacheBackend, CacheStats};
