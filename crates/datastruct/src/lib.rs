//! Core in-memory data structures shared by every keyspace value type:
//! an incrementally-rehashing hash table, a rank-augmented skiplist, a
//! paged list, and the `Set`/`Zset` composites built on top of them.

pub mod dict;
pub mod quicklist;
pub mod set;
pub mod skiplist;
pub mod zset;

pub use dict::{Dict, DictError};
pub use quicklist::Quicklist;
pub use set::Set;
pub use skiplist::{SkipEntry, Skiplist};
pub use zset::{Zset, ZsetElement};
