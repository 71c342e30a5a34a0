//! Size and capacity constants shared across crates.
//!
//! Mirrors the way the storage layer centralizes tunables in one module
//! rather than scattering magic numbers through call sites.

/// Default number of logical keyspaces (`SELECT 0..15`).
pub const DEFAULT_DATABASES: usize = 16;

/// Hard cap on a single framing line (inline command or bulk header)
/// before a CRLF is found. Exceeding this is a fatal protocol error.
pub const MAX_INLINE_SIZE: usize = 64 * 1024;

/// Chunk size the client read buffer grows by on demand.
pub const READ_BUF_CHUNK: usize = 4 * 1024;

/// Number of elements (or key/value pairs for hash/zset) an AOF rewrite
/// packs into a single reconstructive command.
pub const AOF_REWRITE_ITEMS_PER_COMMAND: usize = 64;

/// Prefix for the AOF background rewrite's temporary file.
pub const AOF_REWRITE_TEMP_PREFIX: &str = "temp-rewriteaof-";

/// Number of random `expire` dict entries sampled per db, per cron tick.
pub const EXPIRE_CYCLE_SAMPLE_SIZE: usize = 100;

/// Maximum bytes written to a single client per writable-fd callback,
/// so one fast consumer can't starve the others.
pub const MAX_WRITE_PER_EVENT: usize = 64 * 1024;
