//! Append-only file persistence: the feed/flush/fsync path used on
//! every write, replay-on-boot, and background rewrite.

pub mod aof;
pub mod rewrite;

pub use aof::{encode_command, replay_commands, Aof, FsyncPolicy};
pub use rewrite::{spawn_background_rewrite, RewriteHandle};
