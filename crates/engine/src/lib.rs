//! Command dispatch table and [`Server`]: binds RESP parsing, the
//! epoll event loop, the keyspace, and AOF persistence together into
//! a running instance.

pub mod commands;
pub mod dispatch;
pub mod server;

pub use dispatch::{dispatch, lookup_command, Command, CommandContext, Handler, COMMAND_TABLE};
pub use server::{install_signal_handlers, HotReloadConfig, Server, ServerConfig};
