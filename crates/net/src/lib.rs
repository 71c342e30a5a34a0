//! The single-threaded epoll reactor and per-connection client state.
//! Has no knowledge of RESP command semantics; `emberkv-engine` wires
//! this crate's [`EventLoop`] and [`Client`] to the command dispatch
//! table and the keyspace.

pub mod ae;
pub mod client;
pub mod socket;

pub use ae::{EventLoop, FileEventKind, ReadyEvents};
pub use client::{Client, FlushOutcome};
