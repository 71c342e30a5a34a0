//! Shared error types and constants used by every emberkv crate.
//!
//! This crate sits at the bottom of the dependency graph: `datastruct`,
//! `storage`, `proto`, `net`, `durability`, and `engine` all depend on
//! it for [`Error`]/[`Result`] and the tunables in [`limits`].

pub mod error;
pub mod limits;

pub use error::{Error, Result};
