//! Editable query result engine for SQLite.
//!
//! A session owns one database connection on a dedicated worker thread and
//! serializes everything through it: queries, metadata lookups, transaction
//! control and commit passes. Results come back as a grid that knows whether
//! it can be edited in place; staged cell edits are synthesized into keyed
//! UPDATE statements and applied atomically on commit.
//!
//! The `adapters::bridge` module wraps a session in an NDJSON stdio protocol
//! for embedding in editor frontends.

pub mod adapters;
pub mod cli;
pub mod core;
pub mod error;
pub mod logging;
