pub mod analyzer;
pub mod connection;
pub mod coordinator;
pub mod events;
pub mod grid;
pub mod lexer;
pub mod limits;
pub mod metadata;
pub mod query;
pub mod schema;
pub mod session;
pub mod synth;
pub mod txn;
pub mod types;
