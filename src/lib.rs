//! A content-addressed, deduplicating file storage client for a wide-column
//! database backend.
//!
//! A file is split into chunks by an external content-defined chunking
//! collaborator ([`chunking`]), each chunk is hashed and stored at most once
//! in the [`block_store`] keyed by that hash, and the ordered sequence of
//! `(offset, hash, size)` triples describing how to reassemble the original
//! file is kept in the [`manifest_store`]. [`store_pipeline`] and
//! [`restore_pipeline`] drive the write and read paths; both talk to the
//! backend only through the [`backend::Gateway`] trait, so the database
//! driver itself stays a pluggable, swappable collaborator.

pub mod backend;
pub mod block;
pub mod block_store;
pub mod chunking;
pub mod config;
pub mod error;
pub mod manifest_store;
pub mod restore_pipeline;
pub mod stats;
pub mod store_pipeline;
pub mod tools;

pub use block::Block;
pub use config::Config;
pub use error::CasstorError;
