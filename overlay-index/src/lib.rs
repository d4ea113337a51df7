//! # overlay-index
//!
//! An in-memory B+ tree keyed by normalized string, used by each overlay
//! node to serve the `insert`/`lookup`/`delete`/`update`/`scan` operations
//! for the records it owns.
//!
//! Durability, compaction and on-disk representation are out of scope —
//! every arena lives for the duration of the process that built it.

pub mod node;
pub mod tree;

pub use tree::LocalIndex;
