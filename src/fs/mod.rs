//! Filesystem utilities for warden.
//!
//! Every mutable record in the orchestration root (run records, budget state,
//! index partitions) is written through `atomic_write`, so a concurrent
//! reader sees either the old complete record or the new complete record.

pub mod atomic;

pub use atomic::atomic_write;
pub use atomic::atomic_write_file;
