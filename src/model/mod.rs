//! Transient data types for one ingest run.

pub mod attachment;
pub mod summary;
