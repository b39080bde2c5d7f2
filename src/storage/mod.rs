//! On-disk byte storage: the append-once table files and the frame cache
//! that all SSTable reads flow through.

pub mod buffer_pool;
pub mod file;
