//! Memory table

mod skip_map_mem_table;

pub use skip_map_mem_table::{MemTable, MemTableScan};
