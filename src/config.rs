/// Options for the tiered engine: after compaction each level contains at
/// most one SSTable of arbitrary size. Simple, predictable structure with
/// low write amplification.
#[derive(Clone, Debug)]
pub struct LsmOptions {
    /// Page size of the read buffer pool.
    pub frame_size: u64,
    /// Capacity of the read buffer pool in bytes.
    pub buffer_pool_size: u64,
    /// Flush the active memtable once its byte estimate exceeds this.
    pub memtable_bytes: u64,
    /// Maximum height of the memtable skip list.
    pub max_level_skip_list: usize,
    /// Compaction trigger: a level is merged down as soon as it reaches this
    /// many files, so each level holds at most `compaction_trigger_files - 1`.
    pub compaction_trigger_files: u32,
}

impl Default for LsmOptions {
    fn default() -> LsmOptions {
        LsmOptions {
            frame_size: 4096,
            buffer_pool_size: 64 * 1024 * 1024,
            memtable_bytes: 64 * 1024 * 1024,
            max_level_skip_list: 20,
            compaction_trigger_files: 2,
        }
    }
}

/// Options for the granular engine: each level stores many size-bounded
/// SSTables with exponentially growing per-level capacity. Better read
/// granularity at the cost of write amplification.
#[derive(Clone, Debug)]
pub struct GranularLsmOptions {
    pub frame_size: u64,
    pub buffer_pool_size: u64,
    pub memtable_bytes: u64,
    /// Target post-compaction table size. Actual files may exceed this by up
    /// to the byte estimate of one key's versions.
    pub max_sstable_size: u64,
    pub max_level_skip_list: usize,
    /// Maximum number of tables on level 0 before overflow to level 1.
    /// Level n capacity = `l0_capacity * level_size_multiplier ^ n` tables.
    pub l0_capacity: u32,
    pub level_size_multiplier: u32,
    /// Bloom filter byte size per table; 0 disables filters entirely.
    pub bloom_filter_size: u64,
    pub bloom_filter_hash_count: u32,
}

impl Default for GranularLsmOptions {
    fn default() -> GranularLsmOptions {
        GranularLsmOptions {
            frame_size: 4096,
            buffer_pool_size: 64 * 1024 * 1024,
            memtable_bytes: 64 * 1024 * 1024,
            max_sstable_size: 128 * 1024 * 1024,
            max_level_skip_list: 20,
            l0_capacity: 2,
            level_size_multiplier: 2,
            bloom_filter_size: 4 * 1024 * 1024,
            bloom_filter_hash_count: 23,
        }
    }
}
