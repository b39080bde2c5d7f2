use crate::collections::merge::MergingIterator;
use crate::config::GranularLsmOptions;
use crate::db::db_iter::{EntrySource, LevelScan, LsmScan};
use crate::db::key_types::{InternalKey, Lookup, UserKey, Value};
use crate::db::Lsm;
use crate::filter::BloomFilter;
use crate::memory::MemTable;
use crate::sstable::{LevelsManager, SSTableBuilder, SSTableMetadata, SSTableReader};
use crate::storage::buffer_pool::ReadBufferPool;
use crate::storage::file::{BufferedFile, DiskFile, TableFile};
use crate::Result;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

type Entry = (InternalKey, Value);
type OwnedEntrySource = Box<dyn Iterator<Item = Entry>>;

/// Leveled LSM engine with size-bounded tables. Level n holds up to
/// `l0_capacity * multiplier^n - 1` non-overlapping tables sorted by key
/// range; a flush merge-sorts into the affected tables of each level in turn,
/// and output that would fill a level is redirected one level down. At most
/// one table per level is consulted on a point read.
pub struct GranularLsm {
    options: GranularLsmOptions,
    dir: PathBuf,
    levels: LevelsManager,
    mem_table: MemTable,
    buffer_pool: Rc<ReadBufferPool>,
    sequence_number: u64,
    next_table_id: u32,
    next_filter_id: u64,
}

impl GranularLsm {
    /// Create the store under `parent_dir/granular_lsm`. The directory is
    /// created here and removed when the store is dropped.
    pub fn open(parent_dir: impl AsRef<Path>, options: GranularLsmOptions) -> Result<GranularLsm> {
        let dir = parent_dir.as_ref().join("granular_lsm");
        fs::create_dir_all(&dir)?;
        let buffer_pool = Rc::new(ReadBufferPool::new(
            &dir,
            options.buffer_pool_size,
            options.frame_size,
        ));
        let mem_table = MemTable::new(options.max_level_skip_list);
        Ok(GranularLsm {
            options,
            dir,
            levels: LevelsManager::new(),
            mem_table,
            buffer_pool,
            sequence_number: 0,
            next_table_id: 0,
            next_filter_id: 0,
        })
    }

    /// Structure of the on-disk levels, for inspection.
    pub fn levels(&self) -> &LevelsManager {
        &self.levels
    }

    fn new_table_file(&mut self) -> BufferedFile {
        let table_id = self.next_table_id;
        self.next_table_id += 1;
        BufferedFile::new(&self.dir, table_id, self.buffer_pool.clone())
    }

    fn check_mem_table(&mut self) -> Result<()> {
        if self.mem_table.approximate_memory_usage() <= self.options.memtable_bytes {
            return Ok(());
        }
        info!(
            "flushing memtable of ~{} bytes",
            self.mem_table.approximate_memory_usage()
        );
        let sealed = std::mem::replace(
            &mut self.mem_table,
            MemTable::new(self.options.max_level_skip_list),
        );

        let mut sources: Vec<OwnedEntrySource> = vec![Box::new(sealed.into_scan())];
        let mut level = 0;
        let mut capacity = self.options.l0_capacity as usize;
        while !sources.is_empty() {
            let mut merged = MergingIterator::new(std::mem::take(&mut sources));
            let mut redirected: Vec<Entry> = Vec::new();
            if self.levels.num_tables(level) > 0 {
                self.compact_level(level, capacity, &mut merged, &mut redirected)?;
            } else {
                let partitions = partition_by_size(&mut merged, self.options.max_sstable_size);
                let mut ind = 0;
                self.place_partitions(level, capacity, &mut ind, partitions, &mut redirected)?;
            }
            if !redirected.is_empty() {
                debug!(
                    "level {} full, redirecting {} entries to level {}",
                    level,
                    redirected.len(),
                    level + 1
                );
                sources.push(Box::new(redirected.into_iter()));
            }
            level += 1;
            capacity = capacity.saturating_mul(self.options.level_size_multiplier as usize);
        }
        Ok(())
    }

    /// Merge the incoming stream into an occupied level, table by table in
    /// key order. A table that receives no entries is left untouched;
    /// otherwise it is erased and rewritten together with the entries that
    /// fall at or below its upper bound.
    fn compact_level(
        &mut self,
        level: usize,
        capacity: usize,
        merged: &mut MergingIterator<Entry, OwnedEntrySource>,
        redirected: &mut Vec<Entry>,
    ) -> Result<()> {
        let mut ind = 0;
        let mut pending = merged.next();
        while ind < self.levels.num_tables(level) {
            let upper_bound: Option<UserKey> = if ind + 1 < self.levels.num_tables(level) {
                let meta = self
                    .levels
                    .table_metadata(level, ind)
                    .expect("granular tables carry metadata");
                Some(meta.max_key)
            } else {
                None
            };

            let mut pulled: Vec<Entry> = Vec::new();
            loop {
                let within = match &pending {
                    Some((key, _)) => upper_bound
                        .as_ref()
                        .map_or(true, |bound| key.user_key <= *bound),
                    None => false,
                };
                if !within {
                    break;
                }
                pulled.push(pending.take().unwrap());
                pending = merged.next();
            }

            if pulled.is_empty() {
                if pending.is_none() {
                    break;
                }
                ind += 1;
                continue;
            }

            debug!(
                "rewriting table {} of level {} with {} incoming entries",
                ind,
                level,
                pulled.len()
            );
            let resident = SSTableReader::open(self.levels.table_file(level, ind))?.scan();
            self.levels.erase_table(level, ind);
            let rewrite: Vec<OwnedEntrySource> =
                vec![Box::new(pulled.into_iter()), Box::new(resident)];
            let mut rewrite = MergingIterator::new(rewrite);
            let partitions = partition_by_size(&mut rewrite, self.options.max_sstable_size);
            self.place_partitions(level, capacity, &mut ind, partitions, redirected)?;
        }
        Ok(())
    }

    /// Write each partition as a new table at `ind`, advancing it. Once the
    /// level is one table short of `capacity`, the remaining partitions are
    /// redirected to the next level instead of being written here; redirected
    /// output gets no bloom filter since it is about to be rewritten anyway.
    fn place_partitions(
        &mut self,
        level: usize,
        capacity: usize,
        ind: &mut usize,
        partitions: Vec<Vec<Entry>>,
        redirected: &mut Vec<Entry>,
    ) -> Result<()> {
        for partition in partitions {
            if self.levels.num_tables(level) + 1 == capacity {
                redirected.extend(partition);
                continue;
            }

            let filter = if self.options.bloom_filter_size > 0 {
                Some(self.write_filter(&partition)?)
            } else {
                None
            };
            let mut metadata = SSTableMetadata {
                min_key: partition.first().expect("partitions are never empty").0.user_key.clone(),
                max_key: partition.last().expect("partitions are never empty").0.user_key.clone(),
                file_size: 0,
            };
            let mut builder = SSTableBuilder::new(self.new_table_file());
            for (key, value) in partition {
                builder.add(key, value);
            }
            let file = builder.finish()?;
            metadata.file_size = file.size();
            self.levels
                .insert_table(level, *ind, Rc::new(file), filter, Some(metadata));
            *ind += 1;
        }
        Ok(())
    }

    fn write_filter(&mut self, partition: &[Entry]) -> Result<Rc<dyn TableFile>> {
        let mut filter = BloomFilter::new(
            8 * self.options.bloom_filter_size,
            self.options.bloom_filter_hash_count as usize,
        );
        for (key, _) in partition {
            filter.add(&key.user_key);
        }
        let mut file = DiskFile::new(self.dir.join(format!("filter_{}", self.next_filter_id)));
        self.next_filter_id += 1;
        file.write_all(&filter.serialize())?;
        Ok(Rc::new(file))
    }
}

impl Lsm for GranularLsm {
    fn put(&mut self, user_key: &[u8], value: &[u8]) -> Result<()> {
        self.sequence_number += 1;
        self.mem_table.add(self.sequence_number, user_key, value);
        self.check_mem_table()
    }

    fn delete(&mut self, user_key: &[u8]) -> Result<()> {
        self.sequence_number += 1;
        self.mem_table.delete(self.sequence_number, user_key);
        self.check_mem_table()
    }

    fn get_at(&self, user_key: &[u8], snapshot: u64) -> Result<Option<Value>> {
        match self.mem_table.get(user_key, snapshot) {
            Lookup::Found(value) => return Ok(Some(value)),
            Lookup::Tombstone => return Ok(None),
            Lookup::Miss => {}
        }
        for level in 0..self.levels.num_levels() {
            let num_tables = self.levels.num_tables(level);
            if num_tables == 0 {
                continue;
            }
            // Tables are disjoint and sorted, so the only candidate is the
            // first one whose max key is at or past the lookup key.
            let (mut lo, mut hi) = (0, num_tables);
            while lo < hi {
                let mid = (lo + hi) / 2;
                let meta = self
                    .levels
                    .table_metadata(level, mid)
                    .expect("granular tables carry metadata");
                if meta.max_key.as_slice() < user_key {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            if lo == num_tables {
                continue;
            }
            if self.options.bloom_filter_size > 0 {
                if let Some(filter_file) = self.levels.table_filter(level, lo) {
                    let image = filter_file.read(0, filter_file.size())?;
                    if !BloomFilter::deserialize(&image)?.may_contain(user_key) {
                        continue;
                    }
                }
            }
            let reader = SSTableReader::open(self.levels.table_file(level, lo))?;
            match reader.get(user_key, snapshot)? {
                Lookup::Found(value) => return Ok(Some(value)),
                Lookup::Tombstone => return Ok(None),
                Lookup::Miss => {}
            }
        }
        Ok(None)
    }

    fn scan_at(
        &self,
        start_key: Option<&[u8]>,
        end_key: Option<&[u8]>,
        snapshot: u64,
    ) -> Result<LsmScan<'_>> {
        let mut sources: Vec<EntrySource<'_>> = vec![Box::new(self.mem_table.scan())];
        for level in 0..self.levels.num_levels() {
            if self.levels.num_tables(level) > 0 {
                sources.push(Box::new(LevelScan::new(&self.levels, level)));
            }
        }
        Ok(LsmScan::new(sources, start_key, end_key, snapshot))
    }

    fn current_sequence_number(&self) -> u64 {
        self.sequence_number
    }
}

impl Drop for GranularLsm {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

/// Split a sorted entry stream into runs whose byte estimate stays within
/// `max_bytes`, cutting only at user-key boundaries so the versions of one
/// key always land in the same run. A run of one oversized key may exceed
/// the bound by itself; everything else stays within it.
fn partition_by_size(
    entries: &mut impl Iterator<Item = Entry>,
    max_bytes: u64,
) -> Vec<Vec<Entry>> {
    const TABLE_BASE: u64 = 8;

    fn entry_estimate(entry: &Entry) -> u64 {
        3 * 8 + entry.0.user_key.len() as u64 + entry.1.len() as u64
    }

    let mut partitions = Vec::new();
    let mut current: Vec<Entry> = Vec::new();
    let mut current_bytes = TABLE_BASE;
    let mut group: Vec<Entry> = Vec::new();
    let mut group_bytes = 0u64;

    for entry in entries {
        let same_key = group
            .last()
            .map_or(false, |(last, _)| last.user_key == entry.0.user_key);
        if same_key {
            group_bytes += entry_estimate(&entry);
            group.push(entry);
        } else {
            if !group.is_empty() {
                if current_bytes + group_bytes > max_bytes && !current.is_empty() {
                    partitions.push(std::mem::take(&mut current));
                    current_bytes = TABLE_BASE;
                }
                current_bytes += group_bytes;
                current.append(&mut group);
            }
            group_bytes = entry_estimate(&entry);
            group.push(entry);
        }
    }
    if !group.is_empty() {
        if current_bytes + group_bytes > max_bytes && !current.is_empty() {
            partitions.push(std::mem::take(&mut current));
        }
        current.append(&mut group);
    }
    if !current.is_empty() {
        partitions.push(current);
    }
    partitions
}
