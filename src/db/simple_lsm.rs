use crate::config::LsmOptions;
use crate::db::db_iter::{EntrySource, LsmScan};
use crate::db::key_types::{Lookup, Value};
use crate::db::Lsm;
use crate::memory::MemTable;
use crate::sstable::{LevelsManager, SSTableBuilder, SSTableMetadata, SSTableReader};
use crate::storage::buffer_pool::ReadBufferPool;
use crate::storage::file::{BufferedFile, TableFile};
use crate::{collections::merge::MergingIterator, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Tiered LSM engine: compaction cascades a flushed memtable down through the
/// levels, merging with the single resident table of each occupied level and
/// settling at the first empty one. Every level therefore holds at most one
/// table, and the level count grows logarithmically with the data volume.
pub struct SimpleLsm {
    options: LsmOptions,
    dir: PathBuf,
    levels: LevelsManager,
    mem_table: MemTable,
    buffer_pool: Rc<ReadBufferPool>,
    sequence_number: u64,
    next_table_id: u32,
}

impl SimpleLsm {
    /// Create the store under `parent_dir/simple_lsm`. The directory is
    /// created here and removed when the store is dropped.
    pub fn open(parent_dir: impl AsRef<Path>, options: LsmOptions) -> Result<SimpleLsm> {
        let dir = parent_dir.as_ref().join("simple_lsm");
        fs::create_dir_all(&dir)?;
        let buffer_pool = Rc::new(ReadBufferPool::new(
            &dir,
            options.buffer_pool_size,
            options.frame_size,
        ));
        let mem_table = MemTable::new(options.max_level_skip_list);
        Ok(SimpleLsm {
            options,
            dir,
            levels: LevelsManager::new(),
            mem_table,
            buffer_pool,
            sequence_number: 0,
            next_table_id: 0,
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
        let mut builder = SSTableBuilder::new(self.new_table_file());
        let mut metadata: Option<SSTableMetadata> = None;
        for (key, value) in sealed.into_scan() {
            match &mut metadata {
                None => {
                    metadata = Some(SSTableMetadata {
                        min_key: key.user_key.clone(),
                        max_key: key.user_key.clone(),
                        file_size: 0,
                    })
                }
                Some(meta) => meta.max_key = key.user_key.clone(),
            }
            builder.add(key, value);
        }
        let flushed = builder.finish()?;
        if let Some(meta) = &mut metadata {
            meta.file_size = flushed.size();
        }

        let mut file: Rc<dyn TableFile> = Rc::new(flushed);
        let mut level = 0;
        while self.levels.num_tables(level) > 0 {
            debug!("merging flushed table into level {}", level);
            let resident = self.levels.table_file(level, 0);
            self.levels.erase_table(level, 0);
            let (merged, merged_meta) = self.merge_tables(file, resident)?;
            file = merged;
            metadata = merged_meta;
            level += 1;
        }
        self.levels.insert_table(level, 0, file, None, metadata);
        Ok(())
    }

    /// Two-way merge of `newer` and `older` into a fresh table. The merged
    /// metadata is taken from the entries actually written.
    fn merge_tables(
        &mut self,
        newer: Rc<dyn TableFile>,
        older: Rc<dyn TableFile>,
    ) -> Result<(Rc<dyn TableFile>, Option<SSTableMetadata>)> {
        let sources: Vec<EntrySource<'static>> = vec![
            Box::new(SSTableReader::open(newer)?.scan()),
            Box::new(SSTableReader::open(older)?.scan()),
        ];
        let mut builder = SSTableBuilder::new(self.new_table_file());
        let mut metadata: Option<SSTableMetadata> = None;
        for (key, value) in MergingIterator::new(sources) {
            match &mut metadata {
                None => {
                    metadata = Some(SSTableMetadata {
                        min_key: key.user_key.clone(),
                        max_key: key.user_key.clone(),
                        file_size: 0,
                    })
                }
                Some(meta) => meta.max_key = key.user_key.clone(),
            }
            builder.add(key, value);
        }
        let file = builder.finish()?;
        if let Some(meta) = &mut metadata {
            meta.file_size = file.size();
        }
        Ok((Rc::new(file), metadata))
    }
}

impl Lsm for SimpleLsm {
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
            if self.levels.num_tables(level) == 0 {
                continue;
            }
            let in_range = match self.levels.table_metadata(level, 0) {
                Some(meta) => {
                    meta.min_key.as_slice() <= user_key && user_key <= meta.max_key.as_slice()
                }
                None => false,
            };
            if !in_range {
                continue;
            }
            let reader = SSTableReader::open(self.levels.table_file(level, 0))?;
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
            if self.levels.num_tables(level) == 0 {
                continue;
            }
            let Some(meta) = self.levels.table_metadata(level, 0) else {
                continue;
            };
            let clipped_start = start_key.unwrap_or(meta.min_key.as_slice());
            let clipped_end = end_key.unwrap_or(meta.max_key.as_slice());
            if meta.overlaps(clipped_start, clipped_end) {
                let reader = SSTableReader::open(self.levels.table_file(level, 0))?;
                sources.push(Box::new(reader.scan()));
            }
        }
        Ok(LsmScan::new(sources, start_key, end_key, snapshot))
    }

    fn current_sequence_number(&self) -> u64 {
        self.sequence_number
    }
}

impl Drop for SimpleLsm {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}
